//! # chronicle-config
//!
//! TOML configuration for a Chronicle audit stream, plus key loading from
//! the environment.
//!
//! ```rust,ignore
//! use std::path::Path;
//! use chronicle_config::{KeyMaterial, LedgerConfig};
//!
//! let config = LedgerConfig::from_file(Path::new("config/ledger.toml"))?;
//! let keys = KeyMaterial::from_env(config.backup.enabled)?;
//! ```

pub mod keys;
pub mod loader;
pub mod model;

pub use keys::{KeyMaterial, BACKUP_KEY_ENV, HMAC_KEY_ENV};
pub use model::{
    BackupConfig, EmergencyConfig, LedgerConfig, StoreConfig, StoreKind, VerificationConfig,
};

// ── Tests ─────────────────────────────────────────────────────────────────────
