//! Configuration schema.
//!
//! A `LedgerConfig` is deserialized from TOML.  Every section except the
//! top-level `stream_id` may be omitted and falls back to its defaults.
//!
//! ```toml
//! stream_id = "gmp-main"
//!
//! [store]
//! kind = "jsonl"
//! path = "var/audit.jsonl"
//! timeout_ms = 2000
//!
//! [verification]
//! page_size = 500
//!
//! [backup]
//! enabled = true
//! directory = "var/backup"
//! max_attempts = 3
//! retry_backoff_ms = 50
//! queue_capacity = 1024
//!
//! [emergency]
//! path = "var/emergency.jsonl"
//! ```
//!
//! Keys are never part of this file; see [`crate::keys`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use chronicle_contracts::error::{LedgerError, LedgerResult};
use chronicle_recovery::DEFAULT_QUEUE_CAPACITY;

/// Which `AuditLogStore` backs the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StoreKind {
    Memory,
    Jsonl,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    /// Ledger file; required when `kind = "jsonl"`.
    pub path: Option<PathBuf>,
    /// Bound on acquiring the store lock.  A slow `fsync` in progress is
    /// not interrupted by it.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            path: None,
            timeout_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub page_size: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self { page_size: 500 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    /// Directory for sealed records; required when enabled.
    pub directory: Option<PathBuf>,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Entries waiting for the backup worker before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            directory: None,
            max_attempts: 3,
            retry_backoff_ms: 50,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmergencyConfig {
    pub path: PathBuf,
}

impl Default for EmergencyConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("var/emergency.jsonl"),
        }
    }
}

/// Top-level ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Names the stream; bound into every backup record.
    pub stream_id: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub emergency: EmergencyConfig,
}

impl LedgerConfig {
    /// Check cross-field requirements that serde cannot express.
    pub fn validate(&self) -> LedgerResult<()> {
        let invalid = |reason: &str| {
            Err(LedgerError::Config {
                reason: reason.to_string(),
            })
        };

        if self.stream_id.trim().is_empty() {
            return invalid("stream_id must not be empty");
        }
        if self.store.kind == StoreKind::Jsonl && self.store.path.is_none() {
            return invalid("store.path is required when store.kind = \"jsonl\"");
        }
        if self.store.timeout_ms == 0 {
            return invalid("store.timeout_ms must be greater than zero");
        }
        if self.verification.page_size == 0 {
            return invalid("verification.page_size must be greater than zero");
        }
        if self.backup.enabled {
            if self.backup.directory.is_none() {
                return invalid("backup.directory is required when backup.enabled = true");
            }
            if self.backup.max_attempts == 0 {
                return invalid("backup.max_attempts must be at least 1");
            }
            if self.backup.queue_capacity == 0 {
                return invalid("backup.queue_capacity must be at least 1");
            }
        }
        Ok(())
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.backup.retry_backoff_ms)
    }
}
