//! Key material from the environment.
//!
//! Keys are provisioned by an external secret store and exposed to the
//! process as hex-encoded environment variables.  They are decoded straight
//! into zeroizing key types and never written to configuration files.

use tracing::info;

use chronicle_audit::SecretKey;
use chronicle_contracts::error::{LedgerError, LedgerResult};
use chronicle_recovery::BackupKey;

pub const HMAC_KEY_ENV: &str = "CHRONICLE_HMAC_KEY";
pub const BACKUP_KEY_ENV: &str = "CHRONICLE_BACKUP_KEY";

#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub hmac: SecretKey,
    /// Present only when a backup is configured.
    pub backup: Option<BackupKey>,
}

impl KeyMaterial {
    /// Read keys from the process environment.
    pub fn from_env(backup_required: bool) -> LedgerResult<Self> {
        Self::from_lookup(backup_required, |name| std::env::var(name).ok())
    }

    /// Read keys through `lookup`, which maps a variable name to its value.
    pub fn from_lookup(
        backup_required: bool,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> LedgerResult<Self> {
        let hmac_hex = lookup(HMAC_KEY_ENV).ok_or_else(|| missing(HMAC_KEY_ENV))?;
        let hmac = SecretKey::from_hex(&hmac_hex).map_err(|e| LedgerError::Config {
            reason: format!("{HMAC_KEY_ENV}: {e}"),
        })?;

        let backup = if backup_required {
            let backup_hex = lookup(BACKUP_KEY_ENV).ok_or_else(|| missing(BACKUP_KEY_ENV))?;
            Some(
                BackupKey::from_hex(&backup_hex).map_err(|e| LedgerError::Config {
                    reason: format!("{BACKUP_KEY_ENV}: {e}"),
                })?,
            )
        } else {
            None
        };

        info!(
            hmac_key_len = hmac.len(),
            backup_key = backup.is_some(),
            "key material loaded"
        );
        Ok(Self { hmac, backup })
    }
}

fn missing(name: &str) -> LedgerError {
    LedgerError::Config {
        reason: format!("environment variable {name} is not set"),
    }
}
