//! AES-256 backup key.

use std::fmt;

use zeroize::Zeroizing;

use chronicle_contracts::error::{LedgerError, LedgerResult};

pub const BACKUP_KEY_LEN: usize = 32;

/// Key used to seal backup records.  Wiped from memory on drop.
#[derive(Clone)]
pub struct BackupKey {
    bytes: Zeroizing<[u8; BACKUP_KEY_LEN]>,
}

impl BackupKey {
    pub fn new(bytes: &[u8]) -> LedgerResult<Self> {
        if bytes.len() != BACKUP_KEY_LEN {
            return Err(LedgerError::Crypto {
                reason: format!(
                    "backup key must be {BACKUP_KEY_LEN} bytes, got {}",
                    bytes.len()
                ),
            });
        }
        let mut key = Zeroizing::new([0u8; BACKUP_KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self { bytes: key })
    }

    pub fn from_hex(encoded: &str) -> LedgerResult<Self> {
        let decoded = Zeroizing::new(hex::decode(encoded.trim()).map_err(|e| {
            LedgerError::Crypto {
                reason: format!("backup key is not valid hex: {e}"),
            }
        })?);
        Self::new(&decoded)
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.bytes[..]
    }
}

impl fmt::Debug for BackupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BackupKey(<redacted>)")
    }
}
