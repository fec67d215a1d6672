//! Secret key material supplied by the external secret store.
//!
//! The ledger never generates or persists keys itself.  Keys are wiped from
//! memory when dropped.

use std::fmt;

use zeroize::Zeroizing;

use chronicle_contracts::error::{LedgerError, LedgerResult};

/// Minimum accepted key length in bytes.
pub const MIN_KEY_LEN: usize = 32;

/// A symmetric key (HMAC signing or backup encryption).
#[derive(Clone)]
pub struct SecretKey {
    bytes: Zeroizing<Vec<u8>>,
}

impl SecretKey {
    /// Wrap raw key bytes.  Rejects keys shorter than `MIN_KEY_LEN`.
    pub fn new(bytes: impl Into<Vec<u8>>) -> LedgerResult<Self> {
        let bytes = Zeroizing::new(bytes.into());
        if bytes.len() < MIN_KEY_LEN {
            return Err(LedgerError::Crypto {
                reason: format!(
                    "key is {} bytes, at least {MIN_KEY_LEN} required",
                    bytes.len()
                ),
            });
        }
        Ok(Self { bytes })
    }

    /// Decode a hex-encoded key.
    pub fn from_hex(encoded: &str) -> LedgerResult<Self> {
        let bytes = hex::decode(encoded.trim()).map_err(|e| LedgerError::Crypto {
            reason: format!("key is not valid hex: {e}"),
        })?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED; {}])", self.bytes.len())
    }
}
