//! Hash-chain primitives: canonical form and the keyed link hash.
//!
//! Hash input layout:
//!   1. canonical = JSON of the entry's semantic fields, object keys sorted
//!      at every depth, no whitespace
//!   2. content_hash = hex(SHA-256(canonical))
//!   3. signature    = hex(HMAC-SHA256(key, canonical))
//!   4. final_hash   = hex(SHA-256(content_hash ":" signature ":" previous_hash))
//!
//! `final_hash` is what gets stored as `current_log_hash`.

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use chronicle_contracts::{
    entry::HashableEntry,
    error::{LedgerError, LedgerResult},
};
use chronicle_core::traits::ChainHasher;

use crate::key::SecretKey;

type HmacSha256 = Hmac<Sha256>;

/// Render `value` as canonical JSON bytes.
///
/// Keys are sorted explicitly rather than relying on the map type serde_json
/// was built with, so the output does not depend on crate features.
pub fn canonical_bytes<T: Serialize + ?Sized>(value: &T) -> LedgerResult<Vec<u8>> {
    let value = serde_json::to_value(value).map_err(|e| LedgerError::Serialization {
        reason: format!("entry is not canonicalizable: {e}"),
    })?;
    serde_json::to_vec(&sort_keys(value)).map_err(|e| LedgerError::Serialization {
        reason: format!("canonical form could not be written: {e}"),
    })
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            let mut sorted = Map::new();
            for (k, v) in fields {
                sorted.insert(k, sort_keys(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

/// The keyed hash engine shared by the append path and the verifier.
#[derive(Debug, Clone)]
pub struct HashChainEngine {
    key: SecretKey,
}

impl HashChainEngine {
    pub fn new(key: SecretKey) -> Self {
        Self { key }
    }

    /// `hex(SHA-256(canonical))`
    pub fn content_hash(canonical: &[u8]) -> String {
        hex::encode(Sha256::digest(canonical))
    }

    /// `hex(HMAC-SHA256(key, canonical))`
    pub fn signature(&self, canonical: &[u8]) -> LedgerResult<String> {
        let mut mac =
            HmacSha256::new_from_slice(self.key.as_bytes()).map_err(|e| LedgerError::Crypto {
                reason: format!("HMAC key rejected: {e}"),
            })?;
        mac.update(canonical);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// `hex(SHA-256(content_hash ":" signature ":" previous_hash))`
    pub fn link(content_hash: &str, signature: &str, previous_hash: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content_hash.as_bytes());
        hasher.update(b":");
        hasher.update(signature.as_bytes());
        hasher.update(b":");
        hasher.update(previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

impl ChainHasher for HashChainEngine {
    fn compute(&self, entry: &HashableEntry<'_>, previous_hash: &str) -> LedgerResult<String> {
        let canonical = canonical_bytes(entry)?;
        let content_hash = Self::content_hash(&canonical);
        let signature = self.signature(&canonical)?;
        Ok(Self::link(&content_hash, &signature, previous_hash))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::canonical_bytes;

    #[test]
    fn canonical_form_sorts_nested_keys() {
        let a = json!({ "b": 1, "a": { "z": true, "m": [ { "y": 2, "x": 1 } ] } });
        let bytes = canonical_bytes(&a).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"a":{"m":[{"x":1,"y":2}],"z":true},"b":1}"#
        );
    }

    #[test]
    fn canonical_form_rejects_non_string_keys() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(vec![1u8], "value");
        let err = canonical_bytes(&map).unwrap_err();
        assert!(err.to_string().contains("not canonicalizable"));
    }
}
