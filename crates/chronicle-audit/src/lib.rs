//! # chronicle-audit
//!
//! Keyed SHA-256 hash chain and reference stores for the Chronicle ledger.
//!
//! ## Overview
//!
//! `HashChainEngine` implements `ChainHasher`: every entry's hash commits to
//! its canonical content, an HMAC over that content, and the previous
//! entry's hash.  Editing any stored byte (even one character of a
//! description) breaks the chain and is detected on replay.
//!
//! Two `AuditLogStore` implementations are provided:
//! - `InMemoryAuditStore` for tests and embedded use
//! - `JsonlAuditStore`, an append-only JSON Lines file that survives restarts
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chronicle_audit::{HashChainEngine, JsonlAuditStore, SecretKey};
//!
//! let engine = HashChainEngine::new(SecretKey::from_hex(&hmac_hex)?);
//! let store = JsonlAuditStore::open("var/audit.jsonl", Duration::from_secs(2))?;
//! ```

pub mod chain;
pub mod jsonl;
pub mod key;
pub mod memory;

pub use chain::{canonical_bytes, HashChainEngine};
pub use jsonl::JsonlAuditStore;
pub use key::SecretKey;
pub use memory::{InMemoryAuditStore, LedgerExport, DEFAULT_STORE_TIMEOUT};

// ── Tests ─────────────────────────────────────────────────────────────────────
