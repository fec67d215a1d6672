//! Error types for the Chronicle audit ledger.
//!
//! Every fallible ledger operation returns `LedgerResult<T>`.  The append
//! boundary is stricter: it returns `Result<AuditLogEntry, AuditWriteFailure>`
//! so callers hold both the cause and the metadata of the failed attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entry::{Actor, AuditAction, EntityRef, EntryContent, EntryFlags};

/// The unified error type for the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Entry content was rejected before hashing.
    #[error("validation error: {reason}")]
    Validation { reason: String },

    /// Entry content could not be rendered into canonical form.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// The store refused a conditional append because the chain pointer moved.
    #[error("chain linkage failure at sequence {sequence}: {reason}")]
    ChainLinkage { sequence: u64, reason: String },

    /// The store timed out or could not be reached.
    #[error("store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    /// A stored or restored record does not match its hash.
    ///
    /// Only produced by read-side checks, never by the append path.
    #[error("integrity violation: {reason}")]
    IntegrityViolation { reason: String },

    /// An encrypted backup could not be produced or read.
    #[error("backup error: {reason}")]
    Backup { reason: String },

    /// Key material or cipher operation failed.
    #[error("crypto error: {reason}")]
    Crypto { reason: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },

    /// An append failed; raised when an `AuditWriteFailure` is folded into a
    /// `LedgerResult`.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },
}

/// Convenience alias used throughout the Chronicle crates.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// How far an append got: `Draft → Hashed → Persisted → BackedUp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendStage {
    Draft,
    Hashed,
    Persisted,
    BackedUp,
}

/// Metadata of an append attempt that did not reach the store.
///
/// This is what the emergency channel records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedAppend {
    pub attempted_at: DateTime<Utc>,
    pub actor: Actor,
    pub action: AuditAction,
    pub entity_ref: EntityRef,
    /// The sequence that was allocated before the failure, if any.
    pub sequence: Option<u64>,
    /// Last stage the attempt reached before failing.
    pub stage: AppendStage,
    pub flags: EntryFlags,
}

impl FailedAppend {
    /// Describe an attempt that has not yet been allocated a sequence.
    pub fn new(content: &EntryContent, attempted_at: DateTime<Utc>) -> Self {
        Self {
            attempted_at,
            actor: content.actor.clone(),
            action: content.action,
            entity_ref: content.entity_ref.clone(),
            sequence: None,
            stage: AppendStage::Draft,
            flags: content.flags,
        }
    }
}

/// The error branch of `append`.
///
/// A regulated action without an audit record is itself a compliance defect,
/// so callers must not discard this.
#[derive(Debug, Error)]
#[error(
    "audit write failed for '{}' on {} by '{}': {source}",
    .attempt.action,
    .attempt.entity_ref,
    .attempt.actor.id
)]
#[must_use]
pub struct AuditWriteFailure {
    pub attempt: FailedAppend,
    #[source]
    pub source: LedgerError,
}

impl From<AuditWriteFailure> for LedgerError {
    fn from(failure: AuditWriteFailure) -> Self {
        LedgerError::AuditWriteFailed {
            reason: failure.to_string(),
        }
    }
}
