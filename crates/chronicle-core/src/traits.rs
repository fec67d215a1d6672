//! Core trait definitions for the Chronicle audit ledger.
//!
//! These traits are the seams between the append pipeline and everything it
//! depends on:
//!
//! - `ChainHasher`        — keyed hash linking an entry to its predecessor
//! - `AuditLogStore`      — the persistence engine (external collaborator)
//! - `EmergencyChannel`   — last-resort record of failed appends
//! - `BackupQueue`        — off-critical-path encrypted copies
//! - `IntegrityVerifier`  — read-side replay of the chain
//!
//! `AppendPipeline` and `AuditService` wire them together in the correct order.

use chronicle_contracts::{
    custody::{CustodyChainVerificationResult, CustodyRecord},
    entry::{AuditLogEntry, EntityRef, HashableEntry},
    error::{FailedAppend, LedgerError, LedgerResult},
    verification::ChainVerificationResult,
};

/// Computes `current_log_hash` for an entry.
///
/// Implementations must be pure: the same entry and `previous_hash` always
/// produce the same output.  The write path and the verifier must share one
/// implementation (and key), otherwise every entry reports a mismatch.
pub trait ChainHasher: Send + Sync {
    /// Hash `entry` linked to `previous_hash`.
    ///
    /// Returns `LedgerError::Serialization` when the entry cannot be rendered
    /// into canonical form.
    fn compute(&self, entry: &HashableEntry<'_>, previous_hash: &str) -> LedgerResult<String>;
}

/// The persistence engine behind one logical audit stream.
///
/// Every operation must be bounded by a timeout; an operation that cannot
/// complete in time returns `LedgerError::StoreUnavailable`.
pub trait AuditLogStore: Send + Sync {
    /// Insert `entry` and advance the chain pointer as one atomic step.
    ///
    /// This is a conditional write: it must fail with
    /// `LedgerError::ChainLinkage` unless `entry.sequence_number` is exactly
    /// one past the stored last sequence and `entry.previous_log_hash` equals
    /// the stored last hash.  On any error nothing is written.
    fn append_atomic(&self, entry: &AuditLogEntry) -> LedgerResult<()>;

    /// Entries with `from_seq <= sequence_number <= to_seq`, ascending.
    ///
    /// Missing sequences are simply absent from the result.
    fn read_range(&self, from_seq: u64, to_seq: u64) -> LedgerResult<Vec<AuditLogEntry>>;

    /// `current_log_hash` of the last entry, or `AuditLogEntry::GENESIS_HASH`
    /// when the stream is empty.
    fn read_last_hash(&self) -> LedgerResult<String>;

    /// Sequence of the last entry, or 0 when the stream is empty.
    fn read_last_sequence(&self) -> LedgerResult<u64>;
}

/// The store-independent fallback channel for failed appends.
///
/// `record` has no error return: implementations swallow their own failures
/// so an outage never cascades into the caller's error path.
pub trait EmergencyChannel: Send + Sync {
    fn record(&self, attempt: &FailedAppend, error: &LedgerError);
}

/// Accepts persisted entries for encrypted backup.
///
/// `enqueue` must not block on I/O; durability is the queue's problem.
pub trait BackupQueue: Send + Sync {
    fn enqueue(&self, entry: &AuditLogEntry);
}

/// Replays stored entries and reports integrity findings.
pub trait IntegrityVerifier: Send + Sync {
    /// Verify `from_seq..=to_seq` (or up to the current head when `to_seq`
    /// is `None`).  Violations are reported, never raised.
    fn verify_range(
        &self,
        store: &dyn AuditLogStore,
        from_seq: u64,
        to_seq: Option<u64>,
    ) -> LedgerResult<ChainVerificationResult>;

    /// Check hand-over continuity across an entity's time-ordered transfers.
    fn verify_custody(
        &self,
        entity_ref: &EntityRef,
        records: &[CustodyRecord],
    ) -> CustodyChainVerificationResult;
}
