//! In-memory implementation of `AuditLogStore`.
//!
//! `InMemoryAuditStore` is the reference store.  All entries live in a `Vec`
//! behind a `parking_lot::Mutex`; every operation acquires the lock with a
//! deadline so a wedged writer surfaces as `StoreUnavailable` instead of
//! blocking callers forever.

use std::time::Duration;

use chrono::Utc;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::debug;

use chronicle_contracts::{
    entry::AuditLogEntry,
    error::{LedgerError, LedgerResult},
};
use chronicle_core::traits::AuditLogStore;

/// Default bound on every store operation.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(2);

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct MemoryState {
    /// All entries, in sequence order.
    pub(crate) entries: Vec<AuditLogEntry>,
}

impl MemoryState {
    fn last_sequence(&self) -> u64 {
        self.entries.last().map(|e| e.sequence_number).unwrap_or(0)
    }

    fn last_hash(&self) -> String {
        self.entries
            .last()
            .map(|e| e.current_log_hash.clone())
            .unwrap_or_else(|| AuditLogEntry::GENESIS_HASH.to_string())
    }
}

/// A sealed copy of a stream for archival.
///
/// Entries are cloned as stored; exporting never rewrites them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerExport {
    pub entries: Vec<AuditLogEntry>,
    pub exported_at: chrono::DateTime<Utc>,
    /// `current_log_hash` of the last entry; empty if the stream is empty.
    pub terminal_hash: String,
}

// ── Public store ──────────────────────────────────────────────────────────────

/// An in-memory, append-only audit store with a conditional append.
pub struct InMemoryAuditStore {
    pub(crate) state: Mutex<MemoryState>,
    timeout: Duration,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_STORE_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                entries: Vec::new(),
            }),
            timeout,
        }
    }

    /// Load previously exported entries verbatim.
    ///
    /// No linkage checks are made here; run the verifier over the loaded
    /// range to establish trust.
    pub fn from_entries(mut entries: Vec<AuditLogEntry>, timeout: Duration) -> Self {
        entries.sort_by_key(|e| e.sequence_number);
        Self {
            state: Mutex::new(MemoryState { entries }),
            timeout,
        }
    }

    /// Export every stored entry.
    pub fn export_log(&self) -> LedgerResult<LedgerExport> {
        let state = self.lock()?;
        Ok(LedgerExport {
            entries: state.entries.clone(),
            exported_at: Utc::now(),
            terminal_hash: state
                .entries
                .last()
                .map(|e| e.current_log_hash.clone())
                .unwrap_or_default(),
        })
    }

    pub fn len(&self) -> LedgerResult<usize> {
        Ok(self.lock()?.entries.len())
    }

    pub fn is_empty(&self) -> LedgerResult<bool> {
        Ok(self.lock()?.entries.is_empty())
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, MemoryState>> {
        self.state
            .try_lock_for(self.timeout)
            .ok_or_else(|| LedgerError::StoreUnavailable {
                reason: format!(
                    "in-memory store lock not acquired within {}ms",
                    self.timeout.as_millis()
                ),
            })
    }
}

impl Default for InMemoryAuditStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogStore for InMemoryAuditStore {
    fn append_atomic(&self, entry: &AuditLogEntry) -> LedgerResult<()> {
        let mut state = self.lock()?;
        check_successor(entry, state.last_sequence(), &state.last_hash())?;
        state.entries.push(entry.clone());
        debug!(sequence = entry.sequence_number, "entry appended to memory store");
        Ok(())
    }

    fn read_range(&self, from_seq: u64, to_seq: u64) -> LedgerResult<Vec<AuditLogEntry>> {
        let state = self.lock()?;
        Ok(sequence_range(&state.entries, from_seq, to_seq).to_vec())
    }

    fn read_last_hash(&self) -> LedgerResult<String> {
        Ok(self.lock()?.last_hash())
    }

    fn read_last_sequence(&self) -> LedgerResult<u64> {
        Ok(self.lock()?.last_sequence())
    }
}

/// The entries of `sorted` whose sequence lies in `from_seq..=to_seq`.
///
/// `sorted` must be ordered by sequence number.
pub(crate) fn sequence_range(
    sorted: &[AuditLogEntry],
    from_seq: u64,
    to_seq: u64,
) -> &[AuditLogEntry] {
    let start = sorted.partition_point(|e| e.sequence_number < from_seq);
    let end = sorted.partition_point(|e| e.sequence_number <= to_seq);
    &sorted[start..end.max(start)]
}

/// The conditional-append rule shared by the reference stores.
pub(crate) fn check_successor(
    entry: &AuditLogEntry,
    last_sequence: u64,
    last_hash: &str,
) -> LedgerResult<()> {
    if entry.sequence_number != last_sequence + 1 {
        return Err(LedgerError::ChainLinkage {
            sequence: entry.sequence_number,
            reason: format!(
                "store head is {last_sequence}; expected sequence {}",
                last_sequence + 1
            ),
        });
    }
    if entry.previous_log_hash != last_hash {
        return Err(LedgerError::ChainLinkage {
            sequence: entry.sequence_number,
            reason: "previous_log_hash does not match the stored chain pointer".to_string(),
        });
    }
    Ok(())
}
