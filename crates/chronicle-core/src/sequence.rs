//! Sequence allocation and the chain pointer owned by one pipeline.
//!
//! Neither type is ever trusted on its own: `LinkState` is reloaded from the
//! store at startup and after every failed append, so a process restart or
//! an ambiguous store failure cannot mint a duplicate or skipped sequence.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use chronicle_contracts::entry::AuditLogEntry;

/// Issues strictly increasing sequence numbers.
///
/// The allocator is not synchronized itself; it lives inside the pipeline's
/// critical-section mutex, which is the single allocation point per stream.
#[derive(Debug, Default)]
pub struct SequenceAllocator {
    /// The last sequence handed out (or observed in the store).
    high_water: u64,
}

impl SequenceAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next sequence number.
    pub fn next(&mut self) -> u64 {
        self.high_water += 1;
        self.high_water
    }

    /// Reset the high-water mark to the store's true last sequence.
    pub fn resync(&mut self, last_known_from_store: u64) {
        if self.high_water != last_known_from_store {
            debug!(
                in_memory = self.high_water,
                store = last_known_from_store,
                "sequence allocator resynced from store"
            );
        }
        self.high_water = last_known_from_store;
    }

    pub fn high_water(&self) -> u64 {
        self.high_water
    }
}

/// Snapshot of the chain pointer: the last persisted sequence and hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamHead {
    pub sequence: u64,
    pub last_hash: String,
}

/// Mutable link state of one stream, guarded by the pipeline mutex.
#[derive(Debug)]
pub struct LinkState {
    pub(crate) allocator: SequenceAllocator,
    pub(crate) last_hash: String,
    /// Set when in-memory state may have drifted from the store.
    pub(crate) stale: bool,
}

impl LinkState {
    /// A state that must be loaded from the store before first use.
    pub fn unsynced() -> Self {
        Self {
            allocator: SequenceAllocator::new(),
            last_hash: AuditLogEntry::GENESIS_HASH.to_string(),
            stale: true,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub(crate) fn mark_stale(&mut self) {
        if !self.stale {
            warn!(
                high_water = self.allocator.high_water(),
                "link state marked stale; next append will resync from store"
            );
        }
        self.stale = true;
    }

    pub(crate) fn load(&mut self, last_sequence: u64, last_hash: String) {
        self.allocator.resync(last_sequence);
        self.last_hash = last_hash;
        self.stale = false;
    }

    pub(crate) fn advance(&mut self, entry: &AuditLogEntry) {
        self.last_hash = entry.current_log_hash.clone();
    }

    pub fn head(&self) -> StreamHead {
        StreamHead {
            sequence: self.allocator.high_water(),
            last_hash: self.last_hash.clone(),
        }
    }
}
