//! The append pipeline: the only write path into an audit stream.
//!
//! Every append runs the same protocol:
//!
//!   Validate → [lock] Allocate → Read last hash → Hash → Persist [unlock] → Backup
//!
//! Allocation through persistence is one critical section per stream.  Once
//! a sequence has been allocated the attempt runs to a definite outcome: the
//! entry is either persisted and linked, or nothing is, and the allocator is
//! rolled back to the store's true head before the lock is released.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use chronicle_contracts::{
    entry::{AuditLogEntry, EntryContent},
    error::{AppendStage, AuditWriteFailure, FailedAppend, LedgerError, LedgerResult},
};

use crate::{
    sequence::{LinkState, StreamHead},
    traits::{AuditLogStore, BackupQueue, ChainHasher, EmergencyChannel},
    validate::validate_content,
};

/// Appends entries to one logical audit stream.
///
/// Construct one pipeline per stream and share it (e.g. behind an `Arc`)
/// between all callers; two pipelines writing the same stream would rely
/// solely on the store's conditional append to keep the chain linear.
pub struct AppendPipeline {
    store: Arc<dyn AuditLogStore>,
    hasher: Arc<dyn ChainHasher>,
    emergency: Arc<dyn EmergencyChannel>,
    backup: Option<Arc<dyn BackupQueue>>,
    state: Mutex<LinkState>,
}

impl AppendPipeline {
    /// Create a pipeline whose link state will be loaded on first append.
    pub fn new(
        store: Arc<dyn AuditLogStore>,
        hasher: Arc<dyn ChainHasher>,
        emergency: Arc<dyn EmergencyChannel>,
        backup: Option<Arc<dyn BackupQueue>>,
    ) -> Self {
        Self {
            store,
            hasher,
            emergency,
            backup,
            state: Mutex::new(LinkState::unsynced()),
        }
    }

    /// Create a pipeline and load its link state from the store immediately.
    pub fn open(
        store: Arc<dyn AuditLogStore>,
        hasher: Arc<dyn ChainHasher>,
        emergency: Arc<dyn EmergencyChannel>,
        backup: Option<Arc<dyn BackupQueue>>,
    ) -> LedgerResult<Self> {
        let pipeline = Self::new(store, hasher, emergency, backup);
        pipeline.resync()?;
        Ok(pipeline)
    }

    /// Reload sequence and last hash from the store.
    ///
    /// Call at startup and whenever drift is suspected.  Returns the store's
    /// last sequence.
    pub fn resync(&self) -> LedgerResult<u64> {
        let mut state = self.lock_state();
        self.resync_locked(&mut state)?;
        Ok(state.allocator.high_water())
    }

    /// The in-memory chain pointer.  May be stale; see `LinkState`.
    pub fn head(&self) -> StreamHead {
        self.lock_state().head()
    }

    /// Append one entry.
    ///
    /// # Errors
    ///
    /// Returns `AuditWriteFailure` when validation, hashing, or the store
    /// fails.  Before returning, the failed attempt is handed to the
    /// emergency channel.  Nothing is retried here: a retry must start a new
    /// `append` so it allocates afresh.
    pub fn append(&self, content: EntryContent) -> Result<AuditLogEntry, AuditWriteFailure> {
        let mut attempt = FailedAppend::new(&content, Utc::now());

        if let Err(source) = validate_content(&content) {
            return Err(self.fail(attempt, source));
        }

        let backup_required = content.flags.requires_backup();

        // ── Critical section ─────────────────────────────────────────────────
        let mut state = self.lock_state();

        if state.is_stale() {
            if let Err(source) = self.resync_locked(&mut state) {
                drop(state);
                return Err(self.fail(attempt, source));
            }
        }

        let sequence = state.allocator.next();
        attempt.sequence = Some(sequence);

        let entry = match self.link_and_persist(content, sequence, &mut attempt) {
            Ok(entry) => entry,
            Err(source) => {
                // Take the allocation back so the next caller reuses it.
                if let Err(e) = self.resync_locked(&mut state) {
                    warn!(error = %e, sequence, "rollback resync failed");
                }
                drop(state);
                return Err(self.fail(attempt, source));
            }
        };

        state.advance(&entry);
        drop(state);
        // ── End of critical section ──────────────────────────────────────────

        info!(
            sequence = entry.sequence_number,
            action = %entry.content.action,
            entity = %entry.content.entity_ref,
            actor = %entry.content.actor.id,
            hash = %entry.current_log_hash,
            "audit entry persisted"
        );

        if backup_required {
            if let Some(backup) = &self.backup {
                backup.enqueue(&entry);
                debug!(sequence = entry.sequence_number, "entry queued for encrypted backup");
            }
        }

        Ok(entry)
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    /// Steps 3–5: read the predecessor hash, hash, persist atomically.
    fn link_and_persist(
        &self,
        content: EntryContent,
        sequence: u64,
        attempt: &mut FailedAppend,
    ) -> LedgerResult<AuditLogEntry> {
        let previous_log_hash = self.store.read_last_hash()?;

        let mut entry = AuditLogEntry {
            id: Uuid::new_v4(),
            sequence_number: sequence,
            timestamp: Utc::now(),
            content,
            previous_log_hash,
            current_log_hash: String::new(),
        };
        entry.current_log_hash = self
            .hasher
            .compute(&entry.hashable(), &entry.previous_log_hash)?;
        attempt.stage = AppendStage::Hashed;

        debug!(sequence, hash = %entry.current_log_hash, "entry hashed");

        self.store.append_atomic(&entry)?;
        Ok(entry)
    }

    /// Load link state from the store; on failure leave it marked stale.
    fn resync_locked(&self, state: &mut LinkState) -> LedgerResult<()> {
        let loaded = self
            .store
            .read_last_sequence()
            .and_then(|seq| Ok((seq, self.store.read_last_hash()?)));

        match loaded {
            Ok((sequence, hash)) => {
                state.load(sequence, hash);
                Ok(())
            }
            Err(e) => {
                state.mark_stale();
                Err(e)
            }
        }
    }

    /// Lock the link state.  A poisoned lock is recovered but marked stale
    /// so the next append reloads it from the store.
    fn lock_state(&self) -> MutexGuard<'_, LinkState> {
        self.state.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            let mut guard = poisoned.into_inner();
            guard.mark_stale();
            guard
        })
    }

    /// Report a failed attempt to the emergency channel and build the error.
    fn fail(&self, attempt: FailedAppend, source: LedgerError) -> AuditWriteFailure {
        error!(
            action = %attempt.action,
            entity = %attempt.entity_ref,
            actor = %attempt.actor.id,
            sequence = ?attempt.sequence,
            stage = ?attempt.stage,
            error = %source,
            "audit append failed"
        );
        self.emergency.record(&attempt, &source);
        AuditWriteFailure { attempt, source }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    use chronicle_contracts::{
        custody::CustodyDetails,
        entry::{
            Actor, AuditAction, AuditLogEntry, EntityRef, EntryContent, EntryFlags,
            HashableEntry, RequestContext,
        },
        error::{AppendStage, FailedAppend, LedgerError, LedgerResult},
    };

    use crate::traits::{AuditLogStore, BackupQueue, ChainHasher, EmergencyChannel};

    use super::AppendPipeline;

    // ── Mock helpers ─────────────────────────────────────────────────────────

    /// Non-cryptographic stand-in for the real engine.
    pub(crate) struct MockHasher;

    impl ChainHasher for MockHasher {
        fn compute(&self, entry: &HashableEntry<'_>, previous_hash: &str) -> LedgerResult<String> {
            let json = serde_json::to_string(entry).map_err(|e| LedgerError::Serialization {
                reason: e.to_string(),
            })?;
            let mut h = DefaultHasher::new();
            json.hash(&mut h);
            previous_hash.hash(&mut h);
            Ok(format!("{:064x}", h.finish()))
        }
    }

    /// A store that keeps entries in a `Vec` and can fail on demand.
    #[derive(Default)]
    pub(crate) struct MockStore {
        pub(crate) entries: Mutex<Vec<AuditLogEntry>>,
        /// Fail the append whose sequence equals this value (0 = never).
        pub(crate) fail_on_sequence: AtomicU64,
        pub(crate) fail_reads: std::sync::atomic::AtomicBool,
    }

    impl AuditLogStore for MockStore {
        fn append_atomic(&self, entry: &AuditLogEntry) -> LedgerResult<()> {
            if self.fail_on_sequence.load(Ordering::SeqCst) == entry.sequence_number {
                return Err(LedgerError::StoreUnavailable {
                    reason: "injected failure".to_string(),
                });
            }
            let mut entries = self.entries.lock().unwrap();
            let last_seq = entries.last().map(|e| e.sequence_number).unwrap_or(0);
            let last_hash = entries
                .last()
                .map(|e| e.current_log_hash.clone())
                .unwrap_or_else(|| AuditLogEntry::GENESIS_HASH.to_string());
            if entry.sequence_number != last_seq + 1 || entry.previous_log_hash != last_hash {
                return Err(LedgerError::ChainLinkage {
                    sequence: entry.sequence_number,
                    reason: format!("head is {last_seq}"),
                });
            }
            entries.push(entry.clone());
            Ok(())
        }

        fn read_range(&self, from_seq: u64, to_seq: u64) -> LedgerResult<Vec<AuditLogEntry>> {
            Ok(self
                .entries
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.sequence_number >= from_seq && e.sequence_number <= to_seq)
                .cloned()
                .collect())
        }

        fn read_last_hash(&self) -> LedgerResult<String> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(LedgerError::StoreUnavailable {
                    reason: "reads down".to_string(),
                });
            }
            Ok(self
                .entries
                .lock()
                .unwrap()
                .last()
                .map(|e| e.current_log_hash.clone())
                .unwrap_or_else(|| AuditLogEntry::GENESIS_HASH.to_string()))
        }

        fn read_last_sequence(&self) -> LedgerResult<u64> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(LedgerError::StoreUnavailable {
                    reason: "reads down".to_string(),
                });
            }
            Ok(self
                .entries
                .lock()
                .unwrap()
                .last()
                .map(|e| e.sequence_number)
                .unwrap_or(0))
        }
    }

    /// Records every failed attempt.
    #[derive(Default)]
    pub(crate) struct MockEmergency {
        pub(crate) records: Mutex<Vec<(FailedAppend, String)>>,
    }

    impl EmergencyChannel for MockEmergency {
        fn record(&self, attempt: &FailedAppend, error: &LedgerError) {
            self.records
                .lock()
                .unwrap()
                .push((attempt.clone(), error.to_string()));
        }
    }

    #[derive(Default)]
    struct MockBackup {
        sequences: Mutex<Vec<u64>>,
    }

    impl BackupQueue for MockBackup {
        fn enqueue(&self, entry: &AuditLogEntry) {
            self.sequences.lock().unwrap().push(entry.sequence_number);
        }
    }

    pub(crate) fn content(entity_id: &str, description: &str) -> EntryContent {
        EntryContent {
            actor: Actor::new("u-op-1", "Operator One"),
            action: AuditAction::Update,
            action_description: description.to_string(),
            entity_ref: EntityRef::new("batch", entity_id, format!("LOT-{entity_id}")),
            before: None,
            after: None,
            context: RequestContext::default(),
            flags: EntryFlags::default(),
            custody: None,
        }
    }

    fn pipeline(
        store: &Arc<MockStore>,
        emergency: &Arc<MockEmergency>,
        backup: Option<Arc<MockBackup>>,
    ) -> AppendPipeline {
        AppendPipeline::open(
            store.clone(),
            Arc::new(MockHasher),
            emergency.clone(),
            backup.map(|b| b as Arc<dyn BackupQueue>),
        )
        .unwrap()
    }

    // ── Tests ─────────────────────────────────────────────────────────────────

    #[test]
    fn sequential_appends_link_and_count_from_one() {
        let store = Arc::new(MockStore::default());
        let emergency = Arc::new(MockEmergency::default());
        let p = pipeline(&store, &emergency, None);

        let e1 = p.append(content("b-1", "first")).unwrap();
        let e2 = p.append(content("b-1", "second")).unwrap();
        let e3 = p.append(content("b-2", "third")).unwrap();

        assert_eq!(e1.sequence_number, 1);
        assert_eq!(e1.previous_log_hash, AuditLogEntry::GENESIS_HASH);
        assert_eq!(e2.previous_log_hash, e1.current_log_hash);
        assert_eq!(e3.previous_log_hash, e2.current_log_hash);
        assert_eq!(e3.sequence_number, 3);
        assert_eq!(p.head().sequence, 3);
        assert_eq!(p.head().last_hash, e3.current_log_hash);
        assert!(emergency.records.lock().unwrap().is_empty());
    }

    #[test]
    fn validation_failure_records_emergency_and_allocates_nothing() {
        let store = Arc::new(MockStore::default());
        let emergency = Arc::new(MockEmergency::default());
        let p = pipeline(&store, &emergency, None);

        let failure = p.append(content("b-1", "   ")).unwrap_err();
        assert!(matches!(failure.source, LedgerError::Validation { .. }));
        assert_eq!(failure.attempt.sequence, None);
        assert_eq!(failure.attempt.stage, AppendStage::Draft);

        let records = emergency.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        drop(records);

        let next = p.append(content("b-1", "ok")).unwrap();
        assert_eq!(next.sequence_number, 1);
    }

    #[test]
    fn store_failure_on_mth_append_rolls_back_sequence() {
        let store = Arc::new(MockStore::default());
        let emergency = Arc::new(MockEmergency::default());
        let p = pipeline(&store, &emergency, None);

        store.fail_on_sequence.store(3, Ordering::SeqCst);
        p.append(content("b-1", "one")).unwrap();
        p.append(content("b-1", "two")).unwrap();

        let failure = p.append(content("b-1", "three")).unwrap_err();
        assert!(matches!(failure.source, LedgerError::StoreUnavailable { .. }));
        assert_eq!(failure.attempt.sequence, Some(3));
        assert_eq!(failure.attempt.stage, AppendStage::Hashed);
        assert_eq!(store.entries.lock().unwrap().len(), 2);
        assert_eq!(p.head().sequence, 2, "failed allocation must be taken back");

        let records = emergency.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].0.sequence, Some(3));
        assert!(records[0].1.contains("injected failure"));
        drop(records);

        // A fresh append reuses sequence 3 once the store recovers.
        store.fail_on_sequence.store(0, Ordering::SeqCst);
        let retry = p.append(content("b-1", "three again")).unwrap();
        assert_eq!(retry.sequence_number, 3);
    }

    #[test]
    fn unreachable_store_marks_state_stale_until_recovered() {
        let store = Arc::new(MockStore::default());
        let emergency = Arc::new(MockEmergency::default());
        let p = pipeline(&store, &emergency, None);
        p.append(content("b-1", "one")).unwrap();

        store.fail_reads.store(true, Ordering::SeqCst);
        let failure = p.append(content("b-1", "two")).unwrap_err();
        assert!(matches!(failure.source, LedgerError::StoreUnavailable { .. }));

        store.fail_reads.store(false, Ordering::SeqCst);
        let e = p.append(content("b-1", "two")).unwrap();
        assert_eq!(e.sequence_number, 2);
    }

    #[test]
    fn restart_after_durable_write_resyncs_from_store() {
        let store = Arc::new(MockStore::default());
        let emergency = Arc::new(MockEmergency::default());

        let first = pipeline(&store, &emergency, None);
        first.append(content("b-1", "one")).unwrap();
        let last = first.append(content("b-1", "two")).unwrap();
        drop(first); // process "crash"

        let second = pipeline(&store, &emergency, None);
        assert_eq!(second.head().sequence, 2);
        let next = second.append(content("b-1", "three")).unwrap();
        assert_eq!(next.sequence_number, 3);
        assert_eq!(next.previous_log_hash, last.current_log_hash);
    }

    #[test]
    fn foreign_writer_conflict_is_chain_linkage_failure() {
        let store = Arc::new(MockStore::default());
        let emergency = Arc::new(MockEmergency::default());
        let a = pipeline(&store, &emergency, None);
        let b = pipeline(&store, &emergency, None);

        a.append(content("b-1", "from a")).unwrap();

        // `b` still believes the head is 0 and allocates sequence 1.
        let failure = b.append(content("b-1", "from b")).unwrap_err();
        assert!(matches!(failure.source, LedgerError::ChainLinkage { .. }));

        // The failed attempt resynced `b`, so its next append links correctly.
        let e = b.append(content("b-1", "from b again")).unwrap();
        assert_eq!(e.sequence_number, 2);
    }

    #[test]
    fn concurrent_appends_form_contiguous_range() {
        let store = Arc::new(MockStore::default());
        let emergency = Arc::new(MockEmergency::default());
        let p = pipeline(&store, &emergency, None);

        let threads = 8;
        let per_thread = 25;
        std::thread::scope(|s| {
            for t in 0..threads {
                let p = &p;
                s.spawn(move || {
                    for i in 0..per_thread {
                        p.append(content(&format!("b-{t}"), &format!("write {i}")))
                            .unwrap();
                    }
                });
            }
        });

        let entries = store.entries.lock().unwrap();
        let total = (threads * per_thread) as u64;
        assert_eq!(entries.len() as u64, total);
        for (idx, entry) in entries.iter().enumerate() {
            assert_eq!(entry.sequence_number, idx as u64 + 1);
        }
    }

    #[test]
    fn only_flagged_entries_are_backed_up() {
        let store = Arc::new(MockStore::default());
        let emergency = Arc::new(MockEmergency::default());
        let backup = Arc::new(MockBackup::default());
        let p = pipeline(&store, &emergency, Some(backup.clone()));

        p.append(content("b-1", "routine")).unwrap();

        let mut critical = content("b-1", "batch released");
        critical.flags.gmp_critical = true;
        p.append(critical).unwrap();

        let mut regulatory = content("b-1", "submitted to agency");
        regulatory.flags.regulatory_event = true;
        p.append(regulatory).unwrap();

        assert_eq!(*backup.sequences.lock().unwrap(), vec![2, 3]);
    }

    #[test]
    fn transfer_without_custody_never_reaches_store() {
        let store = Arc::new(MockStore::default());
        let emergency = Arc::new(MockEmergency::default());
        let p = pipeline(&store, &emergency, None);

        let mut c = content("b-1", "moved");
        c.action = AuditAction::Transfer;
        assert!(p.append(c.clone()).is_err());

        c.custody = Some(CustodyDetails {
            from_actor: Actor::new("u-1", "A"),
            to_actor: Actor::new("u-2", "B"),
            location: "Dock 4".to_string(),
            conditions: None,
        });
        let e = p.append(c).unwrap();
        assert_eq!(e.sequence_number, 1);
        assert_eq!(store.entries.lock().unwrap().len(), 1);
    }
}
