//! The audit service facade used by business modules.
//!
//! `AuditService` exposes the six ledger operations.  Writes go through the
//! `AppendPipeline`; reads go straight to the store and never take the
//! pipeline lock, so trails and verification run alongside appends.

use std::convert::TryFrom;
use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use chronicle_contracts::{
    custody::{CustodyChainVerificationResult, CustodyDetails, CustodyRecord, MalformedTransfer},
    entry::{
        Actor, AuditAction, AuditLogEntry, EntityRef, EntryContent, EntryFlags, FieldDiff,
        RequestContext,
    },
    error::{AuditWriteFailure, LedgerResult},
    verification::ChainVerificationResult,
};

use crate::{
    pipeline::AppendPipeline,
    sequence::StreamHead,
    traits::{AuditLogStore, BackupQueue, ChainHasher, EmergencyChannel, IntegrityVerifier},
};

/// Default number of entries fetched per `read_range` call.
pub const DEFAULT_PAGE_SIZE: u64 = 500;

/// Filter for `get_trail_page`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrailQuery {
    pub entity_type: String,
    pub entity_id: String,
    /// Only entries at or after this instant.
    pub from: Option<DateTime<Utc>>,
    /// Only entries at or before this instant.
    pub to: Option<DateTime<Utc>>,
    /// Maximum entries per page.
    pub limit: usize,
}

/// One page of an entity's trail.
///
/// Pass `next_cursor` back into `get_trail_page` to continue; `None` means
/// the trail was exhausted up to the head observed when the page was read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailPage {
    pub entries: Vec<AuditLogEntry>,
    pub next_cursor: Option<u64>,
}

/// The ledger as seen by business services.
pub struct AuditService {
    pipeline: AppendPipeline,
    store: Arc<dyn AuditLogStore>,
    verifier: Box<dyn IntegrityVerifier>,
    page_size: u64,
}

impl AuditService {
    pub fn new(
        pipeline: AppendPipeline,
        store: Arc<dyn AuditLogStore>,
        verifier: Box<dyn IntegrityVerifier>,
        page_size: u64,
    ) -> Self {
        Self {
            pipeline,
            store,
            verifier,
            page_size: page_size.max(1),
        }
    }

    /// Wire a pipeline over `store` and load the chain pointer from it.
    ///
    /// Use this at process start so the first append continues the stream
    /// that is actually on disk.
    pub fn open(
        store: Arc<dyn AuditLogStore>,
        hasher: Arc<dyn ChainHasher>,
        verifier: Box<dyn IntegrityVerifier>,
        emergency: Arc<dyn EmergencyChannel>,
        backup: Option<Arc<dyn BackupQueue>>,
        page_size: u64,
    ) -> LedgerResult<Self> {
        let pipeline = AppendPipeline::open(store.clone(), hasher, emergency, backup)?;
        let head = pipeline.head();
        info!(
            sequence = head.sequence,
            last_hash = %head.last_hash,
            "audit service opened"
        );
        Ok(Self::new(pipeline, store, verifier, page_size))
    }

    /// Record a regulated event.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        actor: Actor,
        action: AuditAction,
        action_description: impl Into<String>,
        entity_ref: EntityRef,
        before: Option<FieldDiff>,
        after: Option<FieldDiff>,
        context: RequestContext,
        flags: EntryFlags,
    ) -> Result<AuditLogEntry, AuditWriteFailure> {
        self.pipeline.append(EntryContent {
            actor,
            action,
            action_description: action_description.into(),
            entity_ref,
            before,
            after,
            context,
            flags,
            custody: None,
        })
    }

    /// Record a prepared `EntryContent` as-is.
    pub fn append_content(&self, content: EntryContent) -> Result<AuditLogEntry, AuditWriteFailure> {
        self.pipeline.append(content)
    }

    /// Record a hand-over of `entity_ref` from one custodian to another.
    ///
    /// The releasing custodian is recorded as the entry's actor.
    pub fn record_custody_transfer(
        &self,
        entity_ref: EntityRef,
        from_actor: Actor,
        to_actor: Actor,
        location: impl Into<String>,
        conditions: Option<String>,
        context: RequestContext,
    ) -> Result<AuditLogEntry, AuditWriteFailure> {
        let location = location.into();
        let description = format!(
            "custody of {} transferred from {} to {} at {}",
            entity_ref.identifier, from_actor.display_name, to_actor.display_name, location
        );

        let mut before = FieldDiff::new();
        before.insert("custodian".to_string(), json!(from_actor.id));
        let mut after = FieldDiff::new();
        after.insert("custodian".to_string(), json!(to_actor.id));

        self.pipeline.append(EntryContent {
            actor: from_actor.clone(),
            action: AuditAction::Transfer,
            action_description: description,
            entity_ref,
            before: Some(before),
            after: Some(after),
            context,
            flags: EntryFlags {
                regulatory_event: true,
                ..EntryFlags::default()
            },
            custody: Some(CustodyDetails {
                from_actor,
                to_actor,
                location,
                conditions,
            }),
        })
    }

    /// All entries about one entity, oldest first.
    pub fn get_trail(
        &self,
        entity_type: &str,
        entity_id: &str,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> LedgerResult<Vec<AuditLogEntry>> {
        let query = TrailQuery {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            from,
            to,
            limit: usize::MAX,
        };
        let mut trail = Vec::new();
        let mut cursor = None;
        loop {
            let page = self.get_trail_page(&query, cursor)?;
            trail.extend(page.entries);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(trail)
    }

    /// One page of an entity's trail, starting at sequence `cursor`
    /// (or the beginning of the stream).
    pub fn get_trail_page(&self, query: &TrailQuery, cursor: Option<u64>) -> LedgerResult<TrailPage> {
        let start = cursor.unwrap_or(AuditLogEntry::FIRST_SEQUENCE);
        let limit = query.limit.max(1);
        let mut entries = Vec::new();

        let next_cursor = self.scan(start, |entry| {
            let ts = entry.timestamp;
            let in_window = query.from.map_or(true, |from| ts >= from)
                && query.to.map_or(true, |to| ts <= to);
            if in_window
                && entry
                    .content
                    .entity_ref
                    .matches(&query.entity_type, &query.entity_id)
            {
                entries.push(entry);
                if entries.len() >= limit {
                    return ControlFlow::Break(());
                }
            }
            ControlFlow::Continue(())
        })?;

        debug!(
            entity_type = %query.entity_type,
            entity_id = %query.entity_id,
            returned = entries.len(),
            next_cursor = ?next_cursor,
            "trail page read"
        );

        Ok(TrailPage {
            entries,
            next_cursor,
        })
    }

    /// Replay `from_seq..=to_seq` (defaults: whole stream up to the head).
    pub fn verify_chain(
        &self,
        from_seq: Option<u64>,
        to_seq: Option<u64>,
    ) -> LedgerResult<ChainVerificationResult> {
        let from = from_seq.unwrap_or(AuditLogEntry::FIRST_SEQUENCE);
        let result = self.verifier.verify_range(&*self.store, from, to_seq)?;

        if result.valid {
            info!(
                from = result.from_sequence,
                to = result.to_sequence,
                entries = result.entries_examined,
                "audit chain verified"
            );
        } else {
            warn!(
                from = result.from_sequence,
                to = result.to_sequence,
                violations = result.violations.len(),
                first_invalid = ?result.first_invalid_sequence,
                "audit chain verification found violations"
            );
        }
        Ok(result)
    }

    /// The transfer entries of one entity, in time order.
    ///
    /// Transfer entries without custody details are left out here and
    /// reported by `verify_custody_chain`.
    pub fn get_custody_chain(&self, entity_ref: &EntityRef) -> LedgerResult<Vec<CustodyRecord>> {
        let (records, malformed) = self.collect_custody(entity_ref)?;
        for m in &malformed {
            warn!(
                sequence = m.sequence_number,
                detail = %m.detail,
                "transfer entry left out of custody chain"
            );
        }
        Ok(records)
    }

    /// Check that every hand-over of `entity_ref` starts where the previous
    /// one ended.
    pub fn verify_custody_chain(
        &self,
        entity_ref: &EntityRef,
    ) -> LedgerResult<CustodyChainVerificationResult> {
        let (records, malformed) = self.collect_custody(entity_ref)?;
        let mut result = self.verifier.verify_custody(entity_ref, &records);
        result.malformed.extend(malformed);
        result.valid = result.gaps.is_empty() && result.malformed.is_empty();
        if !result.valid {
            warn!(
                entity = %entity_ref,
                gaps = result.gaps.len(),
                malformed = result.malformed.len(),
                "custody chain has gaps"
            );
        }
        Ok(result)
    }

    /// The pipeline's current chain pointer.
    pub fn stream_head(&self) -> StreamHead {
        self.pipeline.head()
    }

    /// Reload the pipeline's link state from the store.
    pub fn resync(&self) -> LedgerResult<u64> {
        self.pipeline.resync()
    }

    // ── Internal helpers ──────────────────────────────────────────────────────

    /// Feed entries from `start` up to the current head into `visit`, one
    /// page at a time.
    ///
    /// Returns the sequence to resume from if `visit` stopped early and
    /// entries remain, otherwise `None`.
    /// Transfer entries of `entity_ref`: well-formed ones in time order, and
    /// those missing custody details.
    fn collect_custody(
        &self,
        entity_ref: &EntityRef,
    ) -> LedgerResult<(Vec<CustodyRecord>, Vec<MalformedTransfer>)> {
        let mut records = Vec::new();
        let mut malformed = Vec::new();
        self.scan(AuditLogEntry::FIRST_SEQUENCE, |entry| {
            if entry.content.action == AuditAction::Transfer
                && entry
                    .content
                    .entity_ref
                    .matches(&entity_ref.entity_type, &entity_ref.entity_id)
            {
                let (sequence_number, entry_id) = (entry.sequence_number, entry.id);
                match CustodyRecord::try_from(entry) {
                    Ok(record) => records.push(record),
                    Err(e) => malformed.push(MalformedTransfer {
                        sequence_number,
                        entry_id,
                        detail: e.to_string(),
                    }),
                }
            }
            ControlFlow::Continue(())
        })?;

        records.sort_by_key(|r| (r.timestamp(), r.sequence_number()));
        Ok((records, malformed))
    }

    fn scan(
        &self,
        start: u64,
        mut visit: impl FnMut(AuditLogEntry) -> ControlFlow<()>,
    ) -> LedgerResult<Option<u64>> {
        let head = self.store.read_last_sequence()?;
        let mut from = start.max(AuditLogEntry::FIRST_SEQUENCE);

        while from <= head {
            let to = from.saturating_add(self.page_size - 1).min(head);
            for entry in self.store.read_range(from, to)? {
                let sequence = entry.sequence_number;
                if visit(entry).is_break() {
                    return Ok((sequence < head).then_some(sequence + 1));
                }
            }
            from = to + 1;
        }
        Ok(None)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chronicle_contracts::{
        custody::{CustodyChainVerificationResult, CustodyGap, CustodyRecord},
        entry::{Actor, EntityRef, RequestContext},
        error::LedgerResult,
        verification::ChainVerificationResult,
    };

    use crate::{
        pipeline::{
            tests::{content, MockEmergency, MockHasher, MockStore},
            AppendPipeline,
        },
        traits::{AuditLogStore, IntegrityVerifier},
    };

    use super::{AuditService, TrailQuery};

    /// Reports only custody continuity; chain replay is tested in
    /// chronicle-verify.
    struct ContinuityOnly;

    impl IntegrityVerifier for ContinuityOnly {
        fn verify_range(
            &self,
            _store: &dyn AuditLogStore,
            from_seq: u64,
            _to_seq: Option<u64>,
        ) -> LedgerResult<ChainVerificationResult> {
            Ok(ChainVerificationResult {
                valid: true,
                from_sequence: from_seq,
                to_sequence: from_seq,
                entries_examined: 0,
                violations: vec![],
                first_invalid_sequence: None,
                verified_at: chrono::Utc::now(),
            })
        }

        fn verify_custody(
            &self,
            entity_ref: &EntityRef,
            records: &[CustodyRecord],
        ) -> CustodyChainVerificationResult {
            let gaps: Vec<CustodyGap> = records
                .windows(2)
                .filter(|w| w[0].to_actor().id != w[1].from_actor().id)
                .map(|w| CustodyGap {
                    sequence_number: w[1].sequence_number(),
                    entry_id: w[1].entry.id,
                    expected_from: w[0].to_actor().clone(),
                    actual_from: w[1].from_actor().clone(),
                    detail: String::new(),
                })
                .collect();
            CustodyChainVerificationResult {
                entity_ref: entity_ref.clone(),
                valid: gaps.is_empty(),
                transfers_examined: records.len(),
                gaps,
                malformed: Vec::new(),
            }
        }
    }

    fn service(page_size: u64) -> (AuditService, Arc<MockStore>) {
        let store = Arc::new(MockStore::default());
        let pipeline = AppendPipeline::open(
            store.clone(),
            Arc::new(MockHasher),
            Arc::new(MockEmergency::default()),
            None,
        )
        .unwrap();
        let service = AuditService::new(pipeline, store.clone(), Box::new(ContinuityOnly), page_size);
        (service, store)
    }

    #[test]
    fn trail_returns_only_entity_entries_oldest_first() {
        let (svc, _) = service(2);
        let e1 = svc.append_content(content("x", "created")).unwrap();
        svc.append_content(content("y", "other batch")).unwrap();
        let e3 = svc.append_content(content("x", "updated")).unwrap();
        let e4 = svc.append_content(content("x", "signed")).unwrap();

        let trail = svc.get_trail("batch", "x", None, None).unwrap();
        let seqs: Vec<u64> = trail.iter().map(|e| e.sequence_number).collect();
        assert_eq!(
            seqs,
            vec![e1.sequence_number, e3.sequence_number, e4.sequence_number]
        );
    }

    #[test]
    fn trail_pages_resume_from_cursor() {
        let (svc, _) = service(3);
        for i in 0..5 {
            svc.append_content(content("x", &format!("step {i}"))).unwrap();
        }

        let query = TrailQuery {
            entity_type: "batch".to_string(),
            entity_id: "x".to_string(),
            from: None,
            to: None,
            limit: 2,
        };
        let p1 = svc.get_trail_page(&query, None).unwrap();
        assert_eq!(p1.entries.len(), 2);
        assert_eq!(p1.next_cursor, Some(3));

        let p2 = svc.get_trail_page(&query, p1.next_cursor).unwrap();
        assert_eq!(p2.entries[0].sequence_number, 3);
        assert_eq!(p2.next_cursor, Some(5));

        let p3 = svc.get_trail_page(&query, p2.next_cursor).unwrap();
        assert_eq!(p3.entries.len(), 1);
        assert_eq!(p3.next_cursor, None);
    }

    #[test]
    fn trail_time_window_filters_entries() {
        let (svc, _) = service(10);
        let e1 = svc.append_content(content("x", "one")).unwrap();
        let e2 = svc.append_content(content("x", "two")).unwrap();

        let trail = svc
            .get_trail("batch", "x", Some(e2.timestamp), None)
            .unwrap();
        assert!(trail.iter().all(|e| e.timestamp >= e2.timestamp));
        assert!(trail.iter().any(|e| e.id == e2.id));

        let trail = svc.get_trail("batch", "x", None, Some(e1.timestamp)).unwrap();
        assert!(trail.iter().any(|e| e.id == e1.id));
        assert!(trail.iter().all(|e| e.timestamp <= e1.timestamp));
    }

    #[test]
    fn custody_chain_filters_transfers_for_entity() {
        let (svc, _) = service(10);
        let lot = EntityRef::new("sample", "s-1", "SMP-1");
        let a = Actor::new("a", "Alice");
        let b = Actor::new("b", "Bob");
        let c = Actor::new("c", "Carol");

        svc.record_custody_transfer(lot.clone(), a.clone(), b.clone(), "Dock", None, RequestContext::default())
            .unwrap();
        svc.append_content(content("s-1", "unrelated batch entry")).unwrap();
        svc.record_custody_transfer(lot.clone(), b.clone(), c.clone(), "QC lab", None, RequestContext::default())
            .unwrap();

        let chain = svc.get_custody_chain(&lot).unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].from_actor().id, "a");
        assert_eq!(chain[1].to_actor().id, "c");
        assert!(chain[0].entry.content.flags.regulatory_event);

        let result = svc.verify_custody_chain(&lot).unwrap();
        assert!(result.valid);
        assert_eq!(result.transfers_examined, 2);
    }

    #[test]
    fn transfer_without_details_invalidates_custody_chain() {
        let (svc, store) = service(10);
        let lot = EntityRef::new("sample", "s-2", "SMP-2");
        let a = Actor::new("a", "Alice");
        let b = Actor::new("b", "Bob");
        let c = Actor::new("c", "Carol");

        svc.record_custody_transfer(lot.clone(), a, b.clone(), "Dock", None, RequestContext::default())
            .unwrap();

        // A transfer written around the pipeline, with its details stripped.
        let bare = {
            let mut entries = store.entries.lock().unwrap();
            let last = entries.last().unwrap().clone();
            let mut bare = last.clone();
            bare.id = uuid::Uuid::new_v4();
            bare.sequence_number = last.sequence_number + 1;
            bare.previous_log_hash = last.current_log_hash.clone();
            bare.current_log_hash = "f".repeat(64);
            bare.content.custody = None;
            entries.push(bare.clone());
            bare
        };
        svc.resync().unwrap();

        svc.record_custody_transfer(lot.clone(), b, c, "QC lab", None, RequestContext::default())
            .unwrap();

        assert_eq!(svc.get_custody_chain(&lot).unwrap().len(), 2);

        let result = svc.verify_custody_chain(&lot).unwrap();
        assert!(result.gaps.is_empty());
        assert!(!result.valid);
        assert_eq!(result.malformed.len(), 1);
        assert_eq!(result.malformed[0].sequence_number, bare.sequence_number);
        assert_eq!(result.malformed[0].entry_id, bare.id);
    }

    #[test]
    fn stream_head_tracks_appends() {
        let (svc, store) = service(10);
        assert_eq!(svc.stream_head().sequence, 0);
        let e = svc.append_content(content("x", "one")).unwrap();
        assert_eq!(svc.stream_head().sequence, 1);
        assert_eq!(svc.stream_head().last_hash, e.current_log_hash);
        assert_eq!(svc.resync().unwrap(), store.read_last_sequence().unwrap());
    }

    #[test]
    fn open_continues_an_existing_stream() {
        let (first, store) = service(10);
        first.append_content(content("x", "one")).unwrap();
        let last = first.append_content(content("x", "two")).unwrap();

        let reopened = AuditService::open(
            store.clone(),
            Arc::new(MockHasher),
            Box::new(ContinuityOnly),
            Arc::new(MockEmergency::default()),
            None,
            10,
        )
        .unwrap();
        assert_eq!(reopened.stream_head().sequence, 2);
        assert_eq!(reopened.stream_head().last_hash, last.current_log_hash);

        let next = reopened.append_content(content("x", "three")).unwrap();
        assert_eq!(next.sequence_number, 3);
        assert_eq!(next.previous_log_hash, last.current_log_hash);
    }
}
