//! Scenario 3: Store Outage
//!
//! The primary store goes down in the middle of a batch release.
//!
//!   1. Three routine entries are persisted (#1..#3)
//!   2. The store becomes unreachable
//!   3. The QP release fails: the caller gets an `AuditWriteFailure`, the
//!      emergency channel records the attempt, and the release itself does
//!      not complete
//!   4. The store comes back; the release is retried as a new append and
//!      takes #4, so the stream has no hole
//!   5. The chain verifies end to end

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chronicle_audit::InMemoryAuditStore;
use chronicle_contracts::{
    entry::{AuditAction, AuditLogEntry, EntryFlags},
    error::{AppendStage, LedgerError, LedgerResult},
};
use chronicle_core::traits::AuditLogStore;
use chronicle_recovery::{EmergencyRecord, InMemoryBackupSink, InMemoryEmergencyLogger};

use crate::mock_data::{
    batch, batch_in_production, batch_released, batch_yield_recorded, production_operator,
    qa_reviewer, qualified_person, terminal_session,
};
use crate::scenarios::{in_memory_ledger, print_chain_report};
use crate::services::QualityRecords;

const PRODUCT: &str = "Metformin 500 mg tablets";

/// A store whose connection can be cut.
pub struct OutageStore {
    inner: InMemoryAuditStore,
    down: AtomicBool,
}

impl OutageStore {
    pub fn new() -> Self {
        Self {
            inner: InMemoryAuditStore::new(),
            down: AtomicBool::new(false),
        }
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> LedgerResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(LedgerError::StoreUnavailable {
                reason: "connection refused by audit database".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for OutageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogStore for OutageStore {
    fn append_atomic(&self, entry: &AuditLogEntry) -> LedgerResult<()> {
        self.check()?;
        self.inner.append_atomic(entry)
    }

    fn read_range(&self, from_seq: u64, to_seq: u64) -> LedgerResult<Vec<AuditLogEntry>> {
        self.check()?;
        self.inner.read_range(from_seq, to_seq)
    }

    fn read_last_hash(&self) -> LedgerResult<String> {
        self.check()?;
        self.inner.read_last_hash()
    }

    fn read_last_sequence(&self) -> LedgerResult<u64> {
        self.check()?;
        self.inner.read_last_sequence()
    }
}

#[derive(Debug)]
pub struct OutageOutcome {
    pub failed_sequence: Option<u64>,
    pub failed_stage: AppendStage,
    pub emergency: Vec<EmergencyRecord>,
    pub retried: AuditLogEntry,
    pub chain_valid: bool,
    pub last_sequence: u64,
}

pub fn run_scenario() -> LedgerResult<OutageOutcome> {
    println!("=== Scenario 3: Store Outage ===");
    println!();

    let store = Arc::new(OutageStore::new());
    let emergency = Arc::new(InMemoryEmergencyLogger::new());
    let ledger = in_memory_ledger(
        store.clone(),
        emergency.clone(),
        Arc::new(InMemoryBackupSink::new()),
    )?;
    let records = QualityRecords::new(&ledger.service)?;
    let lot = batch("0512");
    let session = terminal_session("sess-qp-11");

    records.update_batch(
        production_operator(),
        lot.clone(),
        "batch record opened on line 1",
        None,
        batch_in_production(PRODUCT),
        session.clone(),
    )?;
    records.update_batch(
        production_operator(),
        lot.clone(),
        "yield recorded",
        Some(batch_in_production(PRODUCT)),
        batch_yield_recorded(PRODUCT, 98.4),
        session.clone(),
    )?;
    records.review_batch(qa_reviewer(), lot.clone(), "record reviewed", session.clone())?;
    println!("  #1..#3 persisted");

    // ── Outage ────────────────────────────────────────────────────────────────

    store.set_down(true);
    println!("  Audit store: DOWN");

    let release = |description: &str| {
        ledger.service.append(
            qualified_person(),
            AuditAction::Approve,
            description,
            lot.clone(),
            Some(batch_yield_recorded(PRODUCT, 98.4)),
            Some(batch_released(PRODUCT, 98.4)),
            session.clone(),
            EntryFlags {
                regulatory_event: true,
                gmp_critical: true,
                requires_review: true,
            },
        )
    };

    let failure = match release("batch certified and released") {
        Ok(entry) => {
            return Err(LedgerError::IntegrityViolation {
                reason: format!(
                    "append #{} succeeded against an unavailable store",
                    entry.sequence_number
                ),
            })
        }
        Err(failure) => failure,
    };
    println!("  Release REFUSED: {failure}");
    println!(
        "  Emergency records:      {} (attempted #{})",
        emergency.len(),
        failure
            .attempt
            .sequence
            .map_or_else(|| "-".to_string(), |s| s.to_string())
    );

    // ── Recovery ──────────────────────────────────────────────────────────────

    store.set_down(false);
    println!("  Audit store: UP");

    let retried = release("batch certified and released (retry after outage)")
        .map_err(LedgerError::from)?;
    println!("  Release retried as #{}", retried.sequence_number);

    let report = ledger.service.verify_chain(None, None)?;
    print_chain_report(&report);

    println!();
    println!("  Scenario 3 complete.");
    println!();

    Ok(OutageOutcome {
        failed_sequence: failure.attempt.sequence,
        failed_stage: failure.attempt.stage,
        emergency: emergency.records(),
        last_sequence: ledger.service.stream_head().sequence,
        retried,
        chain_valid: report.valid,
    })
}
