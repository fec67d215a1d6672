//! Scenario 1: Batch Release
//!
//! A batch moves from the production line to QP release.  Every step is an
//! explicit call into the ledger from the business operation:
//!
//!   1. Operator creates the batch record          → `create`
//!   2. Operator records the yield                 → `update`
//!   3. QA reviews the record                      → `review`
//!   4. A payload with an unknown status is refused at the service boundary
//!      by the batch JSON Schema; nothing is appended
//!   5. QP releases the batch                      → `approve`, GMP-critical
//!   6. The release is sealed into the encrypted backup off the critical path
//!   7. The chain is verified and the backup re-hashed without the store

use std::sync::Arc;

use chronicle_audit::InMemoryAuditStore;
use chronicle_contracts::{entry::AuditLogEntry, error::LedgerResult};
use chronicle_recovery::{BackupStats, EncryptedBackup, InMemoryBackupSink, InMemoryEmergencyLogger};

use crate::mock_data::{
    batch, batch_in_production, batch_released, batch_with_unknown_status,
    batch_yield_recorded, production_operator, qa_reviewer, qualified_person,
    terminal_session,
};
use crate::scenarios::{in_memory_ledger, print_chain_report};
use crate::services::QualityRecords;

const PRODUCT: &str = "Amlodipine 5 mg tablets";

#[derive(Debug)]
pub struct BatchReleaseOutcome {
    pub trail: Vec<AuditLogEntry>,
    pub schema_rejection: Option<String>,
    pub chain_valid: bool,
    pub backups: BackupStats,
    /// Sequence of the release entry restored from its backup.
    pub restored_from_backup: Option<u64>,
}

pub fn run_scenario() -> LedgerResult<BatchReleaseOutcome> {
    println!("=== Scenario 1: Batch Release ===");
    println!();

    let sink = Arc::new(InMemoryBackupSink::new());
    let ledger = in_memory_ledger(
        Arc::new(InMemoryAuditStore::new()),
        Arc::new(InMemoryEmergencyLogger::new()),
        sink.clone(),
    )?;
    let records = QualityRecords::new(&ledger.service)?;

    let lot = batch("0417");
    let session = terminal_session("sess-7f31");

    // ── Production ────────────────────────────────────────────────────────────

    let created = records.update_batch(
        production_operator(),
        lot.clone(),
        "batch record opened on line 3",
        None,
        batch_in_production(PRODUCT),
        session.clone(),
    )?;
    println!("  #{} create   {} by {}", created.sequence_number, lot, created.content.actor);

    let yielded = records.update_batch(
        production_operator(),
        lot.clone(),
        "yield recorded at end of compression",
        Some(batch_in_production(PRODUCT)),
        batch_yield_recorded(PRODUCT, 97.8),
        session.clone(),
    )?;
    println!("  #{} update   yield 97.8%", yielded.sequence_number);

    let reviewed = records.review_batch(
        qa_reviewer(),
        lot.clone(),
        "executed batch record reviewed; no open deviations",
        session.clone(),
    )?;
    println!("  #{} review   by {}", reviewed.sequence_number, reviewed.content.actor);

    // ── Boundary validation ───────────────────────────────────────────────────

    let schema_rejection = match records.update_batch(
        production_operator(),
        lot.clone(),
        "status changed from terminal",
        Some(batch_yield_recorded(PRODUCT, 97.8)),
        batch_with_unknown_status(PRODUCT),
        session.clone(),
    ) {
        Ok(entry) => {
            println!("  UNEXPECTED: invalid payload accepted as #{}", entry.sequence_number);
            None
        }
        Err(e) => {
            println!("  REFUSED   {e}");
            Some(e.to_string())
        }
    };

    // ── Release ───────────────────────────────────────────────────────────────

    let released = records.update_batch(
        qualified_person(),
        lot.clone(),
        "batch certified and released for sale",
        Some(batch_yield_recorded(PRODUCT, 97.8)),
        batch_released(PRODUCT, 97.8),
        session,
    )?;
    println!(
        "  #{} approve  by {} (gmp_critical, regulatory)",
        released.sequence_number, released.content.actor
    );
    println!();

    // ── Verification ──────────────────────────────────────────────────────────

    let trail = ledger
        .service
        .get_trail(&lot.entity_type, &lot.entity_id, None, None)?;
    println!("  Trail for {}: {} entries, oldest first", lot, trail.len());

    let report = ledger.service.verify_chain(None, None)?;
    print_chain_report(&report);

    ledger.flush_backups();
    let backups = ledger
        .backup
        .as_ref()
        .map(|b| b.stats())
        .unwrap_or_default();
    println!(
        "  Encrypted backups:      {} written, {} failed",
        backups.succeeded, backups.failed
    );

    let mut restored_from_backup = None;
    if let Some(key) = ledger.backup_key() {
        for record in sink.records() {
            let entry = EncryptedBackup::verify_backup_record(key, &*ledger.engine, &record)?;
            println!(
                "  Backup #{} decrypted and re-hashed offline: OK",
                entry.sequence_number
            );
            restored_from_backup = Some(entry.sequence_number);
        }
    }

    println!();
    println!("  Scenario 1 complete.");
    println!();

    Ok(BatchReleaseOutcome {
        trail,
        schema_rejection,
        chain_valid: report.valid,
        backups,
        restored_from_backup,
    })
}

#[cfg(test)]
mod tests {
    use chronicle_contracts::entry::AuditAction;

    use super::*;

    #[test]
    fn test_batch_release_records_full_trail() {
        let outcome = run_scenario().unwrap();

        let actions: Vec<AuditAction> = outcome.trail.iter().map(|e| e.content.action).collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::Create,
                AuditAction::Update,
                AuditAction::Review,
                AuditAction::Approve
            ]
        );
        let seqs: Vec<u64> = outcome.trail.iter().map(|e| e.sequence_number).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4]);
        assert!(outcome.chain_valid);
    }

    #[test]
    fn test_invalid_payload_never_reaches_ledger() {
        let outcome = run_scenario().unwrap();
        let reason = outcome.schema_rejection.expect("payload should be refused");
        assert!(reason.contains("validation"), "{reason}");
        assert_eq!(outcome.trail.len(), 4);
    }

    #[test]
    fn test_only_release_is_backed_up() {
        let outcome = run_scenario().unwrap();
        assert_eq!(outcome.backups.enqueued, 1);
        assert_eq!(outcome.backups.succeeded, 1);
        assert_eq!(outcome.restored_from_backup, Some(4));
    }
}
