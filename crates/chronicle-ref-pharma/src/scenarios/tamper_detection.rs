//! Scenario 4: Tamper Detection
//!
//! Three entries E1..E3 are recorded for one batch; E2 is the QP release and
//! is sealed into the encrypted backup.  Someone with database access then
//! overwrites E2's stored hash to cover an edit.
//!
//! Replaying the chain reports exactly one `hash_mismatch` at E2 and a
//! `broken_link` at E3, whose stored predecessor hash no longer matches.
//! The backed-up copy of E2 still decrypts and re-hashes cleanly, so the
//! original record can be produced for the investigation.

use std::sync::Arc;

use chronicle_audit::{InMemoryAuditStore, DEFAULT_STORE_TIMEOUT};
use chronicle_contracts::{
    entry::AuditLogEntry,
    error::{LedgerError, LedgerResult},
    verification::ChainVerificationResult,
};
use chronicle_core::traits::IntegrityVerifier;
use chronicle_recovery::{EncryptedBackup, InMemoryBackupSink, InMemoryEmergencyLogger};
use chronicle_verify::ChainVerifier;

use crate::mock_data::{
    batch, batch_in_production, batch_released, batch_yield_recorded, production_operator,
    qa_reviewer, qualified_person, terminal_session,
};
use crate::scenarios::{in_memory_ledger, print_chain_report};
use crate::services::QualityRecords;

const PRODUCT: &str = "Atorvastatin 20 mg tablets";

#[derive(Debug)]
pub struct TamperOutcome {
    pub entries: Vec<AuditLogEntry>,
    pub before_tamper: ChainVerificationResult,
    pub after_tamper: ChainVerificationResult,
    /// The original E2 recovered from its encrypted backup.
    pub recovered: Option<AuditLogEntry>,
}

pub fn run_scenario() -> LedgerResult<TamperOutcome> {
    println!("=== Scenario 4: Tamper Detection ===");
    println!();

    let store = Arc::new(InMemoryAuditStore::new());
    let sink = Arc::new(InMemoryBackupSink::new());
    let ledger = in_memory_ledger(
        store.clone(),
        Arc::new(InMemoryEmergencyLogger::new()),
        sink.clone(),
    )?;
    let records = QualityRecords::new(&ledger.service)?;
    let lot = batch("0733");
    let session = terminal_session("sess-5d02");

    records.update_batch(
        production_operator(),
        lot.clone(),
        "batch record opened",
        None,
        batch_in_production(PRODUCT),
        session.clone(),
    )?;
    records.update_batch(
        qualified_person(),
        lot.clone(),
        "batch certified and released",
        Some(batch_yield_recorded(PRODUCT, 96.1)),
        batch_released(PRODUCT, 96.1),
        session.clone(),
    )?;
    records.review_batch(qa_reviewer(), lot.clone(), "post-release review", session)?;

    let entries = ledger
        .service
        .get_trail(&lot.entity_type, &lot.entity_id, None, None)?;
    for e in &entries {
        println!(
            "  E{} {:<8} {}…",
            e.sequence_number,
            e.content.action.to_string(),
            &e.current_log_hash[..16]
        );
    }
    println!();

    let before_tamper = ledger.service.verify_chain(None, None)?;
    println!("  Before tampering:");
    print_chain_report(&before_tamper);
    println!();

    // ── Tamper with E2 ────────────────────────────────────────────────────────

    let mut exported = store.export_log()?.entries;
    let target = exported
        .iter_mut()
        .find(|e| e.sequence_number == 2)
        .ok_or_else(|| LedgerError::IntegrityViolation {
            reason: "entry 2 missing from export".to_string(),
        })?;
    target.content.action_description = "batch rejected".to_string();
    target.current_log_hash = "0badc0de".repeat(8);
    let tampered = InMemoryAuditStore::from_entries(exported, DEFAULT_STORE_TIMEOUT);

    let verifier = ChainVerifier::new(ledger.engine.clone());
    let after_tamper = verifier.verify_range(&tampered, 1, None)?;
    println!("  After E2 was edited and its hash overwritten:");
    print_chain_report(&after_tamper);
    println!();

    // ── Recover from backup ───────────────────────────────────────────────────

    ledger.flush_backups();
    let mut recovered = None;
    if let Some(key) = ledger.backup_key() {
        for record in sink.records().iter().filter(|r| r.sequence_number == 2) {
            let original = EncryptedBackup::verify_backup_record(key, &*ledger.engine, record)?;
            println!(
                "  Backup of E2 verified offline: \"{}\"",
                original.content.action_description
            );
            recovered = Some(original);
        }
    }

    println!();
    println!("  Scenario 4 complete.");
    println!();

    Ok(TamperOutcome {
        entries,
        before_tamper,
        after_tamper,
        recovered,
    })
}

#[cfg(test)]
mod tests {
    use chronicle_contracts::verification::ViolationType;

    use super::*;

    #[test]
    fn test_chain_is_clean_before_tampering() {
        let outcome = run_scenario().unwrap();
        assert_eq!(outcome.entries.len(), 3);
        assert!(outcome.before_tamper.valid);
    }

    #[test]
    fn test_tampered_e2_flags_mismatch_and_downstream_link() {
        let report = run_scenario().unwrap().after_tamper;
        assert!(!report.valid);
        assert_eq!(report.count(ViolationType::HashMismatch), 1);
        assert_eq!(report.count(ViolationType::BrokenLink), 1);

        let mismatch = report
            .violations
            .iter()
            .find(|v| v.violation_type == ViolationType::HashMismatch)
            .unwrap();
        assert_eq!(mismatch.sequence, 2);
        let broken = report
            .violations
            .iter()
            .find(|v| v.violation_type == ViolationType::BrokenLink)
            .unwrap();
        assert_eq!(broken.sequence, 3);
        assert_eq!(report.first_invalid_sequence, Some(2));
    }

    #[test]
    fn test_original_e2_recovered_from_backup() {
        let outcome = run_scenario().unwrap();
        let recovered = outcome.recovered.expect("E2 should be in the backup");
        assert_eq!(recovered, outcome.entries[1]);
        assert_eq!(
            recovered.content.action_description,
            "batch certified and released"
        );
    }
}
