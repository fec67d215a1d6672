//! # chronicle-ref-pharma
//!
//! GMP pharmaceutical reference services for the Chronicle audit ledger.
//!
//! Demonstrates four scenarios using mock site data:
//!
//! 1. **Batch Release** — explicit audit calls from batch record operations,
//!    JSON Schema checks at the service boundary, encrypted backup of the
//!    GMP-critical release.
//! 2. **Sample Custody** — a continuous hand-over chain and one with a
//!    missing hand-over.
//! 3. **Store Outage** — a failed append reaches the emergency channel and a
//!    retry continues the stream without a hole.
//! 4. **Tamper Detection** — an overwritten entry is located by chain replay
//!    and recovered from its backup.
//!
//! All data is fictional.  No external systems are contacted.

pub mod mock_data;
pub mod scenarios;
pub mod schemas;
pub mod services;
pub mod wiring;

pub use schemas::PayloadSchemas;
pub use services::QualityRecords;
pub use wiring::{Ledger, LedgerParts};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::path::Path;

    use serde_json::json;

    use chronicle_audit::JsonlAuditStore;
    use chronicle_config::{LedgerConfig, StoreKind};
    use chronicle_contracts::{entry::FieldDiff, error::LedgerError};
    use chronicle_recovery::{DirectoryBackupSink, EncryptedBackup};

    use super::*;
    use crate::mock_data::*;

    // ── Schemas ───────────────────────────────────────────────────────────────

    #[test]
    fn test_batch_schema_accepts_valid_payloads() {
        let schemas = PayloadSchemas::gmp().unwrap();
        schemas.validate("batch", &batch_in_production("X")).unwrap();
        schemas.validate("batch", &batch_released("X", 99.0)).unwrap();
        schemas
            .validate("deviation", &deviation_opened("tablet hardness low", "major"))
            .unwrap();
    }

    #[test]
    fn test_batch_schema_rejects_unknown_status() {
        let schemas = PayloadSchemas::gmp().unwrap();
        let err = schemas
            .validate("batch", &batch_with_unknown_status("X"))
            .unwrap_err();
        match err {
            LedgerError::Validation { reason } => assert!(reason.contains("batch payload"), "{reason}"),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_yield_rejected() {
        let schemas = PayloadSchemas::gmp().unwrap();
        assert!(schemas
            .validate("batch", &batch_yield_recorded("X", 140.0))
            .is_err());
    }

    #[test]
    fn test_unregistered_entity_type_accepts_anything() {
        let schemas = PayloadSchemas::gmp().unwrap();
        let mut payload = FieldDiff::new();
        payload.insert("anything".to_string(), json!([1, 2, 3]));
        schemas.validate("equipment", &payload).unwrap();
    }

    #[test]
    fn test_malformed_schema_is_config_error() {
        let mut schemas = PayloadSchemas::empty();
        let err = schemas
            .register("batch", json!({ "type": "not-a-type" }))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Config { .. }));
    }

    // ── Services ──────────────────────────────────────────────────────────────

    #[test]
    fn test_critical_deviation_is_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        let records = QualityRecords::new(&ledger.service).unwrap();

        let major = records
            .open_deviation(
                qa_reviewer(),
                deviation("D-1"),
                deviation_opened("label misprint", "major"),
                terminal_session("s"),
            )
            .unwrap();
        assert!(major.content.flags.regulatory_event);
        assert!(!major.content.flags.gmp_critical);

        let critical = records
            .open_deviation(
                qa_reviewer(),
                deviation("D-2"),
                deviation_opened("sterility failure", "critical"),
                terminal_session("s"),
            )
            .unwrap();
        assert!(critical.content.flags.gmp_critical);
    }

    #[test]
    fn test_self_hand_over_rejected_by_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = ledger_in(dir.path());
        let records = QualityRecords::new(&ledger.service).unwrap();
        let err = records
            .hand_over_sample(
                sample("S-1"),
                courier(),
                courier(),
                "dock",
                None,
                terminal_session("s"),
            )
            .unwrap_err();
        assert!(matches!(err, LedgerError::AuditWriteFailed { .. }));
    }

    // ── Wiring ────────────────────────────────────────────────────────────────

    fn file_config(dir: &Path) -> LedgerConfig {
        let mut config = LedgerConfig::from_toml_str(scenarios::LEDGER_CONFIG).unwrap();
        config.store.kind = StoreKind::Jsonl;
        config.store.path = Some(dir.join("audit.jsonl"));
        config.backup.directory = Some(dir.join("backup"));
        config.emergency.path = dir.join("emergency.jsonl");
        config
    }

    fn ledger_in(dir: &Path) -> Ledger {
        Ledger::from_config(&file_config(dir), demo_key_material().unwrap()).unwrap()
    }

    #[test]
    fn test_file_backed_ledger_survives_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();

        let last = {
            let ledger = ledger_in(dir);
            let records = QualityRecords::new(&ledger.service).unwrap();
            records
                .update_batch(
                    production_operator(),
                    batch("R-1"),
                    "opened",
                    None,
                    batch_in_production("X"),
                    terminal_session("s"),
                )
                .unwrap();
            records
                .update_batch(
                    qualified_person(),
                    batch("R-1"),
                    "released",
                    Some(batch_yield_recorded("X", 97.0)),
                    batch_released("X", 97.0),
                    terminal_session("s"),
                )
                .unwrap()
        };

        let ledger = ledger_in(dir);
        assert_eq!(ledger.service.stream_head().sequence, 2);
        assert_eq!(ledger.service.stream_head().last_hash, last.current_log_hash);

        let records = QualityRecords::new(&ledger.service).unwrap();
        let next = records
            .review_batch(qa_reviewer(), batch("R-1"), "post-restart review", terminal_session("s"))
            .unwrap();
        assert_eq!(next.sequence_number, 3);
        assert_eq!(next.previous_log_hash, last.current_log_hash);
        assert!(ledger.service.verify_chain(None, None).unwrap().valid);

        // The release was backed up to disk by the first process.
        let backups = DirectoryBackupSink::new(dir.join("backup")).read_all().unwrap();
        assert_eq!(backups.len(), 1);
        let restored = EncryptedBackup::verify_backup_record(
            ledger.backup_key().unwrap(),
            &*ledger.engine,
            &backups[0],
        )
        .unwrap();
        assert_eq!(restored, last);

        // The ledger file itself can be reopened independently.
        let store = JsonlAuditStore::open(dir.join("audit.jsonl"), std::time::Duration::from_secs(1))
            .unwrap();
        assert_eq!(chronicle_core::traits::AuditLogStore::read_last_sequence(&store).unwrap(), 3);
    }

    #[test]
    fn test_backup_without_key_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path());
        let mut keys = demo_key_material().unwrap();
        keys.backup = None;
        let err = Ledger::from_config(&config, keys).err().unwrap();
        assert!(matches!(err, LedgerError::Config { .. }));
    }
}
