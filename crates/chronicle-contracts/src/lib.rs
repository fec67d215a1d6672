//! # chronicle-contracts
//!
//! Shared types and error taxonomy for the Chronicle audit ledger.
//!
//! All crates in the workspace import from here. No ledger logic lives in
//! this crate, only data definitions and error types.

pub mod custody;
pub mod entry;
pub mod error;
pub mod verification;

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use custody::{CustodyDetails, CustodyRecord};
    use entry::{
        Actor, AuditAction, AuditLogEntry, EntityRef, EntryContent, EntryFlags, FieldDiff,
        RequestContext,
    };
    use error::{AppendStage, AuditWriteFailure, FailedAppend, LedgerError};
    use verification::ViolationType;

    fn make_entry(action: AuditAction, custody: Option<CustodyDetails>) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            sequence_number: 7,
            timestamp: Utc::now(),
            content: EntryContent {
                actor: Actor::new("u-qa-01", "Dana QA"),
                action,
                action_description: "moved lot to quarantine store".to_string(),
                entity_ref: EntityRef::new("batch", "b-1", "LOT-0001"),
                before: None,
                after: None,
                context: RequestContext::default(),
                flags: EntryFlags::default(),
                custody,
            },
            previous_log_hash: AuditLogEntry::GENESIS_HASH.to_string(),
            current_log_hash: "ab".repeat(32),
        }
    }

    fn transfer() -> CustodyDetails {
        CustodyDetails {
            from_actor: Actor::new("u-1", "Alice"),
            to_actor: Actor::new("u-2", "Bob"),
            location: "Warehouse B".to_string(),
            conditions: Some("2-8 °C".to_string()),
        }
    }

    // ── Entry serialization ──────────────────────────────────────────────────

    #[test]
    fn entry_serializes_flat_with_snake_case_action() {
        let entry = make_entry(AuditAction::Approve, None);
        let value = serde_json::to_value(&entry).unwrap();

        assert_eq!(value["action"], json!("approve"));
        assert_eq!(value["sequence_number"], json!(7));
        assert!(value.get("content").is_none(), "content must be flattened");
        assert_eq!(value["entity_ref"]["identifier"], json!("LOT-0001"));
    }

    #[test]
    fn hashable_view_excludes_hash_fields() {
        let entry = make_entry(AuditAction::Create, None);
        let value = serde_json::to_value(entry.hashable()).unwrap();

        assert!(value.get("current_log_hash").is_none());
        assert!(value.get("previous_log_hash").is_none());
        assert_eq!(value["action_description"], json!("moved lot to quarantine store"));
        assert_eq!(value["id"], json!(entry.id.to_string()));
    }

    #[test]
    fn field_diff_orders_keys_regardless_of_insertion() {
        let mut a = FieldDiff::new();
        a.insert("yield".to_string(), json!(98.2));
        a.insert("status".to_string(), json!("released"));

        let mut b = FieldDiff::new();
        b.insert("status".to_string(), json!("released"));
        b.insert("yield".to_string(), json!(98.2));

        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
    }

    #[test]
    fn flags_requiring_backup() {
        assert!(!EntryFlags::default().requires_backup());
        assert!(EntryFlags { gmp_critical: true, ..Default::default() }.requires_backup());
        assert!(EntryFlags { regulatory_event: true, ..Default::default() }.requires_backup());
        assert!(!EntryFlags { requires_review: true, ..Default::default() }.requires_backup());
    }

    #[test]
    fn entity_ref_matches_type_and_id() {
        let r = EntityRef::new("batch", "b-1", "LOT-0001");
        assert!(r.matches("batch", "b-1"));
        assert!(!r.matches("batch", "b-2"));
        assert!(!r.matches("sample", "b-1"));
        assert_eq!(r.to_string(), "batch/b-1");
    }

    // ── Custody ──────────────────────────────────────────────────────────────

    #[test]
    fn custody_record_from_transfer_entry() {
        let entry = make_entry(AuditAction::Transfer, Some(transfer()));
        let record = CustodyRecord::try_from(entry).unwrap();

        assert_eq!(record.from_actor().id, "u-1");
        assert_eq!(record.to_actor().id, "u-2");
        assert_eq!(record.sequence_number(), 7);
    }

    #[test]
    fn custody_record_rejects_non_transfer() {
        let entry = make_entry(AuditAction::Update, None);
        let err = CustodyRecord::try_from(entry).unwrap_err();
        assert!(err.to_string().contains("not 'transfer'"));
    }

    #[test]
    fn custody_record_rejects_transfer_without_details() {
        let entry = make_entry(AuditAction::Transfer, None);
        let err = CustodyRecord::try_from(entry).unwrap_err();
        assert!(err.to_string().contains("no custody details"));
    }

    // ── Errors ───────────────────────────────────────────────────────────────

    #[test]
    fn violation_type_display_matches_serde() {
        for vt in [
            ViolationType::HashMismatch,
            ViolationType::BrokenLink,
            ViolationType::MissingSequence,
        ] {
            let json = serde_json::to_string(&vt).unwrap();
            assert_eq!(json, format!("\"{vt}\""));
        }
    }

    #[test]
    fn audit_write_failure_display_names_attempt_and_cause() {
        let failure = AuditWriteFailure {
            attempt: FailedAppend {
                attempted_at: Utc::now(),
                actor: Actor::new("u-9", "Operator"),
                action: AuditAction::Sign,
                entity_ref: EntityRef::new("batch", "b-9", "LOT-9"),
                sequence: Some(12),
                stage: AppendStage::Hashed,
                flags: EntryFlags::default(),
            },
            source: LedgerError::StoreUnavailable {
                reason: "timed out after 2000ms".to_string(),
            },
        };
        let msg = failure.to_string();
        assert!(msg.contains("'sign'"));
        assert!(msg.contains("batch/b-9"));
        assert!(msg.contains("u-9"));
        assert!(msg.contains("timed out"));

        let folded: LedgerError = failure.into();
        assert!(matches!(folded, LedgerError::AuditWriteFailed { .. }));
    }

    #[test]
    fn error_chain_linkage_display() {
        let err = LedgerError::ChainLinkage {
            sequence: 4,
            reason: "expected sequence 5".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("chain linkage failure at sequence 4"));
        assert!(msg.contains("expected sequence 5"));
    }
}
