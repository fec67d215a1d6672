//! Custody continuity: each hand-over must start with the previous receiver.
//!
//! This is a domain property, independent of the hash chain.  A custody gap
//! means an item changed hands without a recorded transfer, even if every
//! entry involved is cryptographically intact.

use tracing::warn;

use chronicle_contracts::{
    custody::{CustodyChainVerificationResult, CustodyGap, CustodyRecord},
    entry::EntityRef,
};

/// Check adjacent pairs of time-ordered transfers.
pub fn verify_custody_continuity(
    entity_ref: &EntityRef,
    records: &[CustodyRecord],
) -> CustodyChainVerificationResult {
    let mut gaps = Vec::new();

    for pair in records.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.to_actor().id == next.from_actor().id {
            continue;
        }

        let detail = format!(
            "transfer at sequence {} releases from '{}' but custody was last handed to '{}' at sequence {}",
            next.sequence_number(),
            next.from_actor().id,
            prev.to_actor().id,
            prev.sequence_number()
        );
        warn!(entity = %entity_ref, %detail, "custody gap");
        gaps.push(CustodyGap {
            sequence_number: next.sequence_number(),
            entry_id: next.entry.id,
            expected_from: prev.to_actor().clone(),
            actual_from: next.from_actor().clone(),
            detail,
        });
    }

    CustodyChainVerificationResult {
        entity_ref: entity_ref.clone(),
        valid: gaps.is_empty(),
        transfers_examined: records.len(),
        gaps,
        malformed: Vec::new(),
    }
}
