//! Chain verification report types.
//!
//! A `ChainVerificationResult` is produced by replaying a range of the chain.
//! It is never written back into the chain itself.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The kinds of cryptographic / ordering defects a replay can find.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    /// Recomputed hash differs from the stored `current_log_hash`.
    HashMismatch,
    /// Stored `previous_log_hash` differs from the prior entry's stored hash.
    BrokenLink,
    /// The sequence number is not the prior sequence plus one.
    MissingSequence,
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ViolationType::HashMismatch => "hash_mismatch",
            ViolationType::BrokenLink => "broken_link",
            ViolationType::MissingSequence => "missing_sequence",
        };
        f.write_str(s)
    }
}

/// A single finding within a `ChainVerificationResult`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainViolation {
    pub sequence: u64,
    /// `None` when the entry at `sequence` does not exist in the store.
    pub entry_id: Option<Uuid>,
    pub violation_type: ViolationType,
    pub detail: String,
}

/// The full report of one verification pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainVerificationResult {
    /// True only if `violations` is empty.
    pub valid: bool,
    /// First sequence examined (inclusive).
    pub from_sequence: u64,
    /// Last sequence examined (inclusive); clamped to the observed head.
    pub to_sequence: u64,
    pub entries_examined: u64,
    /// Every violation in the range, in ascending sequence order.
    pub violations: Vec<ChainViolation>,
    /// The chain cannot be trusted from this sequence onward.
    pub first_invalid_sequence: Option<u64>,
    pub verified_at: DateTime<Utc>,
}

impl ChainVerificationResult {
    /// Number of violations of the given type.
    pub fn count(&self, violation_type: ViolationType) -> usize {
        self.violations
            .iter()
            .filter(|v| v.violation_type == violation_type)
            .count()
    }
}
