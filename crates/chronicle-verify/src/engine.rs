//! Chain replay verifier.
//!
//! `ChainVerifier` implements `IntegrityVerifier` from `chronicle-core`.
//! A pass reads the requested range page by page in ascending order and
//! checks every entry three ways:
//!
//! 1. **Hash** — recompute the keyed hash from the stored content and the
//!    stored `previous_log_hash`; compare to `current_log_hash`.
//! 2. **Link** — the stored `previous_log_hash` must equal the prior entry's
//!    stored `current_log_hash` (or the genesis constant for entry 1).
//! 3. **Sequence** — each sequence number must be the prior one plus one.
//!
//! All findings are collected; the pass never stops early and never
//! modifies what it reads.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use chronicle_contracts::{
    custody::{CustodyChainVerificationResult, CustodyRecord},
    entry::{AuditLogEntry, EntityRef},
    error::LedgerResult,
    verification::{ChainVerificationResult, ChainViolation, ViolationType},
};
use chronicle_core::traits::{AuditLogStore, ChainHasher, IntegrityVerifier};

use crate::custody::verify_custody_continuity;

/// Default number of entries held in memory per page.
pub const DEFAULT_VERIFY_PAGE_SIZE: u64 = 500;

/// Replays stored entries against the chain rules.
pub struct ChainVerifier {
    hasher: Arc<dyn ChainHasher>,
    page_size: u64,
}

impl ChainVerifier {
    /// `hasher` must be the engine (and key) the write path uses.
    pub fn new(hasher: Arc<dyn ChainHasher>) -> Self {
        Self::with_page_size(hasher, DEFAULT_VERIFY_PAGE_SIZE)
    }

    pub fn with_page_size(hasher: Arc<dyn ChainHasher>, page_size: u64) -> Self {
        Self {
            hasher,
            page_size: page_size.max(1),
        }
    }
}

/// Running state of one replay.
struct Replay {
    expected_sequence: u64,
    /// Stored hash of the prior entry; `None` when it is outside the store.
    previous_hash: Option<String>,
    examined: u64,
    violations: Vec<ChainViolation>,
}

impl Replay {
    fn flag(&mut self, entry: &AuditLogEntry, violation_type: ViolationType, detail: String) {
        warn!(
            sequence = entry.sequence_number,
            entry_id = %entry.id,
            violation = %violation_type,
            %detail,
            "chain violation"
        );
        self.violations.push(ChainViolation {
            sequence: entry.sequence_number,
            entry_id: Some(entry.id),
            violation_type,
            detail,
        });
    }

    fn check(&mut self, hasher: &dyn ChainHasher, entry: &AuditLogEntry) {
        // ── Sequence ─────────────────────────────────────────────────────────
        if entry.sequence_number != self.expected_sequence {
            let detail = if entry.sequence_number > self.expected_sequence {
                format!(
                    "expected sequence {}, found {}; sequences {}..={} are absent",
                    self.expected_sequence,
                    entry.sequence_number,
                    self.expected_sequence,
                    entry.sequence_number - 1
                )
            } else {
                format!(
                    "expected sequence {}, found {} (duplicate or out of order)",
                    self.expected_sequence, entry.sequence_number
                )
            };
            self.flag(entry, ViolationType::MissingSequence, detail);
        }

        // ── Hash ─────────────────────────────────────────────────────────────
        match hasher.compute(&entry.hashable(), &entry.previous_log_hash) {
            Ok(recomputed) if recomputed == entry.current_log_hash => {}
            Ok(recomputed) => self.flag(
                entry,
                ViolationType::HashMismatch,
                format!(
                    "stored hash {} does not match recomputed {}",
                    entry.current_log_hash, recomputed
                ),
            ),
            Err(e) => self.flag(
                entry,
                ViolationType::HashMismatch,
                format!("hash could not be recomputed: {e}"),
            ),
        }

        // ── Link ─────────────────────────────────────────────────────────────
        if let Some(previous_hash) = &self.previous_hash {
            if &entry.previous_log_hash != previous_hash {
                let detail = format!(
                    "previous_log_hash {} does not match prior stored hash {}",
                    entry.previous_log_hash, previous_hash
                );
                self.flag(entry, ViolationType::BrokenLink, detail);
            }
        }

        self.previous_hash = Some(entry.current_log_hash.clone());
        self.expected_sequence = entry.sequence_number.saturating_add(1);
        self.examined += 1;
    }
}

impl IntegrityVerifier for ChainVerifier {
    fn verify_range(
        &self,
        store: &dyn AuditLogStore,
        from_seq: u64,
        to_seq: Option<u64>,
    ) -> LedgerResult<ChainVerificationResult> {
        // Bound the pass to the head observed now; appends that land while
        // we replay belong to the next pass.
        let head = store.read_last_sequence()?;
        let from = from_seq.max(AuditLogEntry::FIRST_SEQUENCE);
        let to = to_seq.map_or(head, |t| t.min(head));

        let previous_hash = if from == AuditLogEntry::FIRST_SEQUENCE {
            Some(AuditLogEntry::GENESIS_HASH.to_string())
        } else {
            store
                .read_range(from - 1, from - 1)?
                .into_iter()
                .next()
                .map(|e| e.current_log_hash)
        };

        let mut replay = Replay {
            expected_sequence: from,
            previous_hash,
            examined: 0,
            violations: Vec::new(),
        };

        let mut page_from = from;
        while page_from <= to {
            let page_to = page_from.saturating_add(self.page_size - 1).min(to);
            let page = store.read_range(page_from, page_to)?;
            debug!(from = page_from, to = page_to, entries = page.len(), "verifying page");
            for entry in &page {
                replay.check(&*self.hasher, entry);
            }
            page_from = page_to + 1;
        }

        // Entries missing at the tail of the range.
        if from <= to && replay.expected_sequence <= to {
            let detail = format!(
                "sequences {}..={} are absent below the observed head {}",
                replay.expected_sequence, to, head
            );
            warn!(sequence = replay.expected_sequence, %detail, "chain violation");
            replay.violations.push(ChainViolation {
                sequence: replay.expected_sequence,
                entry_id: None,
                violation_type: ViolationType::MissingSequence,
                detail,
            });
        }

        let first_invalid_sequence = replay.violations.iter().map(|v| v.sequence).min();
        let valid = replay.violations.is_empty();

        debug!(
            from,
            to,
            examined = replay.examined,
            violations = replay.violations.len(),
            valid,
            "verification complete"
        );

        Ok(ChainVerificationResult {
            valid,
            from_sequence: from,
            to_sequence: to,
            entries_examined: replay.examined,
            violations: replay.violations,
            first_invalid_sequence,
            verified_at: Utc::now(),
        })
    }

    fn verify_custody(
        &self,
        entity_ref: &EntityRef,
        records: &[CustodyRecord],
    ) -> CustodyChainVerificationResult {
        verify_custody_continuity(entity_ref, records)
    }
}
