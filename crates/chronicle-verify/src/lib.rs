//! # chronicle-verify
//!
//! Read-side integrity checks for the Chronicle audit ledger.
//!
//! This crate provides [`engine::ChainVerifier`], which implements the
//! [`chronicle_core::traits::IntegrityVerifier`] trait:
//!
//! 1. **Chain replay** — `hash_mismatch`, `broken_link` and
//!    `missing_sequence` findings over any sequence range, paged.
//! 2. **Custody continuity** — `custody_gap` findings over an entity's
//!    transfers.
//!
//! Findings are reported, never corrected.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use chronicle_verify::engine::ChainVerifier;
//!
//! let verifier = ChainVerifier::with_page_size(engine.clone(), 500);
//! let report = verifier.verify_range(&*store, 1, None)?;
//! assert!(report.valid);
//! ```

pub mod custody;
pub mod engine;

pub use custody::verify_custody_continuity;
pub use engine::{ChainVerifier, DEFAULT_VERIFY_PAGE_SIZE};

// ── Tests ─────────────────────────────────────────────────────────────────────
