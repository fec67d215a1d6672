//! # chronicle-core
//!
//! The write path and service facade of the Chronicle audit ledger.
//!
//! This crate provides:
//! - The trait seams (`ChainHasher`, `AuditLogStore`, `EmergencyChannel`,
//!   `BackupQueue`, `IntegrityVerifier`)
//! - `SequenceAllocator` and `LinkState`, the per-stream chain pointer
//! - `AppendPipeline`, which serializes allocate → hash → persist
//! - `AuditService`, the facade business services call
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chronicle_core::{AppendPipeline, AuditService};
//!
//! let pipeline = AppendPipeline::open(store.clone(), hasher, emergency, Some(backup))?;
//! let service = AuditService::new(pipeline, store, Box::new(verifier), 500);
//! let entry = service.append(actor, AuditAction::Approve, "batch released", batch, None, None, ctx, flags)?;
//! ```

pub mod pipeline;
pub mod sequence;
pub mod service;
pub mod traits;
pub mod validate;

pub use pipeline::AppendPipeline;
pub use sequence::{LinkState, SequenceAllocator, StreamHead};
pub use service::{AuditService, TrailPage, TrailQuery, DEFAULT_PAGE_SIZE};
