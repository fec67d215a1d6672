//! GMP reference scenarios.
//!
//! Each scenario wires real Chronicle components (chain engine, store,
//! pipeline, verifier, backup, emergency logger) around mock site data and
//! demonstrates one property of the ledger.  Stores, sinks, and emergency
//! channels are in memory so a run leaves nothing on disk.

pub mod batch_release;
pub mod custody_transfer;
pub mod store_outage;
pub mod tamper_detection;

use std::sync::Arc;

use chronicle_config::LedgerConfig;
use chronicle_contracts::{error::LedgerResult, verification::ChainVerificationResult};
use chronicle_core::traits::{AuditLogStore, EmergencyChannel};
use chronicle_recovery::BackupSink;

use crate::mock_data::demo_key_material;
use crate::wiring::{Ledger, LedgerParts};

/// Embedded reference configuration shared by every scenario.
pub const LEDGER_CONFIG: &str = include_str!("../../config/ledger.toml");

pub(crate) fn in_memory_ledger(
    store: Arc<dyn AuditLogStore>,
    emergency: Arc<dyn EmergencyChannel>,
    backup_sink: Arc<dyn BackupSink>,
) -> LedgerResult<Ledger> {
    let config = LedgerConfig::from_toml_str(LEDGER_CONFIG)?;
    Ledger::assemble(
        &config,
        demo_key_material()?,
        LedgerParts {
            store,
            emergency,
            backup_sink: Some(backup_sink),
        },
    )
}

pub(crate) fn print_chain_report(report: &ChainVerificationResult) {
    println!(
        "  Chain verification:     {} ({} entr{} examined, sequences {}..={})",
        if report.valid { "VERIFIED" } else { "FAILED" },
        report.entries_examined,
        if report.entries_examined == 1 { "y" } else { "ies" },
        report.from_sequence,
        report.to_sequence
    );
    for violation in &report.violations {
        println!(
            "    - {:<16} at #{}: {}",
            violation.violation_type.to_string(),
            violation.sequence,
            violation.detail
        );
    }
    if let Some(first) = report.first_invalid_sequence {
        println!("  First invalid sequence: #{first}");
    }
}
