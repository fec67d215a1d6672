//! Simulated GMP site data for the Chronicle reference services.
//!
//! All people, batches, and samples here are fictional.  Nothing is read from
//! or written to an external system.

use serde_json::{json, Value};

use chronicle_audit::SecretKey;
use chronicle_config::KeyMaterial;
use chronicle_contracts::{
    entry::{Actor, EntityRef, FieldDiff, RequestContext},
    error::LedgerResult,
};
use chronicle_recovery::BackupKey;

// ── Personnel ─────────────────────────────────────────────────────────────────

pub fn production_operator() -> Actor {
    Actor::new("u-op-114", "M. Okafor (Production)")
}

pub fn qa_reviewer() -> Actor {
    Actor::new("u-qa-027", "S. Lindqvist (QA)")
}

pub fn qualified_person() -> Actor {
    Actor::new("u-qp-003", "Dr. R. Havel (QP)")
}

pub fn warehouse_clerk() -> Actor {
    Actor::new("u-wh-088", "J. Moreau (Warehouse)")
}

pub fn qc_analyst() -> Actor {
    Actor::new("u-qc-051", "P. Anand (QC Lab)")
}

pub fn courier() -> Actor {
    Actor::new("u-ext-902", "Northbridge Cold Chain")
}

// ── Entities ──────────────────────────────────────────────────────────────────

pub fn batch(entity_id: &str) -> EntityRef {
    EntityRef::new("batch", entity_id, format!("LOT-2026-{entity_id}"))
}

pub fn sample(entity_id: &str) -> EntityRef {
    EntityRef::new("sample", entity_id, format!("SMP-{entity_id}"))
}

pub fn deviation(entity_id: &str) -> EntityRef {
    EntityRef::new("deviation", entity_id, format!("DEV-{entity_id}"))
}

/// Request context of a session on the manufacturing execution terminal.
pub fn terminal_session(session_id: &str) -> RequestContext {
    RequestContext {
        ip_address: Some("10.20.4.17".to_string()),
        user_agent: Some("mes-terminal/4.2".to_string()),
        session_id: Some(session_id.to_string()),
    }
}

// ── Batch record payloads ─────────────────────────────────────────────────────

fn diff(value: Value) -> FieldDiff {
    match value {
        Value::Object(map) => map.into_iter().collect(),
        _ => FieldDiff::new(),
    }
}

/// A batch record as first created on the line.
pub fn batch_in_production(product: &str) -> FieldDiff {
    diff(json!({
        "status": "in_production",
        "product": product,
        "yield_percent": null,
    }))
}

/// The same batch after yield has been recorded.
pub fn batch_yield_recorded(product: &str, yield_percent: f64) -> FieldDiff {
    diff(json!({
        "status": "awaiting_qa",
        "product": product,
        "yield_percent": yield_percent,
    }))
}

pub fn batch_released(product: &str, yield_percent: f64) -> FieldDiff {
    diff(json!({
        "status": "released",
        "product": product,
        "yield_percent": yield_percent,
        "certificate": "CoA-2026-0417",
    }))
}

/// A payload with a status the batch schema does not allow.
pub fn batch_with_unknown_status(product: &str) -> FieldDiff {
    diff(json!({
        "status": "shipped-early",
        "product": product,
    }))
}

pub fn deviation_opened(summary: &str, severity: &str) -> FieldDiff {
    diff(json!({
        "status": "open",
        "severity": severity,
        "summary": summary,
    }))
}

// ── Demo keys ─────────────────────────────────────────────────────────────────

/// Fixed, publicly known keys for the demo runs.  Real deployments load keys
/// with `KeyMaterial::from_env`.
pub fn demo_key_material() -> LedgerResult<KeyMaterial> {
    Ok(KeyMaterial {
        hmac: SecretKey::from_hex(&"5a".repeat(32))?,
        backup: Some(BackupKey::from_hex(&"c3".repeat(32))?),
    })
}
