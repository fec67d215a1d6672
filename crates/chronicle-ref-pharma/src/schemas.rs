//! Payload-shape validation at the service boundary.
//!
//! The ledger only checks an entry's structure.  What a `before`/`after`
//! payload may contain is a business rule, so each reference service checks
//! its payloads against a per-entity JSON Schema before calling `append`.
//! A rejected payload never reaches the pipeline.

use std::collections::HashMap;

use serde_json::{json, Value};
use tracing::{debug, warn};

use chronicle_contracts::{
    entry::FieldDiff,
    error::{LedgerError, LedgerResult},
};

/// Compiled JSON Schemas keyed by entity type.
pub struct PayloadSchemas {
    validators: HashMap<String, jsonschema::Validator>,
}

impl PayloadSchemas {
    pub fn empty() -> Self {
        Self {
            validators: HashMap::new(),
        }
    }

    /// The schemas used by the GMP reference services.
    pub fn gmp() -> LedgerResult<Self> {
        let mut schemas = Self::empty();
        schemas.register("batch", batch_schema())?;
        schemas.register("deviation", deviation_schema())?;
        Ok(schemas)
    }

    /// Compile `schema` for `entity_type`.
    ///
    /// A malformed schema document is a configuration error.
    pub fn register(&mut self, entity_type: &str, schema: Value) -> LedgerResult<()> {
        let validator = jsonschema::validator_for(&schema).map_err(|e| LedgerError::Config {
            reason: format!("schema for '{entity_type}' does not compile: {e}"),
        })?;
        self.validators.insert(entity_type.to_string(), validator);
        Ok(())
    }

    /// Check one payload.  Entity types without a schema accept anything.
    pub fn validate(&self, entity_type: &str, payload: &FieldDiff) -> LedgerResult<()> {
        let Some(validator) = self.validators.get(entity_type) else {
            debug!(entity_type, "no payload schema registered");
            return Ok(());
        };

        let instance = Value::Object(
            payload
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        );
        let violations: Vec<String> = validator
            .iter_errors(&instance)
            .map(|e| format!("{} {}", e.instance_path, e))
            .collect();

        if violations.is_empty() {
            return Ok(());
        }
        warn!(entity_type, violations = ?violations, "payload rejected by schema");
        Err(LedgerError::Validation {
            reason: format!("{entity_type} payload: {}", violations.join("; ")),
        })
    }

    /// Check both sides of a change.
    pub fn validate_change(
        &self,
        entity_type: &str,
        before: Option<&FieldDiff>,
        after: Option<&FieldDiff>,
    ) -> LedgerResult<()> {
        for payload in before.into_iter().chain(after) {
            self.validate(entity_type, payload)?;
        }
        Ok(())
    }
}

// ── Schemas ───────────────────────────────────────────────────────────────────

fn batch_schema() -> Value {
    json!({
        "type": "object",
        "required": ["status", "product"],
        "properties": {
            "status": {
                "enum": ["in_production", "awaiting_qa", "released", "rejected", "quarantined"]
            },
            "product": { "type": "string", "minLength": 1 },
            "yield_percent": {
                "type": ["number", "null"],
                "minimum": 0,
                "maximum": 110
            },
            "certificate": { "type": "string" }
        }
    })
}

fn deviation_schema() -> Value {
    json!({
        "type": "object",
        "required": ["status", "severity", "summary"],
        "properties": {
            "status": { "enum": ["open", "investigating", "closed"] },
            "severity": { "enum": ["minor", "major", "critical"] },
            "summary": { "type": "string", "minLength": 1 }
        }
    })
}
