//! Structural checks on entry content before it enters the critical section.
//!
//! Payload *shape* (which fields a batch diff may carry, their types) is the
//! business service's concern.  Here we only reject content the ledger could
//! not meaningfully record.

use chronicle_contracts::{
    entry::{AuditAction, EntryContent},
    error::{LedgerError, LedgerResult},
};

/// Reject content that must never be appended.
pub fn validate_content(content: &EntryContent) -> LedgerResult<()> {
    if content.actor.id.trim().is_empty() {
        return invalid("actor id must not be empty");
    }
    if content.entity_ref.entity_type.trim().is_empty()
        || content.entity_ref.entity_id.trim().is_empty()
    {
        return invalid("entity reference must name a type and an id");
    }
    if content.action_description.trim().is_empty() {
        return invalid("action description must not be empty");
    }

    match (&content.action, &content.custody) {
        (AuditAction::Transfer, None) => {
            invalid("transfer entries must carry custody details")
        }
        (AuditAction::Transfer, Some(custody)) => {
            if custody.from_actor.id == custody.to_actor.id {
                return invalid(format!(
                    "custody cannot be transferred from '{}' to itself",
                    custody.from_actor.id
                ));
            }
            if custody.location.trim().is_empty() {
                return invalid("custody transfer location must not be empty");
            }
            Ok(())
        }
        (action, Some(_)) => invalid(format!(
            "custody details are only allowed on transfer entries, not '{action}'"
        )),
        (_, None) => Ok(()),
    }
}

fn invalid(reason: impl Into<String>) -> LedgerResult<()> {
    Err(LedgerError::Validation {
        reason: reason.into(),
    })
}
