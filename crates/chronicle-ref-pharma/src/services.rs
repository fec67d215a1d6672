//! GMP business operations that record their own audit entries.
//!
//! Each operation validates its payloads, then calls the ledger explicitly.
//! If the audit write fails the operation fails with it: a regulated action
//! without an audit record is not allowed to complete.

use chronicle_contracts::{
    entry::{Actor, AuditAction, AuditLogEntry, EntityRef, EntryFlags, FieldDiff, RequestContext},
    error::{LedgerError, LedgerResult},
};
use chronicle_core::AuditService;

use crate::schemas::PayloadSchemas;

/// Batch record, deviation, and sample custody operations.
pub struct QualityRecords<'a> {
    ledger: &'a AuditService,
    schemas: PayloadSchemas,
}

impl<'a> QualityRecords<'a> {
    pub fn new(ledger: &'a AuditService) -> LedgerResult<Self> {
        Ok(Self {
            ledger,
            schemas: PayloadSchemas::gmp()?,
        })
    }

    /// Record a change to a batch record.
    ///
    /// A move to `released` or `rejected` is a disposition decision and is
    /// flagged GMP-critical and regulatory; other changes are routine.
    pub fn update_batch(
        &self,
        actor: Actor,
        batch: EntityRef,
        description: &str,
        before: Option<FieldDiff>,
        after: FieldDiff,
        context: RequestContext,
    ) -> LedgerResult<AuditLogEntry> {
        self.schemas
            .validate_change(&batch.entity_type, before.as_ref(), Some(&after))?;

        let disposition = matches!(
            after.get("status").and_then(|s| s.as_str()),
            Some("released" | "rejected")
        );
        let (action, flags) = if disposition {
            (
                AuditAction::Approve,
                EntryFlags {
                    regulatory_event: true,
                    gmp_critical: true,
                    requires_review: true,
                },
            )
        } else if before.is_none() {
            (AuditAction::Create, EntryFlags::default())
        } else {
            (AuditAction::Update, EntryFlags::default())
        };

        self.ledger
            .append(actor, action, description, batch, before, Some(after), context, flags)
            .map_err(LedgerError::from)
    }

    /// Record a QA review of a batch without changing it.
    pub fn review_batch(
        &self,
        reviewer: Actor,
        batch: EntityRef,
        finding: &str,
        context: RequestContext,
    ) -> LedgerResult<AuditLogEntry> {
        self.ledger
            .append(
                reviewer,
                AuditAction::Review,
                finding,
                batch,
                None,
                None,
                context,
                EntryFlags {
                    requires_review: true,
                    ..EntryFlags::default()
                },
            )
            .map_err(LedgerError::from)
    }

    /// Open a deviation.  Critical deviations are GMP-critical entries.
    pub fn open_deviation(
        &self,
        actor: Actor,
        deviation: EntityRef,
        payload: FieldDiff,
        context: RequestContext,
    ) -> LedgerResult<AuditLogEntry> {
        self.schemas.validate(&deviation.entity_type, &payload)?;

        let critical = payload.get("severity").and_then(|s| s.as_str()) == Some("critical");
        let description = format!("deviation {} opened", deviation.identifier);
        self.ledger
            .append(
                actor,
                AuditAction::Create,
                description,
                deviation,
                None,
                Some(payload),
                context,
                EntryFlags {
                    regulatory_event: true,
                    gmp_critical: critical,
                    requires_review: true,
                },
            )
            .map_err(LedgerError::from)
    }

    /// Hand a physical sample to the next custodian.
    pub fn hand_over_sample(
        &self,
        sample: EntityRef,
        from: Actor,
        to: Actor,
        location: &str,
        conditions: Option<&str>,
        context: RequestContext,
    ) -> LedgerResult<AuditLogEntry> {
        self.ledger
            .record_custody_transfer(
                sample,
                from,
                to,
                location,
                conditions.map(str::to_string),
                context,
            )
            .map_err(LedgerError::from)
    }
}
