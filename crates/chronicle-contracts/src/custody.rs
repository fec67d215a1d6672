//! Chain-of-custody types.
//!
//! Custody is not a separate store: a `CustodyRecord` is a `transfer` entry
//! of the main chain viewed through its `CustodyDetails`.

use std::convert::TryFrom;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entry::{Actor, AuditAction, AuditLogEntry, EntityRef},
    error::LedgerError,
};

/// Who handed the item to whom, where, and under which conditions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyDetails {
    pub from_actor: Actor,
    pub to_actor: Actor,
    /// Physical or logical location of the hand-over.
    pub location: String,
    /// Storage / transport conditions, e.g. "2-8 °C, sealed".
    pub conditions: Option<String>,
}

/// A `transfer` entry together with its custody details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub entry: AuditLogEntry,
    pub transfer: CustodyDetails,
}

impl CustodyRecord {
    pub fn sequence_number(&self) -> u64 {
        self.entry.sequence_number
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.entry.timestamp
    }

    pub fn from_actor(&self) -> &Actor {
        &self.transfer.from_actor
    }

    pub fn to_actor(&self) -> &Actor {
        &self.transfer.to_actor
    }
}

impl TryFrom<AuditLogEntry> for CustodyRecord {
    type Error = LedgerError;

    fn try_from(entry: AuditLogEntry) -> Result<Self, Self::Error> {
        if entry.content.action != AuditAction::Transfer {
            return Err(LedgerError::Validation {
                reason: format!(
                    "entry {} has action '{}', not 'transfer'",
                    entry.sequence_number, entry.content.action
                ),
            });
        }
        let transfer = entry
            .content
            .custody
            .clone()
            .ok_or_else(|| LedgerError::Validation {
                reason: format!(
                    "transfer entry {} carries no custody details",
                    entry.sequence_number
                ),
            })?;
        Ok(Self { entry, transfer })
    }
}

/// A break in custody continuity between two adjacent transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyGap {
    /// Sequence of the transfer whose `from_actor` does not match.
    pub sequence_number: u64,
    pub entry_id: Uuid,
    /// `to_actor` of the preceding transfer.
    pub expected_from: Actor,
    /// `from_actor` actually recorded.
    pub actual_from: Actor,
    pub detail: String,
}

/// A `transfer` entry that carries no custody details, so it cannot take
/// part in the continuity check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MalformedTransfer {
    pub sequence_number: u64,
    pub entry_id: Uuid,
    pub detail: String,
}

/// Outcome of `verify_custody_chain` for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyChainVerificationResult {
    pub entity_ref: EntityRef,
    /// True only when `gaps` and `malformed` are both empty.
    pub valid: bool,
    /// Well-formed transfers compared for continuity.
    pub transfers_examined: usize,
    pub gaps: Vec<CustodyGap>,
    #[serde(default)]
    pub malformed: Vec<MalformedTransfer>,
}
