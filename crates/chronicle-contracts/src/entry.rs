//! Audit log entry types.
//!
//! An `AuditLogEntry` is one immutable record of a regulated event.  The
//! business-facing fields live in `EntryContent`; the ledger adds identity
//! (`id`, `sequence_number`, `timestamp`) and the two chain fields.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::custody::CustodyDetails;

/// A field-level diff: field name → value.
///
/// `BTreeMap` keeps keys ordered so the same diff always serializes the same
/// way, no matter in which order the caller inserted fields.
pub type FieldDiff = BTreeMap<String, Value>;

/// The person or system that performed an audited action.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    /// Stable identifier (user id, service account id).
    pub id: String,
    /// Name shown on printed audit trails.
    pub display_name: String,
}

impl Actor {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

/// The closed set of auditable actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    Login,
    Logout,
    Sign,
    Approve,
    Reject,
    Transfer,
    Review,
    Export,
    Archive,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::Sign => "sign",
            AuditAction::Approve => "approve",
            AuditAction::Reject => "reject",
            AuditAction::Transfer => "transfer",
            AuditAction::Review => "review",
            AuditAction::Export => "export",
            AuditAction::Archive => "archive",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to the business entity an entry is about.
///
/// Example: `EntityRef::new("batch", "b-7f3a", "LOT-2026-0042")`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity kind, e.g. `"batch"`, `"deviation"`, `"sample"`.
    pub entity_type: String,
    /// Primary key of the entity in its owning service.
    pub entity_id: String,
    /// Human-readable identifier (lot number, deviation number, ...).
    pub identifier: String,
}

impl EntityRef {
    pub fn new(
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
            identifier: identifier.into(),
        }
    }

    /// True when this reference points at `entity_type` / `entity_id`.
    pub fn matches(&self, entity_type: &str, entity_id: &str) -> bool {
        self.entity_type == entity_type && self.entity_id == entity_id
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// Where the request that triggered the entry came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
}

/// Regulatory classification of an entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFlags {
    pub regulatory_event: bool,
    pub gmp_critical: bool,
    pub requires_review: bool,
}

impl EntryFlags {
    /// Entries with either high-sensitivity flag get an encrypted backup copy.
    pub fn requires_backup(&self) -> bool {
        self.gmp_critical || self.regulatory_event
    }
}

/// Everything a caller supplies for one append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryContent {
    pub actor: Actor,
    pub action: AuditAction,
    pub action_description: String,
    pub entity_ref: EntityRef,
    pub before: Option<FieldDiff>,
    pub after: Option<FieldDiff>,
    pub context: RequestContext,
    pub flags: EntryFlags,
    /// Present only on `AuditAction::Transfer` entries.
    pub custody: Option<CustodyDetails>,
}

/// One immutable, hash-linked record in the audit chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,

    /// Position in the stream, starting at 1 with no gaps.
    pub sequence_number: u64,

    /// When the audited action happened (UTC).
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub content: EntryContent,

    /// `current_log_hash` of the previous entry, or `GENESIS_HASH` for entry 1.
    pub previous_log_hash: String,

    /// Keyed hash of this entry's content linked to `previous_log_hash`.
    pub current_log_hash: String,
}

impl AuditLogEntry {
    /// The published `previous_log_hash` of the first entry of every stream.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";

    /// The first sequence number issued on an empty stream.
    pub const FIRST_SEQUENCE: u64 = 1;

    /// Borrow the fields that are covered by `current_log_hash`.
    pub fn hashable(&self) -> HashableEntry<'_> {
        HashableEntry {
            id: &self.id,
            sequence_number: self.sequence_number,
            timestamp: &self.timestamp,
            content: &self.content,
        }
    }
}

/// The semantic view of an entry: every field except the two hashes.
///
/// This is the only shape ever fed to the chain hasher, on both the write
/// path and during verification.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HashableEntry<'a> {
    pub id: &'a Uuid,
    pub sequence_number: u64,
    pub timestamp: &'a DateTime<Utc>,
    #[serde(flatten)]
    pub content: &'a EntryContent,
}
