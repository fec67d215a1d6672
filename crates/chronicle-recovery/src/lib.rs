//! # chronicle-recovery
//!
//! Side paths of the Chronicle append pipeline:
//!
//! - [`backup::EncryptedBackup`] — asynchronous AES-256-GCM copies of
//!   regulatory and GMP-critical entries, written to a [`backup::BackupSink`]
//!   that does not depend on the primary store.
//! - [`emergency::FileEmergencyLogger`] — the last-resort record of appends
//!   that never reached the store.
//!
//! Neither path can change the outcome of an append.

pub mod backup;
pub mod emergency;
pub mod key;

pub use backup::{
    BackupRecord, BackupSettings, BackupSink, BackupStats, DirectoryBackupSink, EncryptedBackup,
    InMemoryBackupSink, DEFAULT_QUEUE_CAPACITY,
};
pub use emergency::{EmergencyRecord, FileEmergencyLogger, InMemoryEmergencyLogger};
pub use key::{BackupKey, BACKUP_KEY_LEN};

// ── Tests ─────────────────────────────────────────────────────────────────────
