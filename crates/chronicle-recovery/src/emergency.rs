//! Emergency fallback channel for failed appends.
//!
//! Used when the primary store cannot take an entry.  Recording never fails
//! and never panics: every call emits an `error!` line, and problems with the
//! fallback file are themselves only logged.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::error;

use chronicle_contracts::error::{FailedAppend, LedgerError, LedgerResult};
use chronicle_core::traits::EmergencyChannel;

/// One line of the emergency log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyRecord {
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub attempt: FailedAppend,
    pub error: String,
}

impl EmergencyRecord {
    fn new(attempt: &FailedAppend, error: &LedgerError) -> Self {
        Self {
            recorded_at: Utc::now(),
            attempt: attempt.clone(),
            error: error.to_string(),
        }
    }
}

fn alert(record: &EmergencyRecord) {
    error!(
        action = %record.attempt.action,
        entity = %record.attempt.entity_ref,
        actor = %record.attempt.actor.id,
        sequence = ?record.attempt.sequence,
        stage = ?record.attempt.stage,
        regulatory = record.attempt.flags.regulatory_event,
        gmp_critical = record.attempt.flags.gmp_critical,
        error = %record.error,
        "EMERGENCY: regulated action has no audit record"
    );
}

// ── File ──────────────────────────────────────────────────────────────────────

/// Appends emergency records to a local JSON Lines file.
///
/// The file is opened lazily, so a logger can be constructed even when its
/// directory is not writable yet.
pub struct FileEmergencyLogger {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

impl FileEmergencyLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_line(&self, record: &EmergencyRecord) -> std::io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let mut slot = self.file.lock();
        if slot.is_none() {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            *slot = Some(OpenOptions::new().create(true).append(true).open(&self.path)?);
        }

        let written = match slot.as_mut() {
            Some(file) => file.write_all(&line).and_then(|()| file.sync_data()),
            None => Ok(()),
        };
        if written.is_err() {
            // Reopen on the next record.
            *slot = None;
        }
        written
    }

    /// Read back every record in an emergency log file.
    pub fn read_records(path: impl AsRef<Path>) -> LedgerResult<Vec<EmergencyRecord>> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LedgerError::StoreUnavailable {
                    reason: format!("open {}: {e}", path.display()),
                })
            }
        };

        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| LedgerError::StoreUnavailable {
                reason: format!("read {}: {e}", path.display()),
            })?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line).map_err(|e| {
                LedgerError::Serialization {
                    reason: format!("{} line {}: {e}", path.display(), idx + 1),
                }
            })?);
        }
        Ok(records)
    }
}

impl EmergencyChannel for FileEmergencyLogger {
    fn record(&self, attempt: &FailedAppend, error: &LedgerError) {
        let record = EmergencyRecord::new(attempt, error);
        alert(&record);
        if let Err(e) = self.write_line(&record) {
            error!(
                path = %self.path.display(),
                error = %e,
                "emergency log could not be written"
            );
        }
    }
}

// ── Memory ────────────────────────────────────────────────────────────────────

/// Keeps emergency records in memory.
#[derive(Default)]
pub struct InMemoryEmergencyLogger {
    records: Mutex<Vec<EmergencyRecord>>,
}

impl InMemoryEmergencyLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<EmergencyRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl EmergencyChannel for InMemoryEmergencyLogger {
    fn record(&self, attempt: &FailedAppend, error: &LedgerError) {
        let record = EmergencyRecord::new(attempt, error);
        alert(&record);
        self.records.lock().push(record);
    }
}
