//! File-backed `AuditLogStore`: one JSON entry per line, append-only.
//!
//! On `open` the whole file is read to rebuild the chain pointer, so a
//! restarted process resumes from the true last sequence on disk.  Appends
//! write the line and `fsync` before the entry becomes visible to readers;
//! a failed write is truncated away, and a tail torn by a crash is dropped
//! on the next `open`.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use chronicle_contracts::{
    entry::AuditLogEntry,
    error::{LedgerError, LedgerResult},
};
use chronicle_core::traits::AuditLogStore;

use crate::memory::{check_successor, sequence_range};

struct JsonlState {
    file: File,
    /// Length of the file after the last complete line.
    len: u64,
    entries: Vec<AuditLogEntry>,
}

/// An append-only JSON Lines audit store.
pub struct JsonlAuditStore {
    path: PathBuf,
    state: Mutex<JsonlState>,
    timeout: Duration,
}

impl JsonlAuditStore {
    /// Open (or create) the ledger file at `path` and load its entries.
    ///
    /// Returns `LedgerError::Serialization` naming the line when a complete
    /// line is not a valid entry.  An unterminated final line that does not
    /// parse is a torn write and is truncated away; one that parses keeps
    /// its entry and gets its newline.  A tampered but well-formed line
    /// loads normally; detecting it is the verifier's job.
    pub fn open(path: impl AsRef<Path>, timeout: Duration) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| unavailable(&path, "create directory", e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| unavailable(&path, "open", e))?;

        let mut bytes = Vec::new();
        (&file)
            .read_to_end(&mut bytes)
            .map_err(|e| unavailable(&path, "read", e))?;

        let mut entries = Vec::new();
        let mut complete = 0usize;
        for (idx, segment) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
            let terminated = segment.last() == Some(&b'\n');
            let parsed = parse_line(segment);
            match (parsed, terminated) {
                (Ok(None), true) => {}
                (Ok(Some(entry)), _) => entries.push(entry),
                (Err(e), true) => {
                    return Err(LedgerError::Serialization {
                        reason: format!("{} line {}: {e}", path.display(), idx + 1),
                    })
                }
                // Unterminated tail that is blank or unparseable: a write
                // that never completed, so it was never acknowledged.
                (Ok(None), false) | (Err(_), false) => {
                    warn!(
                        path = %path.display(),
                        line = idx + 1,
                        bytes = segment.len(),
                        "discarding torn ledger tail"
                    );
                    file.set_len(complete as u64)
                        .map_err(|e| unavailable(&path, "truncate torn tail", e))?;
                    break;
                }
            }
            complete += segment.len();
        }

        // Line order is not part of the chain; reads slice by sequence.
        entries.sort_by_key(|e| e.sequence_number);

        // A complete entry without its newline would fuse with the next line.
        if complete > 0 && bytes.get(complete - 1) != Some(&b'\n') {
            warn!(path = %path.display(), "terminating final ledger line");
            (&file)
                .write_all(b"\n")
                .and_then(|()| file.sync_data())
                .map_err(|e| unavailable(&path, "terminate final line", e))?;
        }

        let len = file
            .metadata()
            .map_err(|e| unavailable(&path, "stat", e))?
            .len();

        info!(
            path = %path.display(),
            entries = entries.len(),
            last_sequence = entries.last().map(|e| e.sequence_number).unwrap_or(0),
            "jsonl audit store opened"
        );

        Ok(Self {
            path,
            state: Mutex::new(JsonlState { file, len, entries }),
            timeout,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Copy the ledger file byte-for-byte to `destination`.
    ///
    /// The write lock is held for the copy so the archive is a consistent
    /// prefix of the stream.
    pub fn archive_to(&self, destination: impl AsRef<Path>) -> LedgerResult<u64> {
        let _state = self.lock()?;
        let destination = destination.as_ref();
        let copied = fs::copy(&self.path, destination)
            .map_err(|e| unavailable(destination, "archive", e))?;
        info!(
            source = %self.path.display(),
            destination = %destination.display(),
            bytes = copied,
            "audit ledger archived"
        );
        Ok(copied)
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, JsonlState>> {
        self.state
            .try_lock_for(self.timeout)
            .ok_or_else(|| LedgerError::StoreUnavailable {
                reason: format!(
                    "{} lock not acquired within {}ms",
                    self.path.display(),
                    self.timeout.as_millis()
                ),
            })
    }
}

impl AuditLogStore for JsonlAuditStore {
    fn append_atomic(&self, entry: &AuditLogEntry) -> LedgerResult<()> {
        let mut state = self.lock()?;

        let last_sequence = state.entries.last().map(|e| e.sequence_number).unwrap_or(0);
        let last_hash = state
            .entries
            .last()
            .map(|e| e.current_log_hash.as_str())
            .unwrap_or(AuditLogEntry::GENESIS_HASH);
        check_successor(entry, last_sequence, last_hash)?;

        let mut line = serde_json::to_vec(entry).map_err(|e| LedgerError::Serialization {
            reason: format!("entry {} could not be encoded: {e}", entry.sequence_number),
        })?;
        line.push(b'\n');

        let written = state
            .file
            .write_all(&line)
            .and_then(|()| state.file.sync_data());
        if let Err(e) = written {
            let keep = state.len;
            if let Err(trunc) = state.file.set_len(keep) {
                warn!(
                    path = %self.path.display(),
                    error = %trunc,
                    "could not truncate partial ledger line"
                );
            }
            return Err(unavailable(&self.path, "append", e));
        }

        state.len += line.len() as u64;
        state.entries.push(entry.clone());
        debug!(sequence = entry.sequence_number, "entry appended to jsonl store");
        Ok(())
    }

    fn read_range(&self, from_seq: u64, to_seq: u64) -> LedgerResult<Vec<AuditLogEntry>> {
        let state = self.lock()?;
        Ok(sequence_range(&state.entries, from_seq, to_seq).to_vec())
    }

    fn read_last_hash(&self) -> LedgerResult<String> {
        let state = self.lock()?;
        Ok(state
            .entries
            .last()
            .map(|e| e.current_log_hash.clone())
            .unwrap_or_else(|| AuditLogEntry::GENESIS_HASH.to_string()))
    }

    fn read_last_sequence(&self) -> LedgerResult<u64> {
        let state = self.lock()?;
        Ok(state.entries.last().map(|e| e.sequence_number).unwrap_or(0))
    }
}

/// `Ok(None)` for a blank line.
fn parse_line(segment: &[u8]) -> Result<Option<AuditLogEntry>, serde_json::Error> {
    if segment.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(segment).map(Some)
}

fn unavailable(path: &Path, op: &str, e: std::io::Error) -> LedgerError {
    LedgerError::StoreUnavailable {
        reason: format!("{op} {}: {e}", path.display()),
    }
}
