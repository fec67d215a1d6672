//! Encrypted off-path backup of high-sensitivity entries.
//!
//! `EncryptedBackup` implements `BackupQueue`.  `enqueue` hands the persisted
//! entry to a background worker and returns at once; the append that produced
//! the entry has already succeeded and is never affected by what happens here.
//! The queue is bounded; an entry offered to a full queue is dropped, counted
//! as failed, and logged at error level.
//!
//! The worker serializes each entry, seals it with AES-256-GCM under a fresh
//! random 96-bit nonce, and binds `"{stream_id}:{sequence}"` as associated
//! data so a record cannot be replayed under another position.  Sink writes
//! are retried with linear backoff; records that exhaust their attempts are
//! counted in `BackupStats::failed` and logged at error level.
//!
//! Records carry the full entry including its stored hashes, so a restored
//! record can be re-hashed by the chain engine without the primary store.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use chronicle_contracts::{
    entry::AuditLogEntry,
    error::{LedgerError, LedgerResult},
};
use chronicle_core::traits::{BackupQueue, ChainHasher};

use crate::key::BackupKey;

const NONCE_LEN: usize = 12;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

// ── Record & sinks ────────────────────────────────────────────────────────────

/// One sealed entry as written to a backup sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRecord {
    pub stream_id: String,
    pub sequence_number: u64,
    pub entry_id: Uuid,
    /// Hex-encoded 96-bit nonce.
    pub nonce: String,
    /// Hex-encoded ciphertext including the GCM tag.
    pub ciphertext: String,
    pub sealed_at: DateTime<Utc>,
}

impl BackupRecord {
    fn associated_data(stream_id: &str, sequence: u64) -> Vec<u8> {
        format!("{stream_id}:{sequence}").into_bytes()
    }
}

/// Destination for sealed records, independent of the primary store.
pub trait BackupSink: Send + Sync {
    fn write(&self, record: &BackupRecord) -> LedgerResult<()>;
}

/// Writes one JSON file per record under a directory.
pub struct DirectoryBackupSink {
    directory: PathBuf,
}

impl DirectoryBackupSink {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn file_name(record: &BackupRecord) -> String {
        format!("{}-{:020}.json", record.stream_id, record.sequence_number)
    }

    /// Load every record in the directory, ordered by stream and sequence.
    pub fn read_all(&self) -> LedgerResult<Vec<BackupRecord>> {
        let listing = match fs::read_dir(&self.directory) {
            Ok(listing) => listing,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LedgerError::Backup {
                    reason: format!("list {}: {e}", self.directory.display()),
                })
            }
        };

        let mut records = Vec::new();
        for item in listing {
            let path = item
                .map_err(|e| LedgerError::Backup {
                    reason: format!("list {}: {e}", self.directory.display()),
                })?
                .path();
            if path.extension().and_then(|x| x.to_str()) != Some("json") {
                continue;
            }
            let raw = fs::read(&path).map_err(|e| LedgerError::Backup {
                reason: format!("read {}: {e}", path.display()),
            })?;
            let record: BackupRecord =
                serde_json::from_slice(&raw).map_err(|e| LedgerError::Serialization {
                    reason: format!("{}: {e}", path.display()),
                })?;
            records.push(record);
        }
        records.sort_by(|a, b| {
            (a.stream_id.as_str(), a.sequence_number).cmp(&(b.stream_id.as_str(), b.sequence_number))
        });
        Ok(records)
    }
}

impl BackupSink for DirectoryBackupSink {
    fn write(&self, record: &BackupRecord) -> LedgerResult<()> {
        let io = |op: &str, path: &Path, e: std::io::Error| LedgerError::Backup {
            reason: format!("{op} {}: {e}", path.display()),
        };

        fs::create_dir_all(&self.directory).map_err(|e| io("create", &self.directory, e))?;

        let body = serde_json::to_vec_pretty(record).map_err(|e| LedgerError::Serialization {
            reason: format!("backup record {}: {e}", record.sequence_number),
        })?;
        let final_path = self.directory.join(Self::file_name(record));
        let tmp_path = final_path.with_extension("json.tmp");

        fs::write(&tmp_path, body).map_err(|e| io("write", &tmp_path, e))?;
        fs::rename(&tmp_path, &final_path).map_err(|e| io("rename", &final_path, e))?;
        Ok(())
    }
}

/// Keeps records in memory.  Can be told to fail the next N writes.
#[derive(Default)]
pub struct InMemoryBackupSink {
    records: Mutex<Vec<BackupRecord>>,
    fail_next: AtomicU32,
}

impl InMemoryBackupSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` writes fail.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<BackupRecord> {
        self.records.lock().clone()
    }
}

impl BackupSink for InMemoryBackupSink {
    fn write(&self, record: &BackupRecord) -> LedgerResult<()> {
        let failing = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(LedgerError::Backup {
                reason: "backup sink unavailable".to_string(),
            });
        }
        self.records.lock().push(record.clone());
        Ok(())
    }
}

// ── Settings & stats ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BackupSettings {
    pub stream_id: String,
    /// Total sink attempts per record, including the first.
    pub max_attempts: u32,
    /// Delay before retry `n` is `retry_backoff * n`.
    pub retry_backoff: Duration,
    /// Entries that may wait for the worker; further entries are dropped.
    pub queue_capacity: usize,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            stream_id: "default".to_string(),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(50),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Snapshot of backup counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BackupStats {
    pub enqueued: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub retries: u64,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    retries: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> BackupStats {
        BackupStats {
            enqueued: self.enqueued.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            retries: self.retries.load(Ordering::SeqCst),
        }
    }
}

// ── EncryptedBackup ───────────────────────────────────────────────────────────

enum Job {
    Store(Box<AuditLogEntry>),
    Flush(Sender<()>),
}

/// Background AES-256-GCM backup writer.
pub struct EncryptedBackup {
    sender: Mutex<Option<SyncSender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl EncryptedBackup {
    /// Start the worker thread.
    pub fn start(
        key: BackupKey,
        sink: Arc<dyn BackupSink>,
        settings: BackupSettings,
    ) -> LedgerResult<Self> {
        let counters = Arc::new(Counters::default());
        let capacity = settings.queue_capacity.max(1);
        let (sender, receiver) = mpsc::sync_channel(capacity);

        let worker = Worker {
            key,
            sink,
            settings,
            counters: counters.clone(),
        };
        let handle = thread::Builder::new()
            .name("chronicle-backup".to_string())
            .spawn(move || worker.run(receiver))
            .map_err(|e| LedgerError::Backup {
                reason: format!("backup worker could not start: {e}"),
            })?;

        info!(queue_capacity = capacity, "encrypted backup worker started");

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(handle)),
            counters,
        })
    }

    pub fn stats(&self) -> BackupStats {
        self.counters.snapshot()
    }

    /// Block until every record enqueued before this call has been handled.
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        // Send outside the lock: a full queue blocks here, not in `enqueue`.
        let sender = self.sender.lock().clone();
        let sent = match sender {
            Some(sender) => sender.send(Job::Flush(tx)).is_ok(),
            None => false,
        };
        if sent && rx.recv().is_err() {
            warn!("backup worker exited during flush");
        }
    }

    /// Seal one entry.
    pub fn seal(key: &BackupKey, stream_id: &str, entry: &AuditLogEntry) -> LedgerResult<BackupRecord> {
        let plaintext = serde_json::to_vec(entry).map_err(|e| LedgerError::Serialization {
            reason: format!("entry {} could not be encoded for backup: {e}", entry.sequence_number),
        })?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut nonce_bytes);

        let aad = BackupRecord::associated_data(stream_id, entry.sequence_number);
        let ciphertext = cipher(key)?
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &plaintext,
                    aad: &aad,
                },
            )
            .map_err(|_| LedgerError::Crypto {
                reason: format!("entry {} could not be encrypted", entry.sequence_number),
            })?;

        Ok(BackupRecord {
            stream_id: stream_id.to_string(),
            sequence_number: entry.sequence_number,
            entry_id: entry.id,
            nonce: hex::encode(nonce_bytes),
            ciphertext: hex::encode(ciphertext),
            sealed_at: Utc::now(),
        })
    }

    /// Open a sealed record and return the entry it carries.
    ///
    /// Fails with `Crypto` on a wrong key, a tampered ciphertext, or a record
    /// moved to another stream position, and with `IntegrityViolation` when
    /// the decrypted entry disagrees with the record's envelope.
    pub fn decrypt_record(key: &BackupKey, record: &BackupRecord) -> LedgerResult<AuditLogEntry> {
        let nonce = hex::decode(&record.nonce).map_err(|e| LedgerError::Crypto {
            reason: format!("backup {} nonce is not hex: {e}", record.sequence_number),
        })?;
        if nonce.len() != NONCE_LEN {
            return Err(LedgerError::Crypto {
                reason: format!(
                    "backup {} nonce is {} bytes, expected {NONCE_LEN}",
                    record.sequence_number,
                    nonce.len()
                ),
            });
        }
        let ciphertext = hex::decode(&record.ciphertext).map_err(|e| LedgerError::Crypto {
            reason: format!("backup {} ciphertext is not hex: {e}", record.sequence_number),
        })?;

        let aad = BackupRecord::associated_data(&record.stream_id, record.sequence_number);
        let plaintext = cipher(key)?
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: &ciphertext,
                    aad: &aad,
                },
            )
            .map_err(|_| LedgerError::Crypto {
                reason: format!(
                    "backup {} could not be decrypted (wrong key or tampered record)",
                    record.sequence_number
                ),
            })?;

        let entry: AuditLogEntry =
            serde_json::from_slice(&plaintext).map_err(|e| LedgerError::Serialization {
                reason: format!("backup {} payload: {e}", record.sequence_number),
            })?;

        if entry.sequence_number != record.sequence_number || entry.id != record.entry_id {
            return Err(LedgerError::IntegrityViolation {
                reason: format!(
                    "backup envelope says sequence {} / {}, payload says {} / {}",
                    record.sequence_number, record.entry_id, entry.sequence_number, entry.id
                ),
            });
        }
        Ok(entry)
    }

    /// Decrypt a record and recompute its hash without the primary store.
    pub fn verify_backup_record(
        key: &BackupKey,
        hasher: &dyn ChainHasher,
        record: &BackupRecord,
    ) -> LedgerResult<AuditLogEntry> {
        let entry = Self::decrypt_record(key, record)?;
        let recomputed = hasher.compute(&entry.hashable(), &entry.previous_log_hash)?;
        if recomputed != entry.current_log_hash {
            return Err(LedgerError::IntegrityViolation {
                reason: format!(
                    "backup {} hash {} does not match recomputed {}",
                    entry.sequence_number, entry.current_log_hash, recomputed
                ),
            });
        }
        Ok(entry)
    }
}

impl BackupQueue for EncryptedBackup {
    fn enqueue(&self, entry: &AuditLogEntry) {
        self.counters.enqueued.fetch_add(1, Ordering::SeqCst);
        let reason = match self.sender.lock().as_ref() {
            Some(sender) => match sender.try_send(Job::Store(Box::new(entry.clone()))) {
                Ok(()) => return,
                Err(TrySendError::Full(_)) => "backup queue full",
                Err(TrySendError::Disconnected(_)) => "backup worker unavailable",
            },
            None => "backup worker unavailable",
        };
        self.counters.failed.fetch_add(1, Ordering::SeqCst);
        error!(
            sequence = entry.sequence_number,
            entry_id = %entry.id,
            reason,
            "entry not backed up"
        );
    }
}

impl Drop for EncryptedBackup {
    fn drop(&mut self) {
        // Closing the channel lets the worker drain and exit.
        self.sender.lock().take();
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("backup worker panicked");
            }
        }
    }
}

fn cipher(key: &BackupKey) -> LedgerResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| LedgerError::Crypto {
        reason: "backup key has invalid length".to_string(),
    })
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct Worker {
    key: BackupKey,
    sink: Arc<dyn BackupSink>,
    settings: BackupSettings,
    counters: Arc<Counters>,
}

impl Worker {
    fn run(self, receiver: Receiver<Job>) {
        for job in receiver {
            match job {
                Job::Store(entry) => self.store(&entry),
                Job::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!("backup worker stopped");
    }

    fn store(&self, entry: &AuditLogEntry) {
        let record = match EncryptedBackup::seal(&self.key, &self.settings.stream_id, entry) {
            Ok(record) => record,
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::SeqCst);
                error!(sequence = entry.sequence_number, error = %e, "backup sealing failed");
                return;
            }
        };

        let max_attempts = self.settings.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.sink.write(&record) {
                Ok(()) => {
                    self.counters.succeeded.fetch_add(1, Ordering::SeqCst);
                    debug!(sequence = record.sequence_number, attempt, "backup written");
                    return;
                }
                Err(e) if attempt < max_attempts => {
                    self.counters.retries.fetch_add(1, Ordering::SeqCst);
                    warn!(
                        sequence = record.sequence_number,
                        attempt,
                        error = %e,
                        "backup write failed, retrying"
                    );
                    thread::sleep(self.settings.retry_backoff * attempt);
                }
                Err(e) => {
                    self.counters.failed.fetch_add(1, Ordering::SeqCst);
                    error!(
                        sequence = record.sequence_number,
                        entry_id = %record.entry_id,
                        attempts = max_attempts,
                        error = %e,
                        "backup exhausted retries"
                    );
                }
            }
        }
    }
}
