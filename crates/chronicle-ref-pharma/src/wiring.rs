//! Assembles a ledger from configuration.
//!
//! `Ledger` owns the `AuditService` together with the handles an operator
//! needs next to it: the chain engine for offline checks and the backup
//! worker for its counters.

use std::sync::Arc;

use tracing::info;

use chronicle_audit::{HashChainEngine, InMemoryAuditStore, JsonlAuditStore};
use chronicle_config::{KeyMaterial, LedgerConfig, StoreKind};
use chronicle_contracts::error::{LedgerError, LedgerResult};
use chronicle_core::{
    traits::{AuditLogStore, BackupQueue, EmergencyChannel},
    AuditService,
};
use chronicle_recovery::{
    BackupKey, BackupSettings, BackupSink, DirectoryBackupSink, EncryptedBackup,
    FileEmergencyLogger,
};
use chronicle_verify::ChainVerifier;

/// The concrete collaborators a ledger is built around.
pub struct LedgerParts {
    pub store: Arc<dyn AuditLogStore>,
    pub emergency: Arc<dyn EmergencyChannel>,
    /// `None` disables backup regardless of configuration.
    pub backup_sink: Option<Arc<dyn BackupSink>>,
}

impl LedgerParts {
    /// Build the store, emergency logger, and backup sink `config` names.
    pub fn from_config(config: &LedgerConfig) -> LedgerResult<Self> {
        let store: Arc<dyn AuditLogStore> = match config.store.kind {
            StoreKind::Memory => Arc::new(InMemoryAuditStore::with_timeout(config.store_timeout())),
            StoreKind::Jsonl => {
                let path = config.store.path.as_ref().ok_or_else(|| LedgerError::Config {
                    reason: "store.path is required for a jsonl store".to_string(),
                })?;
                Arc::new(JsonlAuditStore::open(path, config.store_timeout())?)
            }
        };

        let backup_sink: Option<Arc<dyn BackupSink>> = match &config.backup.directory {
            Some(directory) if config.backup.enabled => {
                Some(Arc::new(DirectoryBackupSink::new(directory)))
            }
            _ => None,
        };

        Ok(Self {
            store,
            emergency: Arc::new(FileEmergencyLogger::new(&config.emergency.path)),
            backup_sink,
        })
    }
}

pub struct Ledger {
    pub service: AuditService,
    pub store: Arc<dyn AuditLogStore>,
    pub engine: Arc<HashChainEngine>,
    pub backup: Option<Arc<EncryptedBackup>>,
    backup_key: Option<BackupKey>,
}

impl Ledger {
    /// Build every part from `config`.
    pub fn from_config(config: &LedgerConfig, keys: KeyMaterial) -> LedgerResult<Self> {
        Self::assemble(config, keys, LedgerParts::from_config(config)?)
    }

    /// Wire `parts` into a running ledger and resync it from the store.
    pub fn assemble(config: &LedgerConfig, keys: KeyMaterial, parts: LedgerParts) -> LedgerResult<Self> {
        let engine = Arc::new(HashChainEngine::new(keys.hmac));

        let backup = match (config.backup.enabled, parts.backup_sink) {
            (true, Some(sink)) => {
                let key = keys.backup.clone().ok_or_else(|| LedgerError::Config {
                    reason: "backup is enabled but no backup key was provided".to_string(),
                })?;
                let settings = BackupSettings {
                    stream_id: config.stream_id.clone(),
                    max_attempts: config.backup.max_attempts,
                    retry_backoff: config.retry_backoff(),
                    queue_capacity: config.backup.queue_capacity,
                };
                Some(Arc::new(EncryptedBackup::start(key, sink, settings)?))
            }
            _ => None,
        };

        let verifier = ChainVerifier::with_page_size(engine.clone(), config.verification.page_size);
        let service = AuditService::open(
            parts.store.clone(),
            engine.clone(),
            Box::new(verifier),
            parts.emergency,
            backup.clone().map(|b| b as Arc<dyn BackupQueue>),
            config.verification.page_size,
        )?;

        info!(
            stream_id = %config.stream_id,
            store = ?config.store.kind,
            backup = backup.is_some(),
            "ledger assembled"
        );

        Ok(Self {
            service,
            store: parts.store,
            engine,
            backup,
            backup_key: keys.backup,
        })
    }

    pub fn backup_key(&self) -> Option<&BackupKey> {
        self.backup_key.as_ref()
    }

    /// Drain pending backups.  No-op without a backup worker.
    pub fn flush_backups(&self) {
        if let Some(backup) = &self.backup {
            backup.flush();
        }
    }
}
