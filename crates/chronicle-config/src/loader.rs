//! Loading `LedgerConfig` from TOML.

use std::path::Path;

use tracing::debug;

use chronicle_contracts::error::{LedgerError, LedgerResult};

use crate::model::LedgerConfig;

impl LedgerConfig {
    /// Parse `s` as TOML and validate the result.
    ///
    /// Returns `LedgerError::Config` if the TOML is malformed, does not match
    /// the schema, or fails [`LedgerConfig::validate`].
    pub fn from_toml_str(s: &str) -> LedgerResult<Self> {
        let config: LedgerConfig = toml::from_str(s).map_err(|e| LedgerError::Config {
            reason: format!("failed to parse ledger TOML: {e}"),
        })?;
        config.validate()?;
        debug!(
            stream_id = %config.stream_id,
            store = ?config.store.kind,
            backup = config.backup.enabled,
            "ledger configuration loaded"
        );
        Ok(config)
    }

    /// Read the file at `path` and parse it as ledger configuration.
    pub fn from_file(path: &Path) -> LedgerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| LedgerError::Config {
            reason: format!("failed to read config file '{}': {e}", path.display()),
        })?;
        Self::from_toml_str(&contents)
    }
}
