//! Pipeline configuration shared by every front end

use crate::Result;
use crate::error::ValidationError;
use crate::hashing::PoolConfig;
use crate::protocol::ProtocolConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Database file name used when no path is configured
pub const DEFAULT_DATABASE_FILE: &str = "anidb-identify.db";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_FILE),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub protocol: ProtocolConfig,
    pub hasher: PoolConfig,
    pub storage: StorageConfig,
}

impl PipelineConfig {
    /// Reject values that would make the pipeline misbehave
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: &str| -> Result<()> {
            Err(ValidationError::invalid_configuration(message).into())
        };

        if self.protocol.host.trim().is_empty() {
            return invalid("protocol.host is empty");
        }
        if self.protocol.port == 0 {
            return invalid("protocol.port must not be 0");
        }
        if self.protocol.reply_timeout_ms == 0 {
            return invalid("protocol.reply_timeout_ms must be positive");
        }
        if self.protocol.send_interval_ms == 0 {
            return invalid("protocol.send_interval_ms must be positive");
        }
        if self.storage.database_path.as_os_str().is_empty() {
            return invalid("storage.database_path is empty");
        }
        Ok(())
    }
}
