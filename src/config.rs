use crate::error::ConfigError;
use crate::feature::DEFAULT_ID_SUFFIX;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration for an ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Key holding the identity string inside a matched feature node
    pub identity_key: String,

    /// Key of the list of temporal revisions; only the first one is read
    pub instances_key: String,

    /// Key of the vendor-extension body inside an instance
    pub extension_key: String,

    /// Key holding the locator text when a reference is an object
    pub locator_key: String,

    /// Pattern appended to every feature's id prefix
    pub id_suffix_pattern: String,

    /// Identified records per batch handed to a commit worker
    pub batch_size: usize,

    /// Commit workers; keep at or below the sink's safe concurrency
    pub workers: usize,

    /// Timeout applied to each sink write
    pub write_timeout_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig {
            identity_key: String::from("identifier"),
            instances_key: String::from("timeSlice"),
            extension_key: String::from("extension"),
            locator_key: String::from("href"),
            id_suffix_pattern: String::from(DEFAULT_ID_SUFFIX),
            batch_size: 5000,
            workers: 4,
            write_timeout_ms: 30_000,
        }
    }
}

impl IngestConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
