use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

use crate::store::BackupConfig;

/// Environment variable overriding `backups.max_backups`.
pub const MAX_BACKUPS_ENV: &str = "MAX_BACKUPS";

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Directory holding one `<name>.json` document per store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub backups: BackupConfig,
    /// Bounded wait for store queue admission. Unset waits indefinitely.
    #[serde(default)]
    pub queue_timeout_ms: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            backups: BackupConfig::default(),
            queue_timeout_ms: None,
        }
    }
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(mut self) -> Self {
        let raw = std::env::var(MAX_BACKUPS_ENV).ok();
        if let Some(max_backups) = parse_max_backups(raw.as_deref()) {
            self.backups.max_backups = max_backups;
        }
        self
    }

    pub fn queue_timeout(&self) -> Option<Duration> {
        self.queue_timeout_ms.map(Duration::from_millis)
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// Parse a retention override. Empty, zero, or non-numeric values are ignored.
fn parse_max_backups(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================
