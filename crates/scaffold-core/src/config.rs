//! Installation-wide configuration for bulk runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::{ResultStore, StoreError, DEFAULT_STORAGE_DIR_NAME};
use crate::types::{BulkCommand, ToolInvocation};

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_MARKER: &str = "pyproject.toml";
pub const DEFAULT_MAX_DEPTH: usize = 3;
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaffoldConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub bulk: BulkConfig,
    /// Per-command tool overrides, keyed by command name (`pytest`, `prek`).
    #[serde(default)]
    pub tools: BTreeMap<String, ToolInvocation>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the result log. Defaults to `~/.scaffold`.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkConfig {
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Worker pool size; 0 means available hardware concurrency.
    #[serde(default)]
    pub workers: usize,
    #[serde(default = "default_marker")]
    pub marker: String,
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            workers: 0,
            marker: DEFAULT_MARKER.to_string(),
        }
    }
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_marker() -> String {
    DEFAULT_MARKER.to_string()
}

impl BulkConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolved worker count, never zero.
    pub fn effective_workers(&self) -> usize {
        if self.workers > 0 {
            return self.workers;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }
}

impl ScaffoldConfig {
    /// Tool for `command`, honouring configured overrides.
    pub fn invocation_for(&self, command: BulkCommand) -> ToolInvocation {
        self.tools
            .iter()
            .find(|(name, _)| name.parse::<BulkCommand>().ok() == Some(command))
            .map(|(_, invocation)| invocation.clone())
            .unwrap_or_else(|| command.default_invocation())
    }

    pub fn result_store(&self) -> Result<ResultStore, StoreError> {
        match &self.storage.dir {
            Some(dir) => Ok(ResultStore::new(dir.clone())),
            None => ResultStore::default_location(),
        }
    }
}

/// `~/.scaffold/config.toml`, if a home directory is known.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(DEFAULT_STORAGE_DIR_NAME).join(CONFIG_FILE_NAME))
}

pub fn parse_config(contents: &str) -> Result<ScaffoldConfig, toml::de::Error> {
    toml::from_str(contents)
}

pub fn load_config(path: impl AsRef<Path>) -> Result<ScaffoldConfig, ConfigError> {
    let path_ref = path.as_ref();
    let body = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
        path: path_ref.to_path_buf(),
        source,
    })?;
    parse_config(&body).map_err(|source| ConfigError::Parse {
        path: path_ref.to_path_buf(),
        source,
    })
}

/// Like [`load_config`], but a missing file yields the defaults.
pub fn load_or_default(path: impl AsRef<Path>) -> Result<ScaffoldConfig, ConfigError> {
    let path_ref = path.as_ref();
    if !path_ref.exists() {
        tracing::debug!(path = %path_ref.display(), "no config file, using defaults");
        return Ok(ScaffoldConfig::default());
    }
    load_config(path_ref)
}
