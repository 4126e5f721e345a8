//! Client configuration
//!
//! Loaded from YAML or assembled from the environment. Credential storage
//! itself is the caller's business; this only carries the token around.

use crate::Result;
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.pcloud.com";
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

pub const TOKEN_ENV: &str = "PCLOUD_TOKEN";
pub const BASE_URL_ENV: &str = "PCLOUD_BASE_URL";

/// Write mode as spelled in configuration files
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    #[default]
    Immediate,
    Chunked,
}

/// How a [`crate::RemoteFile`] turns `write` calls into remote writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// One remote write per `write` call, carrying the whole buffer
    #[default]
    Immediate,
    /// Accumulate and write `chunk_size` bytes at a time; `flush` or
    /// `close` sends the trailing partial chunk
    Chunked { chunk_size: usize },
}

impl WritePolicy {
    #[must_use]
    pub fn chunked() -> Self {
        WritePolicy::Chunked {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

/// What `delete` does when closing an open descriptor fails first
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeletePolicy {
    /// Log the close failure, forget the descriptor and delete anyway
    #[default]
    BestEffortClose,
    /// Report the close failure and leave the remote file alone
    RequireClose,
}

/// Configuration for a [`crate::PCloud`] client
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PCloudConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub token: String,
    /// Per-request timeout; `None` waits indefinitely
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub write_mode: WriteMode,
    /// Chunk size for [`WriteMode::Chunked`]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub delete_policy: DeletePolicy,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_timeout_seconds() -> Option<u64> {
    Some(DEFAULT_TIMEOUT_SECONDS)
}

impl PCloudConfig {
    /// Configuration with defaults for everything but the token
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: default_base_url(),
            token: token.into(),
            timeout_seconds: default_timeout_seconds(),
            write_mode: WriteMode::default(),
            chunk_size: default_chunk_size(),
            delete_policy: DeletePolicy::default(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_write_policy(mut self, write_policy: WritePolicy) -> Self {
        match write_policy {
            WritePolicy::Immediate => self.write_mode = WriteMode::Immediate,
            WritePolicy::Chunked { chunk_size } => {
                self.write_mode = WriteMode::Chunked;
                self.chunk_size = chunk_size;
            }
        }
        self
    }

    /// The write policy new file handles start with
    #[must_use]
    pub fn write_policy(&self) -> WritePolicy {
        match self.write_mode {
            WriteMode::Immediate => WritePolicy::Immediate,
            WriteMode::Chunked => WritePolicy::Chunked {
                chunk_size: self.chunk_size,
            },
        }
    }

    #[must_use]
    pub fn with_delete_policy(mut self, delete_policy: DeletePolicy) -> Self {
        self.delete_policy = delete_policy;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout_seconds = timeout.map(|t| t.as_secs().max(1));
        self
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }

    /// Build a configuration from `PCLOUD_TOKEN` and optional `PCLOUD_BASE_URL`
    pub fn from_env() -> Result<Self> {
        let token = std::env::var(TOKEN_ENV)
            .map_err(|_| Error::Config(format!("{TOKEN_ENV} is not set")))?;
        let mut config = Self::new(token);
        if let Ok(base_url) = std::env::var(BASE_URL_ENV) {
            config.base_url = base_url;
        }
        validate_config(&config)?;
        Ok(config)
    }

    /// Parse and validate YAML text
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: PCloudConfig = serde_yaml_ng::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse YAML configuration: {e}")))?;
        validate_config(&config)?;
        Ok(config)
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self)
            .map_err(|e| Error::Config(format!("Failed to serialize configuration: {e}")))
    }
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<PCloudConfig> {
    let content = std::fs::read_to_string(&path).map_err(|e| {
        Error::Config(format!(
            "Failed to read config file {}: {e}",
            path.as_ref().display()
        ))
    })?;
    PCloudConfig::from_yaml(&content)
}

pub(crate) fn validate_config(config: &PCloudConfig) -> Result<()> {
    if config.token.trim().is_empty() {
        return Err(Error::Config("token cannot be empty".to_string()));
    }

    url::Url::parse(&config.base_url)
        .map_err(|e| Error::Config(format!("invalid base_url {}: {e}", config.base_url)))?;

    if config.chunk_size == 0 {
        return Err(Error::Config(
            "chunk_size must be greater than 0".to_string(),
        ));
    }

    if config.timeout_seconds == Some(0) {
        return Err(Error::Config(
            "timeout_seconds must be greater than 0".to_string(),
        ));
    }

    Ok(())
}
