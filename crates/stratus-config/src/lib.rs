// stratus-config - Unified runtime configuration
//
// Supports configuration from multiple sources:
// 1. Environment variables (STRATUS_* prefix, plus the legacy sweeper keys;
//    highest priority)
// 2. Config file path from STRATUS_CONFIG env var
// 3. Config file contents from STRATUS_CONFIG_CONTENT env var
// 4. Default config file location (./stratus.toml)
//
// The result is an immutable struct built once at activation start and
// passed by parameter; business logic never reads the process environment.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

mod sources;
mod validation;

/// Main runtime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeConfig {
    /// Deployment stack name; prefixes every dead-letter archive key.
    pub stack: String,

    pub storage: StorageConfig,

    #[serde(default)]
    pub sweeper: SweeperConfig,

    #[serde(default)]
    pub replay: ReplayConfig,

    #[serde(default)]
    pub channels: ChannelsConfig,

    #[serde(default)]
    pub server: ServerConfig,
}

/// Blob-store backend holding the dead-letter archive
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,

    #[serde(default)]
    pub fs: Option<FsConfig>,

    #[serde(default)]
    pub s3: Option<S3Config>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    S3,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageBackend::Fs => write!(f, "fs"),
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "fs" | "filesystem" => Ok(StorageBackend::Fs),
            "s3" | "aws" => Ok(StorageBackend::S3),
            "memory" | "mem" => Ok(StorageBackend::Memory),
            _ => anyhow::bail!(
                "Unsupported storage backend: {}. Supported: fs, s3, memory",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FsConfig {
    pub path: String,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            path: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// Payload retention sweeper configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweeperConfig {
    /// Days to keep payloads of executions in a terminal status.
    pub complete_timeout_days: u32,
    pub complete_timeout_disable: bool,
    /// Days to keep payloads of executions still running.
    pub non_complete_timeout_days: u32,
    pub non_complete_timeout_disable: bool,
    /// Cap on relational rows examined per sweep invocation.
    pub update_limit: usize,
    /// Bound on concurrent relational row updates.
    pub concurrency: usize,
    /// Seconds between scheduled sweeps; 0 disables the background loop.
    pub interval_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            complete_timeout_days: 10,
            complete_timeout_disable: false,
            non_complete_timeout_days: 30,
            non_complete_timeout_disable: false,
            update_limit: 10_000,
            concurrency: 100,
            interval_secs: 0,
        }
    }
}

impl SweeperConfig {
    pub fn interval(&self) -> Option<Duration> {
        (self.interval_secs > 0).then(|| Duration::from_secs(self.interval_secs))
    }
}

/// Dead-letter replay configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReplayConfig {
    /// Archive objects fetched per listing page.
    pub batch_size: usize,
    /// Failed replay passes before a record moves to the failed partition.
    pub max_replay_attempts: u32,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_replay_attempts: 3,
        }
    }
}

/// Notification channel topics for the report fan-out. A missing topic
/// disables that channel; the fan-out logs and continues.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChannelsConfig {
    pub execution: Option<String>,
    pub granule: Option<String>,
    pub pdr: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub log_level: String,
    pub log_format: LogFormat,
    pub max_payload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            max_payload_bytes: 8 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Text,
    Json,
}

impl RuntimeConfig {
    /// Load configuration from all sources with priority
    pub fn load() -> Result<Self> {
        sources::load_config(&sources::StdEnvSource)
    }

    /// Load configuration from a specific file path (for CLI --config flag),
    /// still applying environment overrides on top.
    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        sources::load_from_file_path(path, &sources::StdEnvSource)
    }

    /// Minimal in-memory configuration, used by tests and local runs.
    pub fn for_stack(stack: impl Into<String>) -> Self {
        Self {
            stack: stack.into(),
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                fs: None,
                s3: None,
            },
            sweeper: SweeperConfig::default(),
            replay: ReplayConfig::default(),
            channels: ChannelsConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}
