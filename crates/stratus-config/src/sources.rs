// Configuration source loading.
//
// Priority order:
// 1. Environment overrides (STRATUS_* prefix, plus the operational sweeper
//    keys the deployment tooling has always exported)
// 2. Config file path from STRATUS_CONFIG
// 3. Inline config content from STRATUS_CONFIG_CONTENT
// 4. Default config file (./stratus.toml)

use crate::*;
use anyhow::{Context, Result};
use std::env;
use std::path::Path;

pub(crate) const ENV_PREFIX: &str = "STRATUS_";

/// Environment access seam so override parsing is testable without
/// touching the process environment.
pub(crate) trait EnvSource {
    fn get(&self, key: &str) -> Option<String>;
    fn get_raw(&self, key: &str) -> Option<String>;
}

pub(crate) struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, key: &str) -> Option<String> {
        env::var(format!("{}{}", ENV_PREFIX, key)).ok()
    }

    fn get_raw(&self, key: &str) -> Option<String> {
        env::var(key).ok()
    }
}

pub(crate) fn load_config(env_source: &dyn EnvSource) -> Result<RuntimeConfig> {
    let mut config = load_from_file()?
        .ok_or_else(|| anyhow::anyhow!(
            "No configuration found: set STRATUS_CONFIG, STRATUS_CONFIG_CONTENT, or create ./stratus.toml"
        ))?;

    apply_env_overrides(&mut config, env_source)?;
    config.validate()?;
    Ok(config)
}

pub(crate) fn load_from_file_path(
    path: impl AsRef<Path>,
    env_source: &dyn EnvSource,
) -> Result<RuntimeConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let mut config: RuntimeConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    apply_env_overrides(&mut config, env_source)?;
    config.validate()?;
    Ok(config)
}

fn load_from_file() -> Result<Option<RuntimeConfig>> {
    if let Ok(path) = env::var("STRATUS_CONFIG") {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: RuntimeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        return Ok(Some(config));
    }

    if let Ok(content) = env::var("STRATUS_CONFIG_CONTENT") {
        let config: RuntimeConfig = toml::from_str(&content)
            .context("Failed to parse inline config from STRATUS_CONFIG_CONTENT")?;
        return Ok(Some(config));
    }

    let path = "./stratus.toml";
    if Path::new(path).exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;
        let config: RuntimeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;
        return Ok(Some(config));
    }

    Ok(None)
}

/// Apply environment overrides. An override that is present but fails to
/// parse is a fatal error, never a silent fallback to the default: the
/// sweeper in particular must refuse to run with a mistyped timeout.
pub(crate) fn apply_env_overrides(
    config: &mut RuntimeConfig,
    source: &dyn EnvSource,
) -> Result<()> {
    if let Some(stack) = source.get("STACK") {
        config.stack = stack;
    }
    if let Some(backend) = source.get("STORAGE_BACKEND") {
        config.storage.backend = backend.parse()?;
    }
    if let Some(addr) = source.get("LISTEN_ADDR") {
        config.server.listen_addr = addr;
    }
    if let Some(level) = source.get("LOG_LEVEL") {
        config.server.log_level = level;
    }

    // Sweeper keys keep their historical spellings; deployment tooling
    // exports them without the STRATUS_ prefix.
    if let Some(v) = source.get_raw("completeExecutionPayloadTimeout") {
        config.sweeper.complete_timeout_days = parse_override("completeExecutionPayloadTimeout", &v)?;
    }
    if let Some(v) = source.get_raw("completeExecutionPayloadTimeoutDisable") {
        config.sweeper.complete_timeout_disable =
            parse_override("completeExecutionPayloadTimeoutDisable", &v)?;
    }
    if let Some(v) = source.get_raw("nonCompleteExecutionPayloadTimeout") {
        config.sweeper.non_complete_timeout_days =
            parse_override("nonCompleteExecutionPayloadTimeout", &v)?;
    }
    if let Some(v) = source.get_raw("nonCompleteExecutionPayloadTimeoutDisable") {
        config.sweeper.non_complete_timeout_disable =
            parse_override("nonCompleteExecutionPayloadTimeoutDisable", &v)?;
    }
    if let Some(v) = source.get_raw("UPDATE_LIMIT") {
        config.sweeper.update_limit = parse_override("UPDATE_LIMIT", &v)?;
    }
    if let Some(v) = source.get_raw("CONCURRENCY") {
        config.sweeper.concurrency = parse_override("CONCURRENCY", &v)?;
    }

    Ok(())
}

fn parse_override<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid value for {}: {:?} ({})", key, value, e))
}
