// Configuration validation, run once at startup before any component
// touches a store.

use crate::{RuntimeConfig, StorageBackend};
use anyhow::Result;

pub(crate) fn validate_config(config: &RuntimeConfig) -> Result<()> {
    if config.stack.trim().is_empty() {
        anyhow::bail!("stack name must not be empty");
    }

    match config.storage.backend {
        StorageBackend::Fs => {
            if config.storage.fs.is_none() {
                anyhow::bail!("storage.fs section required for the fs backend");
            }
        }
        StorageBackend::S3 => {
            let s3 = config
                .storage
                .s3
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("storage.s3 section required for the s3 backend"))?;
            if s3.bucket.is_empty() {
                anyhow::bail!("storage.s3.bucket must not be empty");
            }
            if s3.region.is_empty() {
                anyhow::bail!("storage.s3.region must not be empty");
            }
        }
        StorageBackend::Memory => {}
    }

    let sweeper = &config.sweeper;
    if !sweeper.complete_timeout_disable && sweeper.complete_timeout_days == 0 {
        anyhow::bail!("sweeper.complete_timeout_days must be positive when enabled");
    }
    if !sweeper.non_complete_timeout_disable && sweeper.non_complete_timeout_days == 0 {
        anyhow::bail!("sweeper.non_complete_timeout_days must be positive when enabled");
    }
    if sweeper.update_limit == 0 {
        anyhow::bail!("sweeper.update_limit must be positive");
    }
    if sweeper.concurrency == 0 {
        anyhow::bail!("sweeper.concurrency must be positive");
    }

    if config.replay.batch_size == 0 {
        anyhow::bail!("replay.batch_size must be positive");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;

    #[test]
    fn test_empty_stack_rejected() {
        let mut config = RuntimeConfig::for_stack("  ");
        config.stack = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fs_backend_requires_section() {
        let mut config = RuntimeConfig::for_stack("s");
        config.storage.backend = StorageBackend::Fs;
        assert!(config.validate().is_err());

        config.storage.fs = Some(crate::FsConfig::default());
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_enabled_timeout_rejected() {
        let mut config = RuntimeConfig::for_stack("s");
        config.sweeper.complete_timeout_days = 0;
        assert!(config.validate().is_err());

        // disabling the threshold makes zero acceptable
        config.sweeper.complete_timeout_disable = true;
        config.validate().unwrap();
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let mut config = RuntimeConfig::for_stack("s");
        config.sweeper.concurrency = 0;
        assert!(config.validate().is_err());
    }
}
