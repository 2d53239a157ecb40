//! Archive operator construction from RuntimeConfig.

use crate::error::{ArchiveError, Result};
use stratus_config::{StorageBackend, StorageConfig};

/// Build the OpenDAL operator backing the dead-letter archive.
pub fn build_operator(storage: &StorageConfig) -> Result<opendal::Operator> {
    let operator = match storage.backend {
        StorageBackend::Fs => {
            let fs = storage.fs.as_ref().ok_or_else(|| {
                ArchiveError::Config("fs config required for filesystem backend".to_string())
            })?;

            let fs_builder = opendal::services::Fs::default().root(&fs.path);
            opendal::Operator::new(fs_builder)?.finish()
        }
        StorageBackend::S3 => {
            let s3 = storage.s3.as_ref().ok_or_else(|| {
                ArchiveError::Config("s3 config required for S3 backend".to_string())
            })?;

            let mut s3_builder = opendal::services::S3::default()
                .bucket(&s3.bucket)
                .region(&s3.region);

            if let Some(endpoint) = &s3.endpoint {
                s3_builder = s3_builder.endpoint(endpoint);
            }

            opendal::Operator::new(s3_builder)?.finish()
        }
        StorageBackend::Memory => {
            opendal::Operator::new(opendal::services::Memory::default())?.finish()
        }
    };

    Ok(operator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_config::RuntimeConfig;

    #[test]
    fn test_memory_backend_builds() {
        let config = RuntimeConfig::for_stack("test");
        build_operator(&config.storage).unwrap();
    }

    #[test]
    fn test_fs_backend_without_section_is_config_error() {
        let mut config = RuntimeConfig::for_stack("test");
        config.storage.backend = StorageBackend::Fs;
        let err = build_operator(&config.storage).unwrap_err();
        assert!(matches!(err, ArchiveError::Config(_)));
    }
}
