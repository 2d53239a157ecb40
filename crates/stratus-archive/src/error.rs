//! Error types for the archive crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Missing or inconsistent storage configuration. Fatal at startup,
    /// never a per-item failure.
    #[error("invalid archive configuration: {0}")]
    Config(String),

    #[error("storage operation failed: {0}")]
    Storage(#[from] opendal::Error),

    #[error("item could not be serialized for archival: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
