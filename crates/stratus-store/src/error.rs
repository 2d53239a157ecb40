//! Error types for the store crate

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A foreign-key lookup failed for a reason other than "not found".
    /// Fatal for the whole event; the caller routes the message to the
    /// dead-letter archive.
    #[error("lookup failed: {0}")]
    Lookup(String),

    /// Relational write failure; the per-event transaction rolled back.
    #[error("relational write failed: {0}")]
    Relational(String),

    /// Search-index read or write failure.
    #[error("search index operation failed: {0}")]
    Index(String),

    /// One or more row updates failed during a retention sweep. Sweeps are
    /// idempotent, so the whole invocation fails and is retried.
    #[error("payload sweep failed for {failed} of {attempted} rows; first error: {first}")]
    Sweep {
        failed: usize,
        attempted: usize,
        first: String,
    },
}
