//! Store seams. Real PostgreSQL/Elasticsearch adapters implement these in
//! deployment-specific crates; the in-memory implementations in this crate
//! carry the same contract for tests and local runs.

use crate::error::StoreError;
use crate::records::{EntityKind, EventWrites, ExecutionPayloadRow, IndexedDocument};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// The primary relational store.
///
/// Lookup methods return `Ok(None)` for "not found" (an expected condition
/// under out-of-order delivery) and `Err` only for real failures.
#[async_trait]
pub trait RelationalStore: Send + Sync {
    async fn collection_id(&self, name: &str, version: &str) -> Result<Option<i64>, StoreError>;

    async fn provider_id(&self, name: &str) -> Result<Option<i64>, StoreError>;

    async fn execution_id(&self, arn: &str) -> Result<Option<i64>, StoreError>;

    async fn async_operation_id(&self, id: &str) -> Result<Option<i64>, StoreError>;

    /// Apply all derived writes for one event in a single transaction.
    async fn apply_event(&self, writes: EventWrites) -> Result<(), StoreError>;

    /// Executions with a non-null payload field last updated before
    /// `cutoff`, capped at `limit` rows.
    async fn select_expired_payloads(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExecutionPayloadRow>, StoreError>;

    /// Null both payload columns of one execution row.
    async fn clear_payloads(&self, arn: &str) -> Result<(), StoreError>;
}

/// The secondary search index. Writers are expected to fetch-existing and
/// consult `stratus_core::resolve_upsert` before putting; the index itself
/// applies no ordering logic.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn get(&self, kind: EntityKind, id: &str)
        -> Result<Option<IndexedDocument>, StoreError>;

    async fn put(
        &self,
        kind: EntityKind,
        id: &str,
        doc: IndexedDocument,
    ) -> Result<(), StoreError>;

    /// Server-side bulk payload expiry: strip payload fields from every
    /// execution document older than the cutoff applicable to its own
    /// status. One bulk operation, no per-document round trips. Returns
    /// the number of documents touched.
    async fn expire_payloads(
        &self,
        complete_cutoff: Option<DateTime<Utc>>,
        non_complete_cutoff: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError>;
}
