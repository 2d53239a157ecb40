//! Derived record shapes for the two stores.

use chrono::{DateTime, Utc};
use serde_json::Value;
use stratus_core::{PdrStats, UpsertSnapshot, WorkflowStatus};

/// Entities mirrored into the search index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Execution,
    Granule,
    Pdr,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Execution => "execution",
            EntityKind::Granule => "granule",
            EntityKind::Pdr => "pdr",
        }
    }
}

/// Relational execution row. Foreign-key references are resolved ids; a
/// `None` reference means the referenced entity was not found, which is an
/// expected condition under out-of-order delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRow {
    pub arn: String,
    pub name: String,
    pub status: WorkflowStatus,
    pub collection_ref: Option<i64>,
    pub provider_ref: Option<i64>,
    pub parent_ref: Option<i64>,
    pub async_operation_ref: Option<i64>,
    pub original_payload: Option<Value>,
    pub final_payload: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GranuleRow {
    pub granule_id: String,
    pub status: WorkflowStatus,
    pub collection_ref: Option<i64>,
    pub execution_arn: String,
    pub files: Vec<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PdrRow {
    pub name: String,
    pub status: WorkflowStatus,
    pub collection_ref: Option<i64>,
    pub provider_ref: Option<i64>,
    pub execution_arn: String,
    pub stats: PdrStats,
    pub progress: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything one incoming event writes to the relational store. Applied
/// atomically: all of it lands or none of it does.
#[derive(Debug, Clone, PartialEq)]
pub struct EventWrites {
    pub execution: ExecutionRow,
    pub granules: Vec<GranuleRow>,
    pub pdr: Option<PdrRow>,
}

/// Slim row projection the sweeper scans: enough to decide eligibility
/// under the status-specific threshold without hauling payloads around.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPayloadRow {
    pub arn: String,
    pub status: WorkflowStatus,
    pub updated_at: DateTime<Utc>,
}

/// A document mirrored into the search index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub status: WorkflowStatus,
    pub progress: Option<f64>,
    pub execution: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub body: Value,
}

impl IndexedDocument {
    /// Projection handed to the conflict-resolution rule.
    pub fn snapshot(&self) -> UpsertSnapshot {
        UpsertSnapshot {
            status: self.status,
            progress: self.progress,
            execution: self.execution.clone(),
            updated_at: self.updated_at,
        }
    }
}
