//! The archived record shape for messages that failed to be durably recorded.

use crate::envelope::NormalizedMessage;
use crate::message::WorkflowStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry in the dead-letter archive: the original item verbatim plus
/// summary fields extracted at archive time so operators can inspect the
/// archive without re-parsing every body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeadLetterRecord {
    /// The full original item, never just the extracted summary.
    pub body: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_machine_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub granule_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    /// Replay passes attempted so far. Incremented by the replayer; once it
    /// reaches the configured limit the record moves to the failed partition.
    #[serde(default)]
    pub replay_attempts: u32,
}

impl DeadLetterRecord {
    /// Build a record from a normalized notification. When normalization
    /// could not recover a message, only the raw body and the error
    /// annotation are carried.
    pub fn from_normalized(normalized: &NormalizedMessage, now: DateTime<Utc>) -> Self {
        match &normalized.message {
            Some(msg) => DeadLetterRecord {
                body: normalized.raw.clone(),
                error: normalized.error.clone(),
                execution_arn: Some(msg.execution.arn()),
                state_machine_arn: Some(msg.execution.state_machine.clone()),
                status: Some(msg.status),
                time: msg.time.or(Some(now)),
                collection_id: msg.collection_id(),
                granule_ids: msg.granule_ids(),
                provider_id: msg.provider.clone(),
                replay_attempts: 0,
            },
            None => DeadLetterRecord {
                body: normalized.raw.clone(),
                error: normalized.error.clone(),
                execution_arn: None,
                state_machine_arn: None,
                status: None,
                time: Some(now),
                collection_id: None,
                granule_ids: Vec::new(),
                provider_id: None,
                replay_attempts: 0,
            },
        }
    }
}
