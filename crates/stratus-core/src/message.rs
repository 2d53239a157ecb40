//! Canonical workflow status message types.
//!
//! Produced by the external workflow engine, consumed (never mutated) by the
//! archiver, replayer, write coordinator and reporter.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a workflow execution. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

impl WorkflowStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkflowStatus::Running)
    }

    /// Ordering rank used by conflict resolution: terminal states outrank
    /// `running`, no ordering between the two terminal states.
    pub fn rank(&self) -> u8 {
        if self.is_terminal() {
            1
        } else {
            0
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one run of the external orchestration engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMeta {
    pub name: String,
    pub state_machine: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_execution_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_operation_id: Option<String>,
}

impl ExecutionMeta {
    /// Execution ARN derived from the state machine identifier and run name.
    pub fn arn(&self) -> String {
        format!("{}:{}", self.state_machine, self.name)
    }
}

/// Reference to a collection by name and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionRef {
    pub name: String,
    pub version: String,
}

impl CollectionRef {
    /// Stable collection identity, `{name}___{version}`.
    pub fn collection_id(&self) -> String {
        format!("{}___{}", self.name, self.version)
    }
}

/// One granule tracked by a workflow message. Granules without an identifier
/// are carried through but skipped by the report fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GranuleRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkflowStatus>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PdrStats {
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub total: u64,
}

/// A unit-of-work manifest describing a batch of granules, tracked with
/// aggregate progress stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdrRef {
    pub name: String,
    #[serde(default)]
    pub stats: PdrStats,
    #[serde(default)]
    pub progress: f64,
}

/// The canonical unit of work: one status event for one workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMessage {
    pub execution: ExecutionMeta,
    pub status: WorkflowStatus,
    /// Event timestamp assigned by the engine. Absent on some engine
    /// versions; consumers fall back to their own clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collection: Option<CollectionRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub granules: Vec<GranuleRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdr: Option<PdrRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl WorkflowMessage {
    pub fn collection_id(&self) -> Option<String> {
        self.collection.as_ref().map(CollectionRef::collection_id)
    }

    pub fn granule_ids(&self) -> Vec<String> {
        self.granules
            .iter()
            .filter_map(|g| g.granule_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_terminality() {
        assert!(!WorkflowStatus::Running.is_terminal());
        assert!(WorkflowStatus::Completed.is_terminal());
        assert!(WorkflowStatus::Failed.is_terminal());
        assert_eq!(WorkflowStatus::Running.rank(), 0);
        assert_eq!(WorkflowStatus::Failed.rank(), 1);
    }

    #[test]
    fn test_collection_id_format() {
        let coll = CollectionRef {
            name: "MOD09GQ".to_string(),
            version: "006".to_string(),
        };
        assert_eq!(coll.collection_id(), "MOD09GQ___006");
    }

    #[test]
    fn test_message_round_trip() {
        let raw = json!({
            "execution": {"name": "exec-42", "stateMachine": "arn:states:ingest"},
            "status": "completed",
            "collection": {"name": "MOD09GQ", "version": "006"},
            "granules": [{"granuleId": "G1", "files": [{"bucket": "b", "key": "k"}]}],
            "pdr": {"name": "P1.PDR", "stats": {"completed": 3, "failed": 0, "total": 3}, "progress": 100.0},
            "payload": {"granules": []}
        });

        let msg: WorkflowMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.execution.arn(), "arn:states:ingest:exec-42");
        assert_eq!(msg.collection_id().as_deref(), Some("MOD09GQ___006"));
        assert_eq!(msg.granule_ids(), vec!["G1".to_string()]);
        assert_eq!(msg.pdr.as_ref().unwrap().stats.total, 3);

        let encoded = serde_json::to_value(&msg).unwrap();
        let decoded: WorkflowMessage = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_granule_without_id_decodes() {
        let msg: WorkflowMessage = serde_json::from_value(json!({
            "execution": {"name": "e", "stateMachine": "sm"},
            "status": "running",
            "granules": [{"files": []}]
        }))
        .unwrap();
        assert!(msg.granules[0].granule_id.is_none());
        assert!(msg.granule_ids().is_empty());
    }
}
