//! Dead-letter archiver: persist messages that failed to be durably recorded.

use crate::error::{ArchiveError, Result};
use crate::paths;
use chrono::Utc;
use serde_json::Value;
use stratus_core::{unwrap_envelope, DeadLetterRecord};

/// Outcome of archiving one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedObject {
    pub key: String,
    pub execution_arn: Option<String>,
}

/// Writes dead-letter records to the archive, one object per item.
#[derive(Clone)]
pub struct Archiver {
    operator: opendal::Operator,
    stack: String,
}

impl Archiver {
    pub fn new(operator: opendal::Operator, stack: impl Into<String>) -> Self {
        Self {
            operator,
            stack: stack.into(),
        }
    }

    /// Archive every item of a batch independently. Writes run in parallel
    /// and settle individually: a failure for one item never blocks or
    /// fails its siblings. The caller decides what a partial failure means.
    pub async fn archive_batch(&self, items: &[Value]) -> Vec<Result<ArchivedObject>> {
        futures::future::join_all(items.iter().map(|item| self.archive_one(item))).await
    }

    /// Archive a single raw item: extract summary fields, pick a
    /// content-addressed key, write the full original item as JSON.
    pub async fn archive_one(&self, item: &Value) -> Result<ArchivedObject> {
        let normalized = unwrap_envelope(item);
        let record = DeadLetterRecord::from_normalized(&normalized, Utc::now());
        let execution_name = normalized
            .message
            .as_ref()
            .map(|m| m.execution.name.as_str());

        let key = paths::archive_key(&self.stack, execution_name);
        let bytes = serde_json::to_vec(&record).map_err(ArchiveError::Serialize)?;
        self.operator.write(&key, bytes).await?;

        tracing::info!(
            key = %key,
            execution = execution_name.unwrap_or("unknown"),
            error = record.error.as_deref().unwrap_or(""),
            "Archived dead-letter record"
        );

        Ok(ArchivedObject {
            key,
            execution_arn: record.execution_arn,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn memory_archiver() -> (Archiver, opendal::Operator) {
        let op = opendal::Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        (Archiver::new(op.clone(), "test-stack"), op)
    }

    fn message(name: &str) -> Value {
        json!({
            "execution": {"name": name, "stateMachine": "arn:states:ingest"},
            "status": "failed",
            "collection": {"name": "MOD09GQ", "version": "006"},
            "granules": [{"granuleId": "G1"}]
        })
    }

    #[tokio::test]
    async fn test_archive_key_and_body_verbatim() {
        let (archiver, op) = memory_archiver();
        let raw = message("exec-42");

        let archived = archiver.archive_one(&raw).await.unwrap();
        assert!(archived
            .key
            .starts_with("test-stack/dead-letter-archive/sqs/exec-42-"));
        assert!(archived.key.ends_with(".json"));

        let stored = op.read(&archived.key).await.unwrap().to_vec();
        let record: DeadLetterRecord = serde_json::from_slice(&stored).unwrap();
        assert_eq!(record.body, raw);
        assert_eq!(record.granule_ids, vec!["G1"]);
        assert_eq!(
            record.execution_arn.as_deref(),
            Some("arn:states:ingest:exec-42")
        );
    }

    #[tokio::test]
    async fn test_unparsable_item_still_archived() {
        let (archiver, op) = memory_archiver();
        let raw = json!({"opaque": true});

        let archived = archiver.archive_one(&raw).await.unwrap();
        assert!(archived
            .key
            .starts_with("test-stack/dead-letter-archive/sqs/unknown-"));

        let stored = op.read(&archived.key).await.unwrap().to_vec();
        let record: DeadLetterRecord = serde_json::from_slice(&stored).unwrap();
        assert_eq!(record.body, raw);
        assert!(record.error.is_some());
    }

    #[tokio::test]
    async fn test_batch_settles_every_item() {
        let (archiver, op) = memory_archiver();
        let items: Vec<Value> = (0..5).map(|i| message(&format!("exec-{}", i))).collect();

        let outcomes = archiver.archive_batch(&items).await;
        assert_eq!(outcomes.len(), 5);
        for outcome in &outcomes {
            assert!(outcome.is_ok());
        }

        let entries = op
            .list("test-stack/dead-letter-archive/sqs/")
            .await
            .unwrap();
        assert_eq!(entries.iter().filter(|e| e.metadata().is_file()).count(), 5);
    }
}
