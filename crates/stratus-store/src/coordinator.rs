//! The dual-store write coordinator: one event in, both stores updated.
//!
//! Live traffic and dead-letter replay go through the same entry point, so
//! replay is exactly as safe as first delivery.

use crate::error::StoreError;
use crate::records::{
    EntityKind, EventWrites, ExecutionRow, GranuleRow, IndexedDocument, PdrRow,
};
use crate::traits::{RelationalStore, SearchIndex};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use stratus_core::{resolve_upsert, WorkflowMessage, WriteDecision};

pub struct WriteCoordinator {
    relational: Arc<dyn RelationalStore>,
    index: Arc<dyn SearchIndex>,
}

impl WriteCoordinator {
    pub fn new(relational: Arc<dyn RelationalStore>, index: Arc<dyn SearchIndex>) -> Self {
        Self { relational, index }
    }

    /// Record one workflow status event in both stores.
    ///
    /// Foreign-key references that cannot be found resolve to `None` and
    /// processing continues; any other failure aborts the whole event and
    /// propagates to the caller, which owns dead-letter archival.
    pub async fn write_status_event(&self, msg: &WorkflowMessage) -> Result<(), StoreError> {
        let event_time = msg.time.unwrap_or_else(Utc::now);

        let collection_ref = match &msg.collection {
            Some(c) => self.relational.collection_id(&c.name, &c.version).await?,
            None => None,
        };
        let provider_ref = match &msg.provider {
            Some(p) => self.relational.provider_id(p).await?,
            None => None,
        };
        let parent_ref = match &msg.execution.parent_execution_arn {
            Some(arn) => self.relational.execution_id(arn).await?,
            None => None,
        };
        let async_operation_ref = match &msg.execution.async_operation_id {
            Some(id) => self.relational.async_operation_id(id).await?,
            None => None,
        };

        let arn = msg.execution.arn();
        let writes = EventWrites {
            execution: derive_execution_row(
                msg,
                &arn,
                event_time,
                collection_ref,
                provider_ref,
                parent_ref,
                async_operation_ref,
            ),
            granules: derive_granule_rows(msg, &arn, event_time, collection_ref),
            pdr: derive_pdr_row(msg, &arn, event_time, collection_ref, provider_ref),
        };
        let execution = writes.execution.clone();
        let granules = writes.granules.clone();
        let pdr = writes.pdr.clone();

        self.relational.apply_event(writes).await?;

        self.mirror(
            EntityKind::Execution,
            &arn,
            IndexedDocument {
                status: msg.status,
                progress: None,
                execution: Some(arn.clone()),
                updated_at: event_time,
                body: execution_document(msg, &execution),
            },
        )
        .await?;

        for granule in &granules {
            self.mirror(
                EntityKind::Granule,
                &granule.granule_id,
                IndexedDocument {
                    status: granule.status,
                    progress: None,
                    execution: Some(arn.clone()),
                    updated_at: event_time,
                    body: granule_document(granule),
                },
            )
            .await?;
        }

        if let Some(pdr) = &pdr {
            self.mirror(
                EntityKind::Pdr,
                &pdr.name,
                IndexedDocument {
                    status: pdr.status,
                    progress: Some(pdr.progress),
                    execution: Some(arn.clone()),
                    updated_at: event_time,
                    body: pdr_document(pdr),
                },
            )
            .await?;
        }

        Ok(())
    }

    /// Conditionally write one index document, guarded by the conflict rule.
    async fn mirror(
        &self,
        kind: EntityKind,
        id: &str,
        incoming: IndexedDocument,
    ) -> Result<(), StoreError> {
        let existing = self.index.get(kind, id).await?;
        let existing_snapshot = existing.as_ref().map(IndexedDocument::snapshot);

        match resolve_upsert(existing_snapshot.as_ref(), &incoming.snapshot()) {
            WriteDecision::Apply => self.index.put(kind, id, incoming).await,
            WriteDecision::Reject => {
                tracing::debug!(
                    kind = kind.as_str(),
                    id = %id,
                    status = %incoming.status,
                    "Stale update rejected by conflict rule"
                );
                Ok(())
            }
        }
    }
}

fn derive_execution_row(
    msg: &WorkflowMessage,
    arn: &str,
    event_time: DateTime<Utc>,
    collection_ref: Option<i64>,
    provider_ref: Option<i64>,
    parent_ref: Option<i64>,
    async_operation_ref: Option<i64>,
) -> ExecutionRow {
    // running events carry the initial payload, terminal events the final one
    let (original_payload, final_payload) = if msg.status.is_terminal() {
        (None, msg.payload.clone())
    } else {
        (msg.payload.clone(), None)
    };

    ExecutionRow {
        arn: arn.to_string(),
        name: msg.execution.name.clone(),
        status: msg.status,
        collection_ref,
        provider_ref,
        parent_ref,
        async_operation_ref,
        original_payload,
        final_payload,
        created_at: msg.execution.start_time.unwrap_or(event_time),
        updated_at: event_time,
    }
}

fn derive_granule_rows(
    msg: &WorkflowMessage,
    arn: &str,
    event_time: DateTime<Utc>,
    collection_ref: Option<i64>,
) -> Vec<GranuleRow> {
    msg.granules
        .iter()
        .filter_map(|g| {
            let granule_id = g.granule_id.clone()?;
            Some(GranuleRow {
                granule_id,
                status: g.status.unwrap_or(msg.status),
                collection_ref,
                execution_arn: arn.to_string(),
                files: g.files.clone(),
                created_at: event_time,
                updated_at: event_time,
            })
        })
        .collect()
}

fn derive_pdr_row(
    msg: &WorkflowMessage,
    arn: &str,
    event_time: DateTime<Utc>,
    collection_ref: Option<i64>,
    provider_ref: Option<i64>,
) -> Option<PdrRow> {
    let pdr = msg.pdr.as_ref()?;
    Some(PdrRow {
        name: pdr.name.clone(),
        status: msg.status,
        collection_ref,
        provider_ref,
        execution_arn: arn.to_string(),
        stats: pdr.stats,
        progress: pdr.progress,
        created_at: event_time,
        updated_at: event_time,
    })
}

fn execution_document(msg: &WorkflowMessage, row: &ExecutionRow) -> serde_json::Value {
    let mut body = serde_json::Map::new();
    body.insert("arn".to_string(), row.arn.clone().into());
    body.insert("name".to_string(), row.name.clone().into());
    body.insert("status".to_string(), row.status.as_str().into());
    if let Some(collection_id) = msg.collection_id() {
        body.insert("collectionId".to_string(), collection_id.into());
    }
    if let Some(payload) = &row.original_payload {
        body.insert("originalPayload".to_string(), payload.clone());
    }
    if let Some(payload) = &row.final_payload {
        body.insert("finalPayload".to_string(), payload.clone());
    }
    serde_json::Value::Object(body)
}

fn granule_document(granule: &GranuleRow) -> serde_json::Value {
    serde_json::json!({
        "granuleId": granule.granule_id,
        "status": granule.status.as_str(),
        "execution": granule.execution_arn,
        "files": granule.files,
    })
}

fn pdr_document(pdr: &PdrRow) -> serde_json::Value {
    serde_json::json!({
        "pdrName": pdr.name,
        "status": pdr.status.as_str(),
        "execution": pdr.execution_arn,
        "stats": {
            "completed": pdr.stats.completed,
            "failed": pdr.stats.failed,
            "total": pdr.stats.total,
        },
        "progress": pdr.progress,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryRelationalStore, MemorySearchIndex};
    use chrono::TimeZone;
    use serde_json::json;
    use stratus_core::WorkflowStatus;

    fn coordinator() -> (
        WriteCoordinator,
        Arc<MemoryRelationalStore>,
        Arc<MemorySearchIndex>,
    ) {
        let relational = Arc::new(MemoryRelationalStore::new());
        let index = Arc::new(MemorySearchIndex::new());
        (
            WriteCoordinator::new(relational.clone(), index.clone()),
            relational,
            index,
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn event(name: &str, status: WorkflowStatus, secs: i64) -> WorkflowMessage {
        serde_json::from_value(json!({
            "execution": {"name": name, "stateMachine": "arn:states:ingest"},
            "status": status.as_str(),
            "time": at(secs),
            "collection": {"name": "MOD09GQ", "version": "006"},
            "granules": [{"granuleId": "G1", "status": status.as_str()}],
            "payload": {"step": secs}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_event_lands_in_both_stores() {
        let (coordinator, relational, index) = coordinator();
        coordinator
            .write_status_event(&event("e1", WorkflowStatus::Running, 0))
            .await
            .unwrap();

        let row = relational.execution("arn:states:ingest:e1").unwrap();
        assert_eq!(row.status, WorkflowStatus::Running);
        assert!(row.original_payload.is_some());
        assert!(row.final_payload.is_none());

        let doc = index
            .get(EntityKind::Execution, "arn:states:ingest:e1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.status, WorkflowStatus::Running);
        let granule = index.get(EntityKind::Granule, "G1").await.unwrap().unwrap();
        assert_eq!(granule.status, WorkflowStatus::Running);
    }

    #[tokio::test]
    async fn test_missing_lookups_do_not_fail_event() {
        let (coordinator, relational, _) = coordinator();
        let msg: WorkflowMessage = serde_json::from_value(json!({
            "execution": {
                "name": "e1",
                "stateMachine": "sm",
                "parentExecutionArn": "sm:unseen-parent",
                "asyncOperationId": "op-1"
            },
            "status": "running",
            "collection": {"name": "NOPE", "version": "001"},
            "provider": "NOPE"
        }))
        .unwrap();

        coordinator.write_status_event(&msg).await.unwrap();
        let row = relational.execution("sm:e1").unwrap();
        assert!(row.collection_ref.is_none());
        assert!(row.provider_ref.is_none());
        assert!(row.parent_ref.is_none());
        assert!(row.async_operation_ref.is_none());
    }

    #[tokio::test]
    async fn test_resolved_lookups_are_carried() {
        let (coordinator, relational, _) = coordinator();
        let collection = relational.seed_collection("MOD09GQ", "006");
        let provider = relational.seed_provider("PODAAC");

        coordinator
            .write_status_event(&serde_json::from_value::<WorkflowMessage>(json!({
                "execution": {"name": "e1", "stateMachine": "sm"},
                "status": "running",
                "collection": {"name": "MOD09GQ", "version": "006"},
                "provider": "PODAAC"
            })).unwrap())
            .await
            .unwrap();

        let row = relational.execution("sm:e1").unwrap();
        assert_eq!(row.collection_ref, Some(collection));
        assert_eq!(row.provider_ref, Some(provider));
    }

    #[tokio::test]
    async fn test_write_failure_propagates() {
        let (coordinator, relational, _) = coordinator();
        relational.fail_writes(true);
        let err = coordinator
            .write_status_event(&event("e1", WorkflowStatus::Running, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Relational(_)));
    }

    #[tokio::test]
    async fn test_out_of_order_terminal_wins() {
        let (coordinator, _, index) = coordinator();
        // newer running event delivered before the older terminal one
        coordinator
            .write_status_event(&event("e1", WorkflowStatus::Running, 10))
            .await
            .unwrap();
        coordinator
            .write_status_event(&event("e1", WorkflowStatus::Completed, 0))
            .await
            .unwrap();

        let doc = index
            .get(EntityKind::Execution, "arn:states:ingest:e1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.status, WorkflowStatus::Completed);

        // and the stale running event cannot claw it back
        coordinator
            .write_status_event(&event("e1", WorkflowStatus::Running, 10))
            .await
            .unwrap();
        let doc = index
            .get(EntityKind::Execution, "arn:states:ingest:e1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(doc.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let (coordinator, relational, index) = coordinator();
        let msg = event("e1", WorkflowStatus::Completed, 5);

        coordinator.write_status_event(&msg).await.unwrap();
        let row_once = relational.execution("arn:states:ingest:e1").unwrap();
        let doc_once = index
            .get(EntityKind::Execution, "arn:states:ingest:e1")
            .await
            .unwrap();

        coordinator.write_status_event(&msg).await.unwrap();
        let row_twice = relational.execution("arn:states:ingest:e1").unwrap();
        let doc_twice = index
            .get(EntityKind::Execution, "arn:states:ingest:e1")
            .await
            .unwrap();

        assert_eq!(row_once, row_twice);
        assert_eq!(doc_once, doc_twice);
    }

    #[tokio::test]
    async fn test_granule_terminal_state_retained() {
        let (coordinator, _, index) = coordinator();
        let completed: WorkflowMessage = serde_json::from_value(json!({
            "execution": {"name": "e1", "stateMachine": "sm"},
            "status": "completed",
            "time": at(0),
            "granules": [{"granuleId": "G1", "status": "completed"}]
        }))
        .unwrap();
        let stale_running: WorkflowMessage = serde_json::from_value(json!({
            "execution": {"name": "e1", "stateMachine": "sm"},
            "status": "running",
            "time": at(10),
            "granules": [{"granuleId": "G1", "status": "running"}]
        }))
        .unwrap();

        coordinator.write_status_event(&completed).await.unwrap();
        coordinator.write_status_event(&stale_running).await.unwrap();

        let doc = index.get(EntityKind::Granule, "G1").await.unwrap().unwrap();
        assert_eq!(doc.status, WorkflowStatus::Completed);
    }

    #[tokio::test]
    async fn test_pdr_progress_converges_out_of_order() {
        let (coordinator, _, index) = coordinator();
        let pdr_event = |progress: f64, secs: i64| -> WorkflowMessage {
            serde_json::from_value(json!({
                "execution": {"name": "e1", "stateMachine": "sm"},
                "status": "running",
                "time": at(secs),
                "pdr": {"name": "P1.PDR", "stats": {"completed": 0, "failed": 0, "total": 10}, "progress": progress}
            }))
            .unwrap()
        };

        // delivered out of order: 70 then 40 then 90
        coordinator.write_status_event(&pdr_event(70.0, 7)).await.unwrap();
        coordinator.write_status_event(&pdr_event(40.0, 4)).await.unwrap();
        coordinator.write_status_event(&pdr_event(90.0, 9)).await.unwrap();

        let doc = index.get(EntityKind::Pdr, "P1.PDR").await.unwrap().unwrap();
        assert_eq!(doc.progress, Some(90.0));
    }
}
