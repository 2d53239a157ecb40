//! Replay sink: drained archive records re-enter the normal ingest path.

use async_trait::async_trait;
use std::sync::Arc;
use stratus_archive::ReplaySink;
use stratus_core::WorkflowMessage;
use stratus_notify::Reporter;
use stratus_store::WriteCoordinator;

/// Feeds replayed messages through the same fan-out and coordinator write
/// as first-time delivery. Only the coordinator outcome decides whether a
/// replay succeeded; report publication stays best-effort.
pub struct CoordinatorSink {
    coordinator: Arc<WriteCoordinator>,
    reporter: Arc<Reporter>,
}

impl CoordinatorSink {
    pub fn new(coordinator: Arc<WriteCoordinator>, reporter: Arc<Reporter>) -> Self {
        Self {
            coordinator,
            reporter,
        }
    }
}

#[async_trait]
impl ReplaySink for CoordinatorSink {
    async fn replay(&self, message: &WorkflowMessage) -> anyhow::Result<()> {
        self.reporter.publish(message).await;
        self.coordinator.write_status_event(message).await?;
        Ok(())
    }
}
