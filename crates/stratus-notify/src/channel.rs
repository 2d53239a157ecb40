//! Notification channel seam and the built-in implementations.

use crate::error::NotifyError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;

/// One outbound message bus. Production deployments bind this to an SNS
/// topic or equivalent; tests use [`MemoryChannel`].
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn publish(&self, topic: &str, report: &Value) -> Result<(), NotifyError>;
}

/// Channel that only writes reports to the log. The default when no real
/// bus is configured.
#[derive(Debug, Default)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn publish(&self, topic: &str, report: &Value) -> Result<(), NotifyError> {
        tracing::info!(topic, %report, "Report published");
        Ok(())
    }
}

/// In-memory channel recording every published report, keyed by topic.
#[derive(Debug, Default)]
pub struct MemoryChannel {
    published: Mutex<HashMap<String, Vec<Value>>>,
    fail: Mutex<bool>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_publishes(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn published(&self, topic: &str) -> Vec<Value> {
        self.published
            .lock()
            .get(topic)
            .cloned()
            .unwrap_or_default()
    }

    pub fn total(&self) -> usize {
        self.published.lock().values().map(Vec::len).sum()
    }
}

#[async_trait]
impl NotificationChannel for MemoryChannel {
    async fn publish(&self, topic: &str, report: &Value) -> Result<(), NotifyError> {
        if *self.fail.lock() {
            return Err(NotifyError::Publish {
                topic: topic.to_string(),
                reason: "injected publish failure".to_string(),
            });
        }
        self.published
            .lock()
            .entry(topic.to_string())
            .or_default()
            .push(report.clone());
        Ok(())
    }
}
