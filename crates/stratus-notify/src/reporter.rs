//! Builds per-entity reports from a workflow message and fans them out.

use crate::channel::NotificationChannel;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use stratus_config::ChannelsConfig;
use stratus_core::{GranuleRef, PdrRef, WorkflowMessage};

/// Tally of one fan-out pass. Failures are counted, never propagated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishSummary {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Fans execution, granule and PDR reports out to their configured topics.
/// Topics left unconfigured disable that report kind.
pub struct Reporter {
    channel: Arc<dyn NotificationChannel>,
    execution_topic: Option<String>,
    granule_topic: Option<String>,
    pdr_topic: Option<String>,
}

impl Reporter {
    pub fn new(channel: Arc<dyn NotificationChannel>, channels: &ChannelsConfig) -> Self {
        Self {
            channel,
            execution_topic: channels.execution.clone(),
            granule_topic: channels.granule.clone(),
            pdr_topic: channels.pdr.clone(),
        }
    }

    /// Publish all reports derived from one written event.
    ///
    /// Channels are isolated from each other: a failing publish is logged
    /// and tallied, and the remaining reports still go out.
    pub async fn publish(&self, msg: &WorkflowMessage) -> PublishSummary {
        let mut summary = PublishSummary::default();

        if let Some(topic) = &self.execution_topic {
            self.send(topic, &execution_report(msg), &mut summary).await;
        }

        if let Some(topic) = &self.granule_topic {
            for granule in &msg.granules {
                if granule.granule_id.is_none() {
                    tracing::warn!(
                        execution = %msg.execution.arn(),
                        "Skipping granule report without granuleId"
                    );
                    summary.skipped += 1;
                    continue;
                }
                self.send(topic, &granule_report(msg, granule), &mut summary)
                    .await;
            }
        }

        if let Some(topic) = &self.pdr_topic {
            if let Some(pdr) = &msg.pdr {
                self.send(topic, &pdr_report(msg, pdr), &mut summary)
                    .await;
            }
        }

        summary
    }

    async fn send(&self, topic: &str, report: &Value, summary: &mut PublishSummary) {
        match self.channel.publish(topic, report).await {
            Ok(()) => summary.sent += 1,
            Err(err) => {
                tracing::warn!(topic, error = %err, "Report publish failed");
                summary.failed += 1;
            }
        }
    }
}

/// The whole message, JSON-serialized, with the derived status label
/// merged in and a timestamp backfilled for engines that omit one.
fn merged_message(msg: &WorkflowMessage) -> Value {
    let mut report = serde_json::to_value(msg).unwrap_or_default();
    if let Some(body) = report.as_object_mut() {
        body.insert("status".to_string(), msg.status.as_str().into());
        body.entry("time").or_insert_with(|| json!(Utc::now()));
    }
    report
}

fn execution_report(msg: &WorkflowMessage) -> Value {
    merged_message(msg)
}

/// Per-granule report: the merged message plus the one granule this report
/// is about, its status defaulted from the message.
fn granule_report(msg: &WorkflowMessage, granule: &GranuleRef) -> Value {
    let mut report = merged_message(msg);
    let mut record = serde_json::to_value(granule).unwrap_or_default();
    if let Some(fields) = record.as_object_mut() {
        fields
            .entry("status")
            .or_insert_with(|| msg.status.as_str().into());
    }
    if let Some(body) = report.as_object_mut() {
        body.insert("granule".to_string(), record);
    }
    report
}

fn pdr_report(msg: &WorkflowMessage, pdr: &PdrRef) -> Value {
    let mut report = merged_message(msg);
    if let Some(body) = report.as_object_mut() {
        body.insert(
            "pdr".to_string(),
            serde_json::to_value(pdr).unwrap_or_default(),
        );
    }
    report
}
