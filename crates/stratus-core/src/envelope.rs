//! Recursive unwrapping of workflow messages from delivery envelopes.
//!
//! An inbound notification may arrive bare, wrapped in a queue record
//! (`body`/`Body` string field), wrapped in an event-bus event
//! (`detail.executionArn`), wrapped in a previously archived dead-letter
//! record, or any nesting of those. The normalizer test-and-unwraps one
//! recognized layer at a time until it finds a workflow message, and never
//! fails hard: an unrecognized innermost shape yields a `NormalizedMessage`
//! with `message: None` so the caller can still archive the original value.

use crate::message::{WorkflowMessage, WorkflowStatus};
use serde_json::Value;

/// Nesting budget. Real envelopes are one or two layers deep; anything past
/// this is treated as malformed rather than recursed into.
pub const MAX_ENVELOPE_DEPTH: usize = 8;

/// Result of normalizing a raw notification.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    /// The recovered workflow message, or `None` when no recognized shape
    /// was found. Callers must treat `None` as "unwrap failed" and still
    /// archive `raw`.
    pub message: Option<WorkflowMessage>,
    /// The original value, untouched.
    pub raw: Value,
    /// Outermost captured error annotation: either the `error` field of a
    /// dead-letter layer, or a local parse annotation from the fallback.
    pub error: Option<String>,
}

/// Unwrap a raw notification down to its innermost workflow message.
pub fn unwrap_envelope(raw: &Value) -> NormalizedMessage {
    let mut current = raw.clone();
    let mut captured_error: Option<String> = None;

    for _ in 0..MAX_ENVELOPE_DEPTH {
        // A dead-letter layer annotates the wrapped value with the error that
        // sent it to the archive. Only the outermost annotation is kept.
        if captured_error.is_none() {
            if let Some(err) = current.get("error").and_then(Value::as_str) {
                captured_error = Some(err.to_string());
            }
        }

        // Queue record: body is a JSON string holding the next layer.
        if let Some(body) = queue_record_body(&current) {
            match serde_json::from_str::<Value>(body) {
                Ok(inner) => {
                    current = inner;
                    continue;
                }
                Err(e) => {
                    return NormalizedMessage {
                        message: None,
                        raw: raw.clone(),
                        error: Some(format!("queue record body is not valid JSON: {}", e)),
                    }
                }
            }
        }

        // Dead-letter record: the wrapped value is carried as-is under `body`.
        if current.get("error").is_some() {
            if let Some(body) = current.get("body").filter(|b| !b.is_string()) {
                current = body.clone();
                continue;
            }
        }

        break;
    }

    // Event-bus event: the workflow message is embedded in the detail payload.
    if let Some(detail) = current.get("detail") {
        if detail.get("executionArn").is_some() {
            return from_event_bus_detail(detail, raw, captured_error);
        }
    }

    match serde_json::from_value::<WorkflowMessage>(current) {
        Ok(message) => NormalizedMessage {
            message: Some(message),
            raw: raw.clone(),
            error: captured_error,
        },
        Err(e) => NormalizedMessage {
            message: None,
            raw: raw.clone(),
            error: captured_error.or_else(|| Some(format!("unrecognized message shape: {}", e))),
        },
    }
}

/// Body of a queue-record layer, accepting both `body` and `Body` spellings.
fn queue_record_body(value: &Value) -> Option<&str> {
    value
        .get("body")
        .or_else(|| value.get("Body"))
        .and_then(Value::as_str)
}

/// Derive a workflow message from an event-bus execution event. The message
/// itself rides in `detail.output` (terminal events) or `detail.input`, as a
/// JSON string; the engine's status label overrides whatever the embedded
/// message claims.
fn from_event_bus_detail(
    detail: &Value,
    raw: &Value,
    captured_error: Option<String>,
) -> NormalizedMessage {
    let embedded = detail
        .get("output")
        .or_else(|| detail.get("input"))
        .and_then(Value::as_str);

    let Some(embedded) = embedded else {
        return NormalizedMessage {
            message: None,
            raw: raw.clone(),
            error: captured_error
                .or_else(|| Some("event-bus event carries no output or input payload".to_string())),
        };
    };

    match serde_json::from_str::<WorkflowMessage>(embedded) {
        Ok(mut message) => {
            if let Some(status) = detail
                .get("status")
                .and_then(Value::as_str)
                .and_then(engine_status)
            {
                message.status = status;
            }
            NormalizedMessage {
                message: Some(message),
                raw: raw.clone(),
                error: captured_error,
            }
        }
        Err(e) => NormalizedMessage {
            message: None,
            raw: raw.clone(),
            error: captured_error
                .or_else(|| Some(format!("event-bus payload is not a workflow message: {}", e))),
        },
    }
}

/// Map the orchestration engine's status labels onto workflow statuses.
fn engine_status(label: &str) -> Option<WorkflowStatus> {
    match label {
        "RUNNING" => Some(WorkflowStatus::Running),
        "SUCCEEDED" => Some(WorkflowStatus::Completed),
        "FAILED" | "TIMED_OUT" | "ABORTED" => Some(WorkflowStatus::Failed),
        _ => None,
    }
}
