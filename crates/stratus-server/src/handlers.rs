// HTTP request handlers for server mode
//
// Implements workflow event ingestion, dead-letter recovery and health
// check endpoints.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use metrics::{counter, histogram};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{AppError, AppState};

/// Outcome of one record in an ingest batch.
enum RecordOutcome {
    Ingested { execution: String },
    Archived { key: String },
    Failed { reason: String },
}

impl RecordOutcome {
    fn to_json(&self) -> Value {
        match self {
            RecordOutcome::Ingested { execution } => {
                json!({"status": "ingested", "execution": execution})
            }
            RecordOutcome::Archived { key } => json!({"status": "archived", "key": key}),
            RecordOutcome::Failed { reason } => json!({"status": "failed", "error": reason}),
        }
    }
}

/// POST /v1/events - inbound batch of workflow queue records
pub(crate) async fn handle_events(
    State(state): State<AppState>,
    body: axum::body::Bytes,
) -> Result<Response, AppError> {
    let start = Instant::now();
    counter!("stratus.ingest.requests", 1);
    histogram!("stratus.ingest.bytes", body.len() as f64);

    let max_payload = state.max_payload_bytes;
    if body.len() > max_payload {
        counter!("stratus.ingest.rejected", 1);
        return Err(AppError::with_status(
            StatusCode::PAYLOAD_TOO_LARGE,
            anyhow::anyhow!("payload {} exceeds limit {}", body.len(), max_payload),
        ));
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|e| {
        counter!("stratus.ingest.rejected", 1);
        AppError::with_status(
            StatusCode::BAD_REQUEST,
            anyhow::Error::from(e).context("Request body is not valid JSON"),
        )
    })?;

    let records = extract_records(payload).ok_or_else(|| {
        counter!("stratus.ingest.rejected", 1);
        AppError::with_status(
            StatusCode::BAD_REQUEST,
            anyhow::anyhow!("expected a JSON array of records or {{\"records\": [...]}}"),
        )
    })?;

    debug!(records = records.len(), "Received workflow event batch");
    counter!("stratus.ingest.records", records.len() as u64);

    // settle-all: every record runs to its own outcome, a poison record
    // never short-circuits its siblings
    let outcomes = futures::future::join_all(
        records.iter().map(|record| process_record(&state, record)),
    )
    .await;

    let mut ingested = 0usize;
    let mut archived = 0usize;
    let mut failed = 0usize;
    for outcome in &outcomes {
        match outcome {
            RecordOutcome::Ingested { .. } => ingested += 1,
            RecordOutcome::Archived { .. } => archived += 1,
            RecordOutcome::Failed { .. } => failed += 1,
        }
    }
    counter!("stratus.ingest.archived", archived as u64);
    if failed > 0 {
        counter!("stratus.ingest.failed", failed as u64);
    }

    histogram!(
        "stratus.ingest.latency_ms",
        start.elapsed().as_secs_f64() * 1000.0
    );
    info!(
        records = records.len(),
        ingested, archived, failed, "Processed workflow event batch"
    );

    let response = Json(json!({
        "status": "ok",
        "ingested": ingested,
        "archived": archived,
        "failed": failed,
        "results": outcomes.iter().map(RecordOutcome::to_json).collect::<Vec<_>>(),
    }));

    Ok((StatusCode::OK, response).into_response())
}

fn extract_records(payload: Value) -> Option<Vec<Value>> {
    match payload {
        Value::Array(records) => Some(records),
        Value::Object(mut obj) => match obj.remove("records") {
            Some(Value::Array(records)) => Some(records),
            _ => None,
        },
        _ => None,
    }
}

async fn process_record(state: &AppState, record: &Value) -> RecordOutcome {
    let normalized = stratus_core::unwrap_envelope(record);

    let Some(message) = normalized.message else {
        warn!(
            error = normalized.error.as_deref().unwrap_or("unparseable record"),
            "Record did not normalize to a workflow message, archiving"
        );
        return archive_record(state, record).await;
    };

    // reports go out regardless of the write outcome
    state.reporter.publish(&message).await;

    match state.coordinator.write_status_event(&message).await {
        Ok(()) => RecordOutcome::Ingested {
            execution: message.execution.arn(),
        },
        Err(e) => {
            warn!(
                execution = %message.execution.arn(),
                error = %e,
                "Store write failed, archiving record"
            );
            archive_record(state, record).await
        }
    }
}

async fn archive_record(state: &AppState, record: &Value) -> RecordOutcome {
    match state.archiver.archive_one(record).await {
        Ok(archived) => RecordOutcome::Archived { key: archived.key },
        Err(e) => {
            warn!(error = %e, "Dead-letter archive write failed");
            RecordOutcome::Failed {
                reason: e.to_string(),
            }
        }
    }
}

/// POST /v1/dead-letter/recover - fire-and-forget archive drain
pub(crate) async fn handle_recover(State(state): State<AppState>) -> impl IntoResponse {
    counter!("stratus.replay.requests", 1);
    let recovery_id = Uuid::new_v4().to_string();

    let replayer = state.replayer.clone();
    let sink = state.replay_sink();
    let task_id = recovery_id.clone();
    tokio::spawn(async move {
        info!(recovery_id = %task_id, "Dead-letter archive drain started");
        match replayer.drain(&sink).await {
            Ok(summary) => {
                counter!("stratus.replay.replayed", summary.replayed as u64);
                counter!("stratus.replay.quarantined", summary.quarantined as u64);
                info!(
                    recovery_id = %task_id,
                    scanned = summary.scanned,
                    replayed = summary.replayed,
                    failed = summary.failed,
                    quarantined = summary.quarantined,
                    "Dead-letter archive drain finished"
                );
            }
            Err(e) => {
                warn!(recovery_id = %task_id, error = %e, "Dead-letter archive drain failed");
            }
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "accepted", "recoveryId": recovery_id})),
    )
}

/// GET /health - Basic health check
pub(crate) async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "healthy"})))
}

/// GET /ready - Readiness check (includes storage connectivity)
pub(crate) async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.operator.list("").await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({"status": "ready", "storage": "connected"})),
        ),
        Err(e) => {
            warn!("Storage readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(
                    json!({"status": "not ready", "storage": "disconnected", "error": e.to_string()}),
                ),
            )
        }
    }
}
