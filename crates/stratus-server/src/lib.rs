// Server mode - HTTP ingest surface over the dead-letter pipeline
//
// Wires the full pipeline behind an axum router:
// - normalize incoming queue records
// - fan reports out to notification channels
// - write each event through the dual-store coordinator
// - archive records whose write path failed
// - drain the archive back through the same write path on request
// - sweep expired execution payloads on a background interval

use anyhow::{Context, Result};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use stratus_archive::{Archiver, Replayer};
use stratus_config::RuntimeConfig;
use stratus_notify::Reporter;
use stratus_store::{RelationalStore, SearchIndex, WriteCoordinator};
use tokio::signal;
use tracing::{error, info, warn};

mod handlers;
mod init;
mod sink;

use handlers::{handle_events, handle_recover, health_check, ready_check};
pub use init::{build_state, init_tracing};
pub use sink::CoordinatorSink;

/// Application state shared across all requests.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<WriteCoordinator>,
    pub relational: Arc<dyn RelationalStore>,
    pub index: Arc<dyn SearchIndex>,
    pub archiver: Archiver,
    pub replayer: Replayer,
    pub reporter: Arc<Reporter>,
    pub operator: opendal::Operator,
    pub max_payload_bytes: usize,
}

impl AppState {
    /// The replay sink feeding drained records back through the normal
    /// ingest path.
    pub fn replay_sink(&self) -> CoordinatorSink {
        CoordinatorSink::new(self.coordinator.clone(), self.reporter.clone())
    }
}

/// Error type that implements IntoResponse
pub(crate) struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Request error: {:?}", self.error);
        (
            self.status,
            Json(json!({
                "error": self.error.to_string(),
            })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into(),
        }
    }
}

impl AppError {
    pub fn with_status(status: StatusCode, error: anyhow::Error) -> Self {
        Self { status, error }
    }
}

/// Build the router over prepared application state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/events", post(handle_events))
        .route("/v1/dead-letter/recover", post(handle_recover))
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

/// Graceful shutdown handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}

/// Scheduled payload sweeps, skipped entirely when no interval is set.
fn spawn_sweeper_loop(state: &AppState, config: &RuntimeConfig) {
    let Some(interval) = config.sweeper.interval() else {
        info!("Background payload sweeper disabled (interval_secs = 0)");
        return;
    };

    let relational = state.relational.clone();
    let index = state.index.clone();
    let sweeper_config = config.sweeper.clone();
    info!(interval_secs = interval.as_secs(), "Background payload sweeper enabled");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // the immediate first tick would sweep at startup; skip it
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match stratus_store::sweep_expired_payloads(
                relational.as_ref(),
                index.as_ref(),
                &sweeper_config,
                chrono::Utc::now(),
            )
            .await
            {
                Ok(summary) => {
                    info!(
                        scanned = summary.scanned,
                        cleared = summary.cleared,
                        index_expired = summary.index_expired,
                        "Scheduled payload sweep finished"
                    );
                }
                Err(e) => warn!(error = %e, "Scheduled payload sweep failed"),
            }
        }
    });
}

/// Entry point for server mode
pub async fn run_with_config(config: RuntimeConfig) -> Result<()> {
    config.validate()?;
    let addr = config.server.listen_addr.clone();

    let state = build_state(&config)?;
    spawn_sweeper_loop(&state, &config);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context(format!("Failed to bind to {}", addr))?;

    info!("Workflow event endpoint listening on http://{}", addr);
    info!("Routes:");
    info!("  POST http://{}/v1/events - workflow status ingestion", addr);
    info!("  POST http://{}/v1/dead-letter/recover - archive drain", addr);
    info!("  GET  http://{}/health  - Health check", addr);
    info!("  GET  http://{}/ready   - Readiness check", addr);
    info!("Press Ctrl+C or send SIGTERM to stop");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");

    Ok(())
}
