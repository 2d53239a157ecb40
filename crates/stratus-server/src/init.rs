// Initialization utilities for server mode
//
// Tracing setup and wiring of the pipeline components into AppState.

use crate::AppState;
use anyhow::Result;
use std::sync::Arc;
use stratus_archive::{build_operator, Archiver, Replayer};
use stratus_config::{LogFormat, RuntimeConfig};
use stratus_notify::{LogChannel, Reporter};
use stratus_store::{MemoryRelationalStore, MemorySearchIndex, WriteCoordinator};
use tracing::info;

/// Initialize tracing/logging from RuntimeConfig. `RUST_LOG` wins over the
/// configured level when set.
pub fn init_tracing(config: &RuntimeConfig) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.server.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.server.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

/// Wire all pipeline components from RuntimeConfig.
///
/// The relational store and search index are the in-memory implementations;
/// production deployments swap in real adapters behind the same traits.
pub fn build_state(config: &RuntimeConfig) -> Result<AppState> {
    info!(
        backend = %config.storage.backend,
        stack = %config.stack,
        "Initializing dead-letter archive storage"
    );
    let operator = build_operator(&config.storage)?;

    let relational = Arc::new(MemoryRelationalStore::new());
    let index = Arc::new(MemorySearchIndex::new());
    let coordinator = Arc::new(WriteCoordinator::new(relational.clone(), index.clone()));

    let reporter = Arc::new(Reporter::new(Arc::new(LogChannel), &config.channels));

    let archiver = Archiver::new(operator.clone(), &config.stack);
    let replayer = Replayer::new(
        operator.clone(),
        &config.stack,
        config.replay.batch_size,
        config.replay.max_replay_attempts,
    );

    Ok(AppState {
        coordinator,
        relational,
        index,
        archiver,
        replayer,
        reporter,
        operator,
        max_payload_bytes: config.server.max_payload_bytes,
    })
}
