//! Payload retention sweeper.
//!
//! Execution payloads are bulky and only useful for a while: terminal
//! executions keep theirs for a short window, stuck non-terminal ones for a
//! longer one. Each sweep nulls expired payload columns in the relational
//! store row by row (bounded concurrency) and strips the matching fields
//! from the search index in one bulk operation.

use crate::error::StoreError;
use crate::records::ExecutionPayloadRow;
use crate::traits::{RelationalStore, SearchIndex};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use stratus_config::SweeperConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    /// Relational rows returned by the scan.
    pub scanned: usize,
    /// Relational rows whose payloads were cleared.
    pub cleared: usize,
    /// Index documents touched by the bulk expiry.
    pub index_expired: u64,
}

/// Clear expired execution payloads from both stores.
///
/// A no-op when both retention thresholds are disabled. Row-update failures
/// fail the whole invocation with [`StoreError::Sweep`]; sweeps are
/// idempotent, so the caller simply retries next interval.
pub async fn sweep_expired_payloads(
    relational: &dyn RelationalStore,
    index: &dyn SearchIndex,
    config: &SweeperConfig,
    now: DateTime<Utc>,
) -> Result<SweepSummary, StoreError> {
    let complete_cutoff = (!config.complete_timeout_disable)
        .then(|| now - Duration::days(i64::from(config.complete_timeout_days)));
    let non_complete_cutoff = (!config.non_complete_timeout_disable)
        .then(|| now - Duration::days(i64::from(config.non_complete_timeout_days)));

    // the scan cutoff is the more permissive of the two; per-row checks
    // below apply the status-specific threshold
    let scan_cutoff = match (complete_cutoff, non_complete_cutoff) {
        (Some(a), Some(b)) => a.max(b),
        (Some(a), None) => a,
        (None, Some(b)) => b,
        (None, None) => {
            tracing::debug!("Both retention thresholds disabled, skipping sweep");
            return Ok(SweepSummary::default());
        }
    };

    let rows = relational
        .select_expired_payloads(scan_cutoff, config.update_limit)
        .await?;
    let scanned = rows.len();

    let qualifying: Vec<ExecutionPayloadRow> = rows
        .into_iter()
        .filter(|row| {
            // terminal rows (completed and failed alike) expire on the
            // short threshold, still-running rows on the long one
            let cutoff = if row.status.is_terminal() {
                complete_cutoff
            } else {
                non_complete_cutoff
            };
            cutoff.is_some_and(|c| row.updated_at < c)
        })
        .collect();

    let attempted = qualifying.len();
    let results: Vec<(String, Result<(), StoreError>)> = stream::iter(qualifying)
        .map(|row| async move {
            let result = relational.clear_payloads(&row.arn).await;
            (row.arn, result)
        })
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;

    let mut cleared = 0usize;
    let mut first_error = None;
    let mut failed = 0usize;
    for (arn, result) in results {
        match result {
            Ok(()) => cleared += 1,
            Err(err) => {
                tracing::warn!(arn = %arn, error = %err, "Payload clear failed");
                failed += 1;
                first_error.get_or_insert_with(|| err.to_string());
            }
        }
    }
    if let Some(first) = first_error {
        return Err(StoreError::Sweep {
            failed,
            attempted,
            first,
        });
    }

    let index_expired = index
        .expire_payloads(complete_cutoff, non_complete_cutoff)
        .await?;

    tracing::info!(scanned, cleared, index_expired, "Payload sweep complete");
    Ok(SweepSummary {
        scanned,
        cleared,
        index_expired,
    })
}
