//! Upsert conflict resolution for the search-index mirror.
//!
//! Events can arrive duplicated and out of order. The rule below decides,
//! from the stored snapshot and the incoming one alone, whether an update
//! may be applied. Store adapters only fetch-existing and conditionally
//! write; they never embed ordering logic of their own.

use crate::message::WorkflowStatus;
use chrono::{DateTime, Utc};

/// Outcome of conflict resolution for one entity update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteDecision {
    Apply,
    Reject,
}

/// The fields conflict resolution looks at, independent of entity kind.
#[derive(Debug, Clone, PartialEq)]
pub struct UpsertSnapshot {
    pub status: WorkflowStatus,
    /// Numeric progress where the entity tracks one (PDRs). Entities
    /// without numeric progress derive it from status.
    pub progress: Option<f64>,
    /// Execution the snapshot was produced by. A differing execution means
    /// the entity is being reprocessed and progress may legitimately reset.
    pub execution: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl UpsertSnapshot {
    /// Progress with the status-derived fallback: running counts as 0,
    /// terminal as 100.
    pub fn effective_progress(&self) -> f64 {
        self.progress.unwrap_or(if self.status.is_terminal() {
            100.0
        } else {
            0.0
        })
    }
}

/// Decide whether `incoming` may overwrite `existing`.
///
/// Apply when any of:
/// - there is no existing record;
/// - the existing record is non-terminal, the incoming status ranks at
///   least as high, and the incoming event does not report lower progress
///   for the same execution;
/// - the incoming event is strictly newer and does not report lower
///   progress for the same execution.
///
/// Everything else is a reject: a terminal record never regresses, and a
/// same-execution event with lower progress and an older-or-equal
/// timestamp is stale. Equal timestamps deliberately never satisfy the
/// strictly-newer arm.
pub fn resolve_upsert(
    existing: Option<&UpsertSnapshot>,
    incoming: &UpsertSnapshot,
) -> WriteDecision {
    let Some(existing) = existing else {
        return WriteDecision::Apply;
    };

    let same_execution = match (&existing.execution, &incoming.execution) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    let progress_ok =
        !same_execution || incoming.effective_progress() >= existing.effective_progress();

    if !existing.status.is_terminal() && incoming.status.rank() >= existing.status.rank() && progress_ok
    {
        return WriteDecision::Apply;
    }

    if incoming.updated_at > existing.updated_at && progress_ok {
        return WriteDecision::Apply;
    }

    WriteDecision::Reject
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn snapshot(
        status: WorkflowStatus,
        progress: Option<f64>,
        execution: &str,
        secs: i64,
    ) -> UpsertSnapshot {
        UpsertSnapshot {
            status,
            progress,
            execution: Some(execution.to_string()),
            updated_at: at(secs),
        }
    }

    #[test]
    fn test_no_existing_applies() {
        let incoming = snapshot(WorkflowStatus::Running, None, "e1", 0);
        assert_eq!(resolve_upsert(None, &incoming), WriteDecision::Apply);
    }

    #[test]
    fn test_terminal_never_regresses_either_order() {
        let completed = snapshot(WorkflowStatus::Completed, Some(100.0), "e1", 0);
        let stale_running = snapshot(WorkflowStatus::Running, Some(0.0), "e1", 10);

        // completed first: the newer-but-lower-progress running event is stale
        assert_eq!(
            resolve_upsert(Some(&completed), &stale_running),
            WriteDecision::Reject
        );
        // running first: the older terminal event still wins
        assert_eq!(
            resolve_upsert(Some(&stale_running), &completed),
            WriteDecision::Apply
        );
    }

    #[test]
    fn test_progress_monotonic_within_execution() {
        let p40 = snapshot(WorkflowStatus::Running, Some(40.0), "e1", 5);
        let p70_older = snapshot(WorkflowStatus::Running, Some(70.0), "e1", 2);
        let p20_newer = snapshot(WorkflowStatus::Running, Some(20.0), "e1", 9);

        // higher progress applies regardless of timestamp
        assert_eq!(resolve_upsert(Some(&p40), &p70_older), WriteDecision::Apply);
        // lower progress for the same execution never applies
        assert_eq!(resolve_upsert(Some(&p40), &p20_newer), WriteDecision::Reject);
        assert_eq!(resolve_upsert(Some(&p70_older), &p40), WriteDecision::Reject);
    }

    #[test]
    fn test_new_execution_may_reset_progress() {
        let done = snapshot(WorkflowStatus::Completed, Some(100.0), "e1", 0);
        let reprocess = snapshot(WorkflowStatus::Running, Some(0.0), "e2", 10);
        assert_eq!(resolve_upsert(Some(&done), &reprocess), WriteDecision::Apply);
    }

    #[test]
    fn test_newer_terminal_overwrites_terminal() {
        let completed = snapshot(WorkflowStatus::Completed, None, "e1", 0);
        let failed_later = snapshot(WorkflowStatus::Failed, None, "e1", 10);
        assert_eq!(
            resolve_upsert(Some(&completed), &failed_later),
            WriteDecision::Apply
        );
    }

    #[test]
    fn test_equal_timestamp_tie_break_rejects() {
        let completed = snapshot(WorkflowStatus::Completed, None, "e1", 0);
        let failed_same_time = snapshot(WorkflowStatus::Failed, None, "e1", 0);
        assert_eq!(
            resolve_upsert(Some(&completed), &failed_same_time),
            WriteDecision::Reject
        );
    }

    #[test]
    fn test_duplicate_delivery_is_idempotent() {
        let event = snapshot(WorkflowStatus::Running, Some(50.0), "e1", 5);
        // re-applying the same snapshot is allowed; the write is a no-op
        assert_eq!(resolve_upsert(Some(&event), &event), WriteDecision::Apply);
    }

    #[test]
    fn test_status_derived_progress() {
        let running = snapshot(WorkflowStatus::Running, None, "e1", 0);
        assert_eq!(running.effective_progress(), 0.0);
        let done = snapshot(WorkflowStatus::Completed, None, "e1", 0);
        assert_eq!(done.effective_progress(), 100.0);
    }
}
