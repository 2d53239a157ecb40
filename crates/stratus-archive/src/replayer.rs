//! Dead-letter replayer: drain the archive back through the normal write path.

use crate::error::Result;
use crate::paths;
use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use stratus_core::{unwrap_envelope, DeadLetterRecord, WorkflowMessage};

/// The write path replayed messages are fed into. Implemented by the
/// serving layer on top of the dual-store write coordinator so this crate
/// stays independent of the store crates.
#[async_trait]
pub trait ReplaySink: Send + Sync {
    async fn replay(&self, message: &WorkflowMessage) -> anyhow::Result<()>;
}

/// Counts for one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub scanned: usize,
    pub replayed: usize,
    pub failed: usize,
    pub quarantined: usize,
}

enum ItemOutcome {
    Replayed,
    Failed,
    Quarantined,
}

/// Drains the archive in listing pages, replaying each entry independently.
#[derive(Clone)]
pub struct Replayer {
    operator: opendal::Operator,
    stack: String,
    batch_size: usize,
    max_replay_attempts: u32,
}

impl Replayer {
    pub fn new(
        operator: opendal::Operator,
        stack: impl Into<String>,
        batch_size: usize,
        max_replay_attempts: u32,
    ) -> Self {
        Self {
            operator,
            stack: stack.into(),
            batch_size,
            max_replay_attempts,
        }
    }

    /// Scan the whole active archive and re-attempt every entry.
    ///
    /// Entries are listed through a continuation cursor in pages of
    /// `batch_size`; each page settles all its items before the next page
    /// is fetched. An entry is deleted from the archive if and only if its
    /// write path completed without error. A failure for one entry never
    /// stops the rest of the batch or subsequent batches.
    pub async fn drain(&self, sink: &dyn ReplaySink) -> Result<DrainSummary> {
        let prefix = paths::archive_prefix(&self.stack);
        let mut summary = DrainSummary::default();
        let mut lister = self.operator.lister(&prefix).await?;

        loop {
            let mut page = Vec::with_capacity(self.batch_size);
            while page.len() < self.batch_size {
                match lister.try_next().await? {
                    Some(entry) if entry.metadata().is_file() => {
                        page.push(entry.path().to_string());
                    }
                    Some(_) => continue,
                    None => break,
                }
            }
            if page.is_empty() {
                break;
            }

            let exhausted = page.len() < self.batch_size;
            summary.scanned += page.len();

            let outcomes =
                futures::future::join_all(page.iter().map(|path| self.replay_one(path, sink)))
                    .await;
            for outcome in outcomes {
                match outcome {
                    ItemOutcome::Replayed => summary.replayed += 1,
                    ItemOutcome::Failed => summary.failed += 1,
                    ItemOutcome::Quarantined => summary.quarantined += 1,
                }
            }

            if exhausted {
                break;
            }
        }

        tracing::info!(
            scanned = summary.scanned,
            replayed = summary.replayed,
            failed = summary.failed,
            quarantined = summary.quarantined,
            "Dead-letter archive drain finished"
        );
        Ok(summary)
    }

    async fn replay_one(&self, path: &str, sink: &dyn ReplaySink) -> ItemOutcome {
        let bytes = match self.operator.read(path).await {
            Ok(buffer) => buffer.to_vec(),
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Could not fetch archived record");
                return ItemOutcome::Failed;
            }
        };

        let record: DeadLetterRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                // Retrying a parse failure can never succeed; quarantine now.
                tracing::warn!(path = %path, error = %e, "Archived record is not valid JSON");
                return self.quarantine_bytes(path, bytes, None).await;
            }
        };

        let normalized = unwrap_envelope(&record.body);
        let Some(message) = normalized.message else {
            tracing::warn!(path = %path, "Archived body holds no recoverable workflow message");
            return self.quarantine(path, &record).await;
        };

        match sink.replay(&message).await {
            Ok(()) => match self.operator.delete(path).await {
                Ok(()) => {
                    tracing::debug!(path = %path, "Replayed and removed archived record");
                    ItemOutcome::Replayed
                }
                Err(e) => {
                    // The write went through; the leftover object will be
                    // re-replayed idempotently on the next drain.
                    tracing::warn!(path = %path, error = %e, "Replayed but could not delete");
                    ItemOutcome::Failed
                }
            },
            Err(e) => {
                let mut record = record;
                record.replay_attempts += 1;
                tracing::warn!(
                    path = %path,
                    attempts = record.replay_attempts,
                    error = %e,
                    "Replay attempt failed"
                );

                if record.replay_attempts >= self.max_replay_attempts {
                    return self.quarantine(path, &record).await;
                }

                match serde_json::to_vec(&record) {
                    Ok(bytes) => {
                        if let Err(e) = self.operator.write(path, bytes).await {
                            tracing::warn!(path = %path, error = %e, "Could not persist attempt count");
                        }
                    }
                    Err(e) => {
                        tracing::warn!(path = %path, error = %e, "Could not serialize attempt count");
                    }
                }
                ItemOutcome::Failed
            }
        }
    }

    /// Relocate a record to the dated failed partition.
    async fn quarantine(&self, path: &str, record: &DeadLetterRecord) -> ItemOutcome {
        let bytes = match serde_json::to_vec(record) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Could not serialize record for quarantine");
                return ItemOutcome::Failed;
            }
        };
        self.quarantine_bytes(path, bytes, record.execution_arn.as_deref())
            .await
    }

    async fn quarantine_bytes(
        &self,
        path: &str,
        bytes: Vec<u8>,
        execution_arn: Option<&str>,
    ) -> ItemOutcome {
        let failed_key = paths::failed_key(&self.stack, Utc::now().date_naive(), execution_arn);

        if let Err(e) = self.operator.write(&failed_key, bytes).await {
            tracing::warn!(path = %path, error = %e, "Could not write quarantine copy");
            return ItemOutcome::Failed;
        }
        if let Err(e) = self.operator.delete(path).await {
            tracing::warn!(path = %path, error = %e, "Quarantined but could not delete original");
            return ItemOutcome::Failed;
        }

        tracing::warn!(from = %path, to = %failed_key, "Record moved to failed partition");
        ItemOutcome::Quarantined
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archiver::Archiver;
    use parking_lot::Mutex;
    use serde_json::json;

    struct RecordingSink {
        replayed: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingSink {
        fn ok() -> Self {
            Self {
                replayed: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                replayed: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl ReplaySink for RecordingSink {
        async fn replay(&self, message: &WorkflowMessage) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("relational write failed");
            }
            self.replayed.lock().push(message.execution.name.clone());
            Ok(())
        }
    }

    fn setup() -> (Archiver, Replayer, opendal::Operator) {
        let op = opendal::Operator::new(opendal::services::Memory::default())
            .unwrap()
            .finish();
        (
            Archiver::new(op.clone(), "test-stack"),
            Replayer::new(op.clone(), "test-stack", 2, 3),
            op,
        )
    }

    fn message(name: &str) -> serde_json::Value {
        json!({
            "execution": {"name": name, "stateMachine": "arn:states:ingest"},
            "status": "completed"
        })
    }

    async fn active_count(op: &opendal::Operator) -> usize {
        op.list("test-stack/dead-letter-archive/sqs/")
            .await
            .unwrap()
            .iter()
            .filter(|e| e.metadata().is_file())
            .count()
    }

    async fn failed_count(op: &opendal::Operator) -> usize {
        op.list_with("test-stack/dead-letter-archive/failed-sqs/")
            .recursive(true)
            .await
            .unwrap()
            .iter()
            .filter(|e| e.metadata().is_file())
            .count()
    }

    #[tokio::test]
    async fn test_archive_round_trip() {
        let (archiver, replayer, op) = setup();
        archiver.archive_one(&message("exec-42")).await.unwrap();
        assert_eq!(active_count(&op).await, 1);

        let sink = RecordingSink::ok();
        let summary = replayer.drain(&sink).await.unwrap();

        assert_eq!(summary.scanned, 1);
        assert_eq!(summary.replayed, 1);
        assert_eq!(active_count(&op).await, 0);
        assert_eq!(*sink.replayed.lock(), vec!["exec-42".to_string()]);
    }

    #[tokio::test]
    async fn test_drain_pages_through_archive() {
        let (archiver, replayer, op) = setup();
        for i in 0..5 {
            archiver
                .archive_one(&message(&format!("exec-{}", i)))
                .await
                .unwrap();
        }

        // batch_size is 2, so this needs three listing pages
        let sink = RecordingSink::ok();
        let summary = replayer.drain(&sink).await.unwrap();
        assert_eq!(summary.scanned, 5);
        assert_eq!(summary.replayed, 5);
        assert_eq!(active_count(&op).await, 0);
    }

    #[tokio::test]
    async fn test_failed_replay_leaves_record_and_counts_attempt() {
        let (archiver, replayer, op) = setup();
        let archived = archiver.archive_one(&message("exec-42")).await.unwrap();

        let summary = replayer.drain(&RecordingSink::failing()).await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(active_count(&op).await, 1);

        let stored = op.read(&archived.key).await.unwrap().to_vec();
        let record: DeadLetterRecord = serde_json::from_slice(&stored).unwrap();
        assert_eq!(record.replay_attempts, 1);
        assert_eq!(record.body, message("exec-42"));
    }

    #[tokio::test]
    async fn test_exhausted_attempts_move_to_failed_partition() {
        let (archiver, replayer, op) = setup();
        archiver.archive_one(&message("exec-42")).await.unwrap();

        let sink = RecordingSink::failing();
        for _ in 0..2 {
            replayer.drain(&sink).await.unwrap();
        }
        assert_eq!(active_count(&op).await, 1);

        // third failed pass reaches max_replay_attempts
        let summary = replayer.drain(&sink).await.unwrap();
        assert_eq!(summary.quarantined, 1);
        assert_eq!(active_count(&op).await, 0);
        assert_eq!(failed_count(&op).await, 1);
    }

    #[tokio::test]
    async fn test_unparsable_record_quarantined_immediately() {
        let (_, replayer, op) = setup();
        op.write(
            "test-stack/dead-letter-archive/sqs/garbage-1.json",
            b"not json {".to_vec(),
        )
        .await
        .unwrap();

        let summary = replayer.drain(&RecordingSink::ok()).await.unwrap();
        assert_eq!(summary.quarantined, 1);
        assert_eq!(active_count(&op).await, 0);
        assert_eq!(failed_count(&op).await, 1);
    }

    #[tokio::test]
    async fn test_one_bad_entry_does_not_stop_batch() {
        let (archiver, replayer, op) = setup();
        archiver.archive_one(&message("exec-a")).await.unwrap();
        op.write(
            "test-stack/dead-letter-archive/sqs/garbage-1.json",
            b"not json {".to_vec(),
        )
        .await
        .unwrap();
        archiver.archive_one(&message("exec-b")).await.unwrap();

        let sink = RecordingSink::ok();
        let summary = replayer.drain(&sink).await.unwrap();
        assert_eq!(summary.replayed, 2);
        assert_eq!(summary.quarantined, 1);
        assert_eq!(active_count(&op).await, 0);
    }
}
