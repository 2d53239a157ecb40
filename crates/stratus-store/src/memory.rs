//! In-memory store implementations for tests and local runs.

use crate::error::StoreError;
use crate::records::{
    EntityKind, EventWrites, ExecutionPayloadRow, ExecutionRow, GranuleRow, IndexedDocument,
    PdrRow,
};
use crate::traits::{RelationalStore, SearchIndex};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Default)]
struct RelationalInner {
    collections: HashMap<(String, String), i64>,
    providers: HashMap<String, i64>,
    async_operations: HashMap<String, i64>,
    executions: HashMap<String, ExecutionSlot>,
    granules: HashMap<String, GranuleRow>,
    pdrs: HashMap<String, PdrRow>,
    next_id: i64,
}

struct ExecutionSlot {
    id: i64,
    row: ExecutionRow,
    /// Once the sweeper clears payloads they stay cleared, even if the
    /// original event is replayed later.
    payload_swept: bool,
}

impl RelationalInner {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Hash-map relational store with a single-lock "transaction" per event.
#[derive(Default)]
pub struct MemoryRelationalStore {
    inner: Mutex<RelationalInner>,
    fail_writes: AtomicBool,
}

impl MemoryRelationalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_collection(&self, name: &str, version: &str) -> i64 {
        let mut inner = self.inner.lock();
        let id = inner.allocate_id();
        inner
            .collections
            .insert((name.to_string(), version.to_string()), id);
        id
    }

    pub fn seed_provider(&self, name: &str) -> i64 {
        let mut inner = self.inner.lock();
        let id = inner.allocate_id();
        inner.providers.insert(name.to_string(), id);
        id
    }

    pub fn seed_async_operation(&self, id_str: &str) -> i64 {
        let mut inner = self.inner.lock();
        let id = inner.allocate_id();
        inner.async_operations.insert(id_str.to_string(), id);
        id
    }

    /// Make subsequent writes fail, for failure-path tests.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn execution(&self, arn: &str) -> Option<ExecutionRow> {
        self.inner
            .lock()
            .executions
            .get(arn)
            .map(|slot| slot.row.clone())
    }

    pub fn granule(&self, granule_id: &str) -> Option<GranuleRow> {
        self.inner.lock().granules.get(granule_id).cloned()
    }

    pub fn pdr(&self, name: &str) -> Option<PdrRow> {
        self.inner.lock().pdrs.get(name).cloned()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Relational(
                "injected write failure".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RelationalStore for MemoryRelationalStore {
    async fn collection_id(&self, name: &str, version: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .inner
            .lock()
            .collections
            .get(&(name.to_string(), version.to_string()))
            .copied())
    }

    async fn provider_id(&self, name: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.inner.lock().providers.get(name).copied())
    }

    async fn execution_id(&self, arn: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.inner.lock().executions.get(arn).map(|slot| slot.id))
    }

    async fn async_operation_id(&self, id: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.inner.lock().async_operations.get(id).copied())
    }

    async fn apply_event(&self, writes: EventWrites) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock();

        let mut row = writes.execution;
        let arn = row.arn.clone();
        match inner.executions.get(&arn) {
            Some(existing) => {
                row.created_at = existing.row.created_at;
                let swept = existing.payload_swept;
                if swept {
                    row.original_payload = None;
                    row.final_payload = None;
                } else {
                    // a terminal event carries only the final payload; keep
                    // the original one from the earlier running event
                    if row.original_payload.is_none() {
                        row.original_payload = existing.row.original_payload.clone();
                    }
                    if row.final_payload.is_none() {
                        row.final_payload = existing.row.final_payload.clone();
                    }
                }
                let id = existing.id;
                inner.executions.insert(
                    arn,
                    ExecutionSlot {
                        id,
                        row,
                        payload_swept: swept,
                    },
                );
            }
            None => {
                let id = inner.allocate_id();
                inner.executions.insert(
                    arn,
                    ExecutionSlot {
                        id,
                        row,
                        payload_swept: false,
                    },
                );
            }
        }

        for granule in writes.granules {
            if let Some(existing) = inner.granules.get(&granule.granule_id) {
                let mut granule = granule;
                granule.created_at = existing.created_at;
                inner.granules.insert(granule.granule_id.clone(), granule);
            } else {
                inner.granules.insert(granule.granule_id.clone(), granule);
            }
        }

        if let Some(pdr) = writes.pdr {
            if let Some(existing) = inner.pdrs.get(&pdr.name) {
                let mut pdr = pdr;
                pdr.created_at = existing.created_at;
                inner.pdrs.insert(pdr.name.clone(), pdr);
            } else {
                inner.pdrs.insert(pdr.name.clone(), pdr);
            }
        }

        Ok(())
    }

    async fn select_expired_payloads(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<ExecutionPayloadRow>, StoreError> {
        let inner = self.inner.lock();
        let mut rows: Vec<ExecutionPayloadRow> = inner
            .executions
            .values()
            .filter(|slot| {
                (slot.row.original_payload.is_some() || slot.row.final_payload.is_some())
                    && slot.row.updated_at < cutoff
            })
            .map(|slot| ExecutionPayloadRow {
                arn: slot.row.arn.clone(),
                status: slot.row.status,
                updated_at: slot.row.updated_at,
            })
            .collect();
        rows.sort_by(|a, b| a.arn.cmp(&b.arn));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn clear_payloads(&self, arn: &str) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut inner = self.inner.lock();
        match inner.executions.get_mut(arn) {
            Some(slot) => {
                slot.row.original_payload = None;
                slot.row.final_payload = None;
                slot.payload_swept = true;
                Ok(())
            }
            None => Err(StoreError::Relational(format!(
                "no execution row for {arn}"
            ))),
        }
    }
}

const PAYLOAD_FIELDS: [&str; 2] = ["originalPayload", "finalPayload"];

/// Hash-map search index. Conflict handling lives in the callers:
/// `put` overwrites unconditionally, exactly like the real index.
#[derive(Default)]
pub struct MemorySearchIndex {
    docs: Mutex<HashMap<(EntityKind, String), IndexedDocument>>,
}

impl MemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.lock().is_empty()
    }
}

#[async_trait]
impl SearchIndex for MemorySearchIndex {
    async fn get(
        &self,
        kind: EntityKind,
        id: &str,
    ) -> Result<Option<IndexedDocument>, StoreError> {
        Ok(self.docs.lock().get(&(kind, id.to_string())).cloned())
    }

    async fn put(
        &self,
        kind: EntityKind,
        id: &str,
        doc: IndexedDocument,
    ) -> Result<(), StoreError> {
        self.docs.lock().insert((kind, id.to_string()), doc);
        Ok(())
    }

    async fn expire_payloads(
        &self,
        complete_cutoff: Option<DateTime<Utc>>,
        non_complete_cutoff: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let mut docs = self.docs.lock();
        let mut touched = 0u64;
        for ((kind, _), doc) in docs.iter_mut() {
            if *kind != EntityKind::Execution {
                continue;
            }
            let cutoff = if doc.status.is_terminal() {
                complete_cutoff
            } else {
                non_complete_cutoff
            };
            let Some(cutoff) = cutoff else { continue };
            if doc.updated_at >= cutoff {
                continue;
            }
            if let Some(body) = doc.body.as_object_mut() {
                let had_payload = PAYLOAD_FIELDS.iter().any(|f| body.contains_key(*f));
                if had_payload {
                    for field in PAYLOAD_FIELDS {
                        body.remove(field);
                    }
                    touched += 1;
                }
            }
        }
        Ok(touched)
    }
}
