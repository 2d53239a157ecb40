// stratus-store - dual-store write coordination
//
// One incoming workflow status event fans out into records for two derived
// stores: the relational store (transactional, one atomicity boundary per
// event) and the search index (conditionally written through the pure
// conflict-resolution rule in stratus-core, so duplicated and out-of-order
// delivery cannot regress state).
//
// The store engines themselves live behind the RelationalStore/SearchIndex
// traits; in-memory implementations ship here for tests and local runs.

mod coordinator;
mod error;
mod memory;
mod records;
mod sweeper;
mod traits;

pub use coordinator::WriteCoordinator;
pub use error::StoreError;
pub use memory::{MemoryRelationalStore, MemorySearchIndex};
pub use records::{
    EntityKind, EventWrites, ExecutionPayloadRow, ExecutionRow, GranuleRow, IndexedDocument,
    PdrRow,
};
pub use sweeper::{sweep_expired_payloads, SweepSummary};
pub use traits::{RelationalStore, SearchIndex};
