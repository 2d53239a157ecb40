// stratus-core - domain model and pure decision logic
//
// Everything in this crate is I/O free:
// - WorkflowMessage and friends: the canonical unit of work emitted by the
//   external workflow engine
// - envelope: recursive unwrapping of queue/event-bus wrappers of unknown depth
// - dead_letter: the archived record shape for messages that failed to be
//   durably recorded
// - resolve: the upsert conflict-resolution decision function shared by every
//   search-index adapter

mod dead_letter;
mod envelope;
mod message;
mod resolve;

pub use dead_letter::DeadLetterRecord;
pub use envelope::{unwrap_envelope, NormalizedMessage, MAX_ENVELOPE_DEPTH};
pub use message::{
    CollectionRef, ExecutionMeta, GranuleRef, PdrRef, PdrStats, WorkflowMessage, WorkflowStatus,
};
pub use resolve::{resolve_upsert, UpsertSnapshot, WriteDecision};
