// stratus-archive - dead-letter capture and replay over object storage
//
// The archive is the last line of defense: any workflow message that could
// not be durably recorded lands here as JSON, keyed by execution name, and
// is drained back through the normal write path by the replayer.
//
// Layout inside the configured bucket/root:
//   {stack}/dead-letter-archive/sqs/{executionName|unknown}-{uuid}.json
//   {stack}/dead-letter-archive/failed-sqs/{YYYY-MM-DD}/{executionArn|unknown}-{uuid}

mod archiver;
mod error;
mod paths;
mod replayer;
mod storage;

pub use archiver::{ArchivedObject, Archiver};
pub use error::ArchiveError;
pub use paths::{archive_key, archive_prefix, failed_key, failed_prefix};
pub use replayer::{DrainSummary, ReplaySink, Replayer};
pub use storage::build_operator;
