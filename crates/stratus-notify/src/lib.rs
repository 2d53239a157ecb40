// stratus-notify - post-write report fan-out
//
// Every normalized event fans out as per-entity reports on configured
// notification channels, independently of whether the store writes
// succeed. Publication is best-effort: a failing channel is logged and
// never fails the ingest path.

mod channel;
mod error;
mod reporter;

pub use channel::{LogChannel, MemoryChannel, NotificationChannel};
pub use error::NotifyError;
pub use reporter::{PublishSummary, Reporter};
