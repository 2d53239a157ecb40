//! Key construction for the dead-letter archive layout.

use chrono::NaiveDate;
use uuid::Uuid;

/// Prefix under which active dead-letter entries live.
pub fn archive_prefix(stack: &str) -> String {
    format!("{}/dead-letter-archive/sqs/", stack)
}

/// Prefix for entries that exhausted their replay attempts.
pub fn failed_prefix(stack: &str) -> String {
    format!("{}/dead-letter-archive/failed-sqs/", stack)
}

/// Key for a fresh archive entry. The uuid keeps concurrent writes for the
/// same execution from colliding.
pub fn archive_key(stack: &str, execution_name: Option<&str>) -> String {
    format!(
        "{}{}-{}.json",
        archive_prefix(stack),
        execution_name.unwrap_or("unknown"),
        Uuid::new_v4()
    )
}

/// Key for a quarantined entry, partitioned by quarantine date.
pub fn failed_key(stack: &str, date: NaiveDate, execution_arn: Option<&str>) -> String {
    format!(
        "{}{}/{}-{}",
        failed_prefix(stack),
        date.format("%Y-%m-%d"),
        execution_arn.unwrap_or("unknown"),
        Uuid::new_v4()
    )
}
