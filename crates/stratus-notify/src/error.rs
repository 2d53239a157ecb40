use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}
