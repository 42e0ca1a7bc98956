use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while sourcing, materializing, or finalizing jobs.
///
/// # Examples
/// ```
/// use postshark_core::SourceError;
///
/// let err = SourceError::InvalidLocator("gs://bucket/key".to_string());
/// assert!(err.to_string().contains("gs://bucket/key"));
/// ```
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid locator: {0}")]
    InvalidLocator(String),
    #[error("no input locators configured")]
    NoInputs,
    #[error("failed to initialise cloud clients: {0}")]
    Setup(String),
    #[error("failed to resolve queue '{queue}': {message}")]
    QueueResolve { queue: String, message: String },
    #[error("failed to receive from queue: {0}")]
    Receive(String),
    #[error("queue message is not a storage notification: {0}")]
    Notification(String),
    #[error("failed to acknowledge queue message: {0}")]
    Acknowledge(String),
    #[error("failed to download {locator}: {message}")]
    Download { locator: String, message: String },
    #[error("failed to upload to {destination}: {message}")]
    Upload { destination: String, message: String },
    #[error("failed to copy {} to {}: {source}", .from.display(), .to.display())]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("job {0} has not been fetched")]
    NotFetched(String),
}
