//! Request sources: where captures come from and where artifacts go.
//!
//! A source hands out one [`Job`] at a time. The driver owns the job, asks the
//! source to materialize it locally, processes it, then gives it back through
//! [`RequestSource::complete`] so the source can persist the artifact and
//! acknowledge the origin.

pub mod aws;
pub mod error;
pub mod location;
pub mod notification;
pub mod queue;
pub mod static_list;

use std::path::{Path, PathBuf};

pub use error::SourceError;
pub use location::ObjectLocation;
pub use notification::{StorageNotification, decode_notification};
pub use queue::{MessageQueue, ObjectStore, QueueMessage, QueueSource};
pub use static_list::StaticListSource;

use crate::config::{SourceConfig, SourceMode};

/// One unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    /// Where the capture comes from: a local path or `s3://bucket/key`.
    pub locator: String,
    /// Local working copy, set by [`RequestSource::fetch`].
    pub local_path: Option<PathBuf>,
    /// Handle needed to acknowledge the origin (queue receipt handle).
    pub origin_token: Option<String>,
}

impl Job {
    pub fn new(locator: impl Into<String>) -> Self {
        Self {
            locator: locator.into(),
            local_path: None,
            origin_token: None,
        }
    }

    pub fn with_origin_token(mut self, token: impl Into<String>) -> Self {
        self.origin_token = Some(token.into());
        self
    }

    /// Local working copy, failing if the job was never fetched.
    pub fn local_path(&self) -> Result<&Path, SourceError> {
        self.local_path
            .as_deref()
            .ok_or_else(|| SourceError::NotFetched(self.locator.clone()))
    }
}

/// Supplier and finalizer of jobs.
///
/// Only [`has_more`](RequestSource::has_more) may block, and only for a
/// bounded time. [`get_value`](RequestSource::get_value) has no side effects.
pub trait RequestSource {
    /// Advance to the next job; `false` means no work is available now.
    fn has_more(&mut self) -> Result<bool, SourceError>;

    /// The job selected by the most recent successful `has_more`.
    fn get_value(&self) -> Option<Job>;

    /// Materialize the job locally and return the local path.
    fn fetch(&mut self, job: &mut Job) -> Result<PathBuf, SourceError>;

    /// Persist `artifact`, acknowledge the origin, and drop local copies.
    fn complete(&mut self, job: Job, artifact: &Path) -> Result<(), SourceError>;

    /// `has_more` followed by `get_value`.
    fn next_job(&mut self) -> Result<Option<Job>, SourceError> {
        if self.has_more()? {
            Ok(self.get_value())
        } else {
            Ok(None)
        }
    }
}

impl<S: RequestSource + ?Sized> RequestSource for Box<S> {
    fn has_more(&mut self) -> Result<bool, SourceError> {
        (**self).has_more()
    }

    fn get_value(&self) -> Option<Job> {
        (**self).get_value()
    }

    fn fetch(&mut self, job: &mut Job) -> Result<PathBuf, SourceError> {
        (**self).fetch(job)
    }

    fn complete(&mut self, job: Job, artifact: &Path) -> Result<(), SourceError> {
        (**self).complete(job, artifact)
    }
}

/// Build the source selected by `config.mode`.
///
/// Queue mode connects to AWS and resolves the queue named by the first
/// input before returning.
///
/// # Errors
/// Returns `SourceError` when no inputs are configured or queue setup fails.
pub fn build_source(config: &SourceConfig) -> Result<Box<dyn RequestSource>, SourceError> {
    if config.inputs.is_empty() {
        return Err(SourceError::NoInputs);
    }
    match config.mode {
        SourceMode::File => Ok(Box::new(StaticListSource::new(
            config.inputs.clone(),
            &config.output,
        ))),
        SourceMode::Queue => {
            let source = aws::connect_queue_source(config)?;
            Ok(Box::new(source))
        }
    }
}
