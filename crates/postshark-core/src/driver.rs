//! Sequential job loop: source -> fetch -> process -> complete.

use thiserror::Error;
use tracing::{debug, info};

use crate::config::IdlePolicy;
use crate::processor::{CaptureProcessor, ProcessError, artifact_path};
use crate::source::{RequestSource, SourceError};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("request source error: {0}")]
    Source(#[from] SourceError),
    #[error("error processing capture {locator}: {source}")]
    Process {
        locator: String,
        #[source]
        source: ProcessError,
    },
    #[error("error completing request {locator}: {source}")]
    Complete {
        locator: String,
        #[source]
        source: SourceError,
    },
}

/// Totals for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub jobs: u64,
    pub records: u64,
    pub rows: u64,
}

/// Process jobs one at a time until the source runs dry.
///
/// Each job is fully fetched, transformed, and completed before the next one
/// is requested. The first error stops the run; the failed job is never
/// completed, so a queue origin will redeliver it.
///
/// # Errors
/// Returns `DriverError` identifying the failing step and locator.
pub fn run<S: RequestSource + ?Sized>(
    source: &mut S,
    processor: &CaptureProcessor,
    idle: IdlePolicy,
) -> Result<RunSummary, DriverError> {
    let mut summary = RunSummary::default();
    loop {
        if !source.has_more()? {
            match idle {
                IdlePolicy::Exit => break,
                IdlePolicy::Poll => {
                    debug!("no work available, polling again");
                    continue;
                }
            }
        }
        let Some(mut job) = source.get_value() else {
            continue;
        };

        let capture = source.fetch(&mut job)?;
        let artifact = artifact_path(&capture);
        info!(locator = %job.locator, local = %capture.display(), "processing packet capture");

        let processed = processor
            .process(&capture, &artifact)
            .map_err(|source| DriverError::Process {
                locator: job.locator.clone(),
                source,
            })?;

        let locator = job.locator.clone();
        source
            .complete(job, &artifact)
            .map_err(|source| DriverError::Complete {
                locator: locator.clone(),
                source,
            })?;
        info!(locator = %locator, rows = processed.rows_written, "completed packet capture");

        summary.jobs += 1;
        summary.records += processed.records_seen;
        summary.rows += processed.rows_written;
    }
    info!(jobs = summary.jobs, rows = summary.rows, "run finished");
    Ok(summary)
}
