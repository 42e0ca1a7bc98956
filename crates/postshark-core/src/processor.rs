//! Per-capture transform: dissector stream -> POST filter -> rows -> artifact.
//!
//! A capture moves through `Opening -> Streaming -> Sealing -> Done`. Any
//! failure aborts the whole capture; the artifact is assembled under a
//! `.partial` name and only renamed into place once every stage succeeded, so
//! a failed capture never leaves a file at its artifact path.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, error, info, warn};

use crate::dissect::{DissectError, DissectionStream, DissectorConfig};
use crate::extract::extract_row;
use crate::sink::{ParquetRowSink, SinkError};

const PARTIAL_SUFFIX: &str = ".partial";

/// Processing stage a capture failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Opening,
    Streaming,
    Sealing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Opening => "opening",
            Stage::Streaming => "streaming",
            Stage::Sealing => "sealing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("{stage} capture failed: {source}")]
    Dissect {
        stage: Stage,
        #[source]
        source: DissectError,
    },
    #[error("{stage} artifact failed: {source}")]
    Sink {
        stage: Stage,
        #[source]
        source: SinkError,
    },
    #[error("failed to publish artifact {}: {source}", .path.display())]
    Publish {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ProcessError {
    /// Stage the failure happened in; publishing counts as sealing.
    pub fn stage(&self) -> Stage {
        match self {
            ProcessError::Dissect { stage, .. } | ProcessError::Sink { stage, .. } => *stage,
            ProcessError::Publish { .. } => Stage::Sealing,
        }
    }
}

/// Outcome of one successfully processed capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSummary {
    pub capture: PathBuf,
    pub artifact: PathBuf,
    /// Packet records read from the dissector.
    pub records_seen: u64,
    /// Records dropped for not being POST requests.
    pub records_skipped: u64,
    /// Records that failed to decode (non-zero only in failure logs).
    pub decode_errors: u64,
    pub rows_written: u64,
}

/// Drives one capture file through the dissector and into a Parquet artifact.
#[derive(Debug, Clone, Default)]
pub struct CaptureProcessor {
    dissector: DissectorConfig,
}

impl CaptureProcessor {
    pub fn new(dissector: DissectorConfig) -> Self {
        Self { dissector }
    }

    /// Transform `capture` into a sealed artifact at `artifact`.
    ///
    /// # Errors
    /// Returns `ProcessError` tagged with the failing stage. On error no file
    /// is left at `artifact` and the partial file is removed.
    pub fn process(&self, capture: &Path, artifact: &Path) -> Result<CaptureSummary, ProcessError> {
        let partial = partial_path(artifact);
        let mut summary = CaptureSummary {
            capture: capture.to_path_buf(),
            artifact: artifact.to_path_buf(),
            records_seen: 0,
            records_skipped: 0,
            decode_errors: 0,
            rows_written: 0,
        };

        match self.transform(capture, &partial, &mut summary) {
            Ok(()) => {
                fs::rename(&partial, artifact).map_err(|source| ProcessError::Publish {
                    path: artifact.to_path_buf(),
                    source,
                })?;
                info!(
                    capture = %capture.display(),
                    artifact = %artifact.display(),
                    records = summary.records_seen,
                    rows = summary.rows_written,
                    "capture processed"
                );
                Ok(summary)
            }
            Err(err) => {
                warn!(
                    capture = %capture.display(),
                    stage = %err.stage(),
                    records = summary.records_seen,
                    decode_errors = summary.decode_errors,
                    "capture failed"
                );
                discard_partial(&partial);
                Err(err)
            }
        }
    }

    fn transform(
        &self,
        capture: &Path,
        partial: &Path,
        summary: &mut CaptureSummary,
    ) -> Result<(), ProcessError> {
        // Opening
        let mut stream =
            DissectionStream::open(&self.dissector, capture).map_err(|source| {
                ProcessError::Dissect {
                    stage: Stage::Opening,
                    source,
                }
            })?;
        let mut sink = ParquetRowSink::create(partial).map_err(|source| ProcessError::Sink {
            stage: Stage::Opening,
            source,
        })?;
        let filename = capture.display().to_string();

        // Streaming
        debug!(capture = %filename, "parsing packets in capture");
        for record in stream.by_ref() {
            summary.records_seen += 1;
            let record = match record {
                Ok(record) => record,
                Err(source) => {
                    summary.decode_errors += 1;
                    error!(error = %source, near_element = summary.records_seen, "failed to decode packet");
                    return Err(ProcessError::Dissect {
                        stage: Stage::Streaming,
                        source,
                    });
                }
            };
            if !record.is_post() {
                summary.records_skipped += 1;
                continue;
            }
            let row = extract_row(&record, &filename);
            debug!(
                timestamp = %row.timestamp.format(&Rfc3339).unwrap_or_default(),
                uri = %row.uri,
                "POST request"
            );
            sink.append(&row).map_err(|source| ProcessError::Sink {
                stage: Stage::Streaming,
                source,
            })?;
        }

        // Sealing
        let sealed = sink.seal().map_err(|source| ProcessError::Sink {
            stage: Stage::Sealing,
            source,
        })?;
        stream.finish().map_err(|source| ProcessError::Dissect {
            stage: Stage::Sealing,
            source,
        })?;
        summary.rows_written = sealed.rows;
        Ok(())
    }
}

/// Temporary name an artifact is assembled under.
///
/// # Examples
/// ```
/// use std::path::Path;
/// use postshark_core::partial_path;
///
/// assert_eq!(
///     partial_path(Path::new("/tmp/a.pcap.parquet")),
///     Path::new("/tmp/a.pcap.parquet.partial")
/// );
/// ```
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Conventional artifact path for a local capture: `<capture>.parquet`.
///
/// # Examples
/// ```
/// use std::path::Path;
/// use postshark_core::artifact_path;
///
/// assert_eq!(
///     artifact_path(Path::new("/out/x.pcap")),
///     Path::new("/out/x.pcap.parquet")
/// );
/// ```
pub fn artifact_path(capture: &Path) -> PathBuf {
    let mut name = capture.as_os_str().to_os_string();
    name.push(".parquet");
    PathBuf::from(name)
}

fn discard_partial(partial: &Path) {
    match fs::remove_file(partial) {
        Ok(()) => debug!(path = %partial.display(), "removed partial artifact"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %partial.display(), error = %err, "failed to remove partial artifact"),
    }
}
