//! Explicit pipeline configuration, threaded through constructors.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::dissect::DissectorConfig;

pub const DEFAULT_WORK_DIR: &str = "/tmp";
pub const DEFAULT_REGION: &str = "us-west-2";
/// Queue long-poll wait per receive.
pub const DEFAULT_WAIT: Duration = Duration::from_secs(15);

/// Where jobs come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SourceMode {
    /// A static list of local captures.
    #[default]
    File,
    /// S3 notifications delivered through an SQS queue.
    Queue,
}

impl fmt::Display for SourceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SourceMode::File => "file",
            SourceMode::Queue => "queue",
        })
    }
}

/// Request source settings.
///
/// # Examples
/// ```
/// use postshark_core::{SourceConfig, SourceMode};
///
/// let config = SourceConfig::new(SourceMode::Queue, vec!["captures".to_string()], "s3://out")
///     .with_work_dir("/var/tmp")
///     .with_region("eu-west-1");
/// assert_eq!(config.region, "eu-west-1");
/// assert_eq!(config.wait_time.as_secs(), 15);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    pub mode: SourceMode,
    /// Capture paths in file mode; the queue name (first entry) in queue mode.
    pub inputs: Vec<String>,
    /// Output directory or `s3://bucket/prefix`.
    pub output: String,
    /// Working directory for downloaded captures.
    pub work_dir: PathBuf,
    pub region: String,
    pub wait_time: Duration,
}

impl SourceConfig {
    pub fn new(mode: SourceMode, inputs: Vec<String>, output: impl Into<String>) -> Self {
        Self {
            mode,
            inputs,
            output: output.into(),
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            region: DEFAULT_REGION.to_string(),
            wait_time: DEFAULT_WAIT,
        }
    }

    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }
}

/// What the driver does when the source reports no work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IdlePolicy {
    /// Stop the run.
    #[default]
    Exit,
    /// Keep polling; each empty poll already waited the long-poll interval.
    Poll,
}

/// Everything needed to run the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    pub dissector: DissectorConfig,
    pub idle: IdlePolicy,
}
