use std::path::{Path, PathBuf};

use tracing::debug;

use super::error::SourceError;
use super::location::base_name;
use super::{Job, RequestSource};

/// Jobs from a fixed, ordered list of local captures.
///
/// Captures are processed in place inside the destination directory: `fetch`
/// only joins the destination with the locator's base name, and the artifact
/// written next to it is already at its final location, so `complete` has
/// nothing to do.
///
/// # Examples
/// ```
/// use std::path::PathBuf;
/// use postshark_core::{RequestSource, StaticListSource};
///
/// let mut source = StaticListSource::new(vec!["/a/x.pcap".to_string()], "/out");
/// let mut job = source.next_job().unwrap().unwrap();
/// assert_eq!(source.fetch(&mut job).unwrap(), PathBuf::from("/out/x.pcap"));
/// assert!(!source.has_more().unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct StaticListSource {
    inputs: Vec<String>,
    output_dir: PathBuf,
    cursor: usize,
    current: Option<String>,
}

impl StaticListSource {
    pub fn new(inputs: Vec<String>, output_dir: impl AsRef<Path>) -> Self {
        let output_dir = output_dir.as_ref().to_string_lossy();
        let trimmed = output_dir.trim_end_matches('/');
        let output_dir = if trimmed.is_empty() && output_dir.starts_with('/') {
            PathBuf::from("/")
        } else {
            PathBuf::from(trimmed)
        };
        Self {
            inputs,
            output_dir,
            cursor: 0,
            current: None,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Locators not yet handed out.
    pub fn remaining(&self) -> usize {
        self.inputs.len().saturating_sub(self.cursor)
    }
}

impl RequestSource for StaticListSource {
    fn has_more(&mut self) -> Result<bool, SourceError> {
        self.current = self.inputs.get(self.cursor).cloned();
        if self.current.is_some() {
            self.cursor += 1;
        }
        Ok(self.current.is_some())
    }

    fn get_value(&self) -> Option<Job> {
        self.current.as_deref().map(Job::new)
    }

    fn fetch(&mut self, job: &mut Job) -> Result<PathBuf, SourceError> {
        let name = base_name(&job.locator);
        if name.is_empty() {
            return Err(SourceError::InvalidLocator(job.locator.clone()));
        }
        let local = self.output_dir.join(name);
        debug!(locator = %job.locator, local = %local.display(), "resolved static job");
        job.local_path = Some(local.clone());
        Ok(local)
    }

    fn complete(&mut self, job: Job, artifact: &Path) -> Result<(), SourceError> {
        debug!(locator = %job.locator, artifact = %artifact.display(), "artifact already in place");
        Ok(())
    }
}
