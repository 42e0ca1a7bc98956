use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use tracing::{debug, warn};

use super::error::DissectError;
use super::layout;
use super::reader::PacketArrayReader;
use crate::record::DissectedPacketRecord;

/// How to invoke the dissector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DissectorConfig {
    /// Executable name or path.
    pub program: PathBuf,
}

impl Default for DissectorConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(layout::DEFAULT_TSHARK),
        }
    }
}

impl DissectorConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Full argument list for one capture.
    ///
    /// # Examples
    /// ```
    /// use std::path::Path;
    /// use postshark_core::DissectorConfig;
    ///
    /// let args = DissectorConfig::default().args(Path::new("in.pcap"));
    /// assert_eq!(args[0], "-r");
    /// assert_eq!(args[1], "in.pcap");
    /// assert!(args.iter().any(|a| a == "http.file_data"));
    /// ```
    pub fn args(&self, capture: &Path) -> Vec<String> {
        let mut args = vec!["-r".to_string(), capture.display().to_string()];
        for pref in layout::TSHARK_PREFERENCES {
            args.push("-o".to_string());
            args.push(pref.to_string());
        }
        args.push("-T".to_string());
        args.push("json".to_string());
        for field in layout::EXTRACTED_FIELDS {
            args.push("-e".to_string());
            args.push(field.to_string());
        }
        args
    }
}

/// A running dissector whose stdout is exposed as a packet iterator.
///
/// The subprocess is always reaped: either by [`DissectionStream::finish`],
/// which also checks the exit status, or on drop, which kills it first.
pub struct DissectionStream {
    child: Child,
    packets: Option<PacketArrayReader<BufReader<ChildStdout>>>,
    stderr: Option<JoinHandle<String>>,
    reaped: bool,
}

impl DissectionStream {
    /// Start the dissector for `capture` and consume the opening delimiter.
    ///
    /// # Errors
    /// Fails when the capture is missing, the program cannot be spawned, the
    /// dissector writes nothing to stdout, or the output is not a JSON array.
    pub fn open(config: &DissectorConfig, capture: &Path) -> Result<Self, DissectError> {
        if !capture.exists() {
            return Err(DissectError::CaptureMissing(capture.to_path_buf()));
        }

        debug!(program = %config.program.display(), capture = %capture.display(), "starting dissector");
        let mut child = Command::new(&config.program)
            .args(config.args(capture))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| DissectError::Spawn {
                program: config.program.display().to_string(),
                source,
            })?;

        let stderr = child.stderr.take().map(drain_stderr);
        let mut stream = Self {
            child,
            packets: None,
            stderr,
            reaped: false,
        };

        let stdout = stream
            .child
            .stdout
            .take()
            .ok_or_else(|| std::io::Error::other("dissector stdout not captured"))?;
        let mut stdout = BufReader::with_capacity(layout::STDOUT_BUFFER_SIZE, stdout);

        // Empty stdout means tshark rejected the invocation; stderr says why.
        if stdout.fill_buf()?.is_empty() {
            stream.reap()?;
            return Err(DissectError::NoOutput {
                stderr: stream.take_stderr(),
            });
        }

        stream.packets = Some(PacketArrayReader::open(stdout)?);
        Ok(stream)
    }

    /// Elements decoded so far.
    pub fn records_read(&self) -> usize {
        self.packets.as_ref().map_or(0, PacketArrayReader::records_read)
    }

    /// Validate the closing delimiter and wait for a successful exit.
    ///
    /// # Errors
    /// Returns `MissingClosingDelimiter` for truncated output and `Exit` for a
    /// non-zero exit status.
    pub fn finish(mut self) -> Result<usize, DissectError> {
        let packets = self.packets.take();
        let closed = packets.map(PacketArrayReader::finish);
        let status = self.child.wait()?;
        self.reaped = true;

        if !status.success() {
            return Err(DissectError::Exit {
                status,
                stderr: self.take_stderr(),
            });
        }
        let count = closed.unwrap_or(Err(DissectError::MissingClosingDelimiter))?;
        debug!(records = count, "dissector finished");
        Ok(count)
    }

    fn reap(&mut self) -> Result<(), DissectError> {
        if !self.reaped {
            self.child.wait()?;
            self.reaped = true;
        }
        Ok(())
    }

    fn take_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .map(|text| text.trim().to_string())
            .unwrap_or_default()
    }
}

impl Iterator for DissectionStream {
    type Item = Result<DissectedPacketRecord, DissectError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.packets.as_mut()?.next()
    }
}

impl Drop for DissectionStream {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        // Close our end first so a blocked writer sees EPIPE.
        self.packets.take();
        if let Err(err) = self.child.kill() {
            debug!(error = %err, "dissector already exited");
        }
        if let Err(err) = self.child.wait() {
            warn!(error = %err, "failed to reap dissector");
        }
    }
}

fn drain_stderr<R: Read + Send + 'static>(mut stderr: R) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(err) = stderr.read_to_end(&mut buf) {
            debug!(error = %err, "failed to read dissector stderr");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}
