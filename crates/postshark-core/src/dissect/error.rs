use std::path::PathBuf;
use std::process::ExitStatus;

use thiserror::Error;

/// Errors raised while running the dissector or decoding its output.
///
/// # Examples
/// ```
/// use postshark_core::DissectError;
///
/// let err = DissectError::MissingClosingDelimiter;
/// assert!(err.to_string().contains("closing"));
/// ```
#[derive(Debug, Error)]
pub enum DissectError {
    #[error("capture file not found: {}", .0.display())]
    CaptureMissing(PathBuf),
    #[error("failed to start dissector '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error reading dissector output: {0}")]
    Io(#[from] std::io::Error),
    #[error("dissector produced no output: {stderr}")]
    NoOutput { stderr: String },
    #[error("dissector output does not start with a JSON array (found {found:?})")]
    MissingOpeningDelimiter { found: Option<char> },
    #[error("dissector output truncated: missing closing array delimiter")]
    MissingClosingDelimiter,
    #[error("unexpected byte {found:?} after packet {position}")]
    UnexpectedToken { position: usize, found: char },
    #[error("failed to decode packet {position}: {source}")]
    Decode {
        position: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("dissector exited with {status}: {stderr}")]
    Exit { status: ExitStatus, stderr: String },
}
