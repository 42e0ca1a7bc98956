use parquet::errors::ParquetError;
use thiserror::Error;

/// Errors raised while encoding or sealing an artifact.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parquet error: {0}")]
    Parquet(#[from] ParquetError),
    #[error("unexpected column {index} in artifact schema")]
    UnexpectedColumn { index: usize },
}
