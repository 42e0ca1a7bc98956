//! Parquet row sink for sealed capture artifacts.

pub mod error;
pub mod int96;
pub mod layout;
pub mod writer;

pub use error::SinkError;
pub use writer::{ParquetRowSink, SinkSummary};
