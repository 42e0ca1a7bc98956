//! postshark core library: packet captures to Parquet records of HTTP POSTs.
//!
//! This crate implements the ingestion-and-transform pipeline used by the
//! CLI: a request source hands out capture jobs, `tshark` dissects each
//! capture, and the JSON it streams is decoded record by record, filtered to
//! POST requests, mapped to rows, and sealed into a Parquet artifact that the
//! source then persists and acknowledges.
//!
//! Invariants:
//! - Output rows correspond one-to-one, in order, to POST records.
//! - The dissector output is never buffered whole; one record at a time.
//! - A failed capture leaves no file at its artifact path.
//! - Artifacts are persisted before their origin is acknowledged.
//!
//! Module map:
//! - `extract`: pure field extraction (timestamp, caller, singleton fields).
//! - `dissect`: the `tshark` subprocess and incremental JSON array reader.
//! - `sink`: the Parquet row sink with its fixed layout.
//! - `processor`: one capture through open/stream/seal.
//! - `source`: static-list and SQS/S3 request sources.
//! - `driver`: the sequential job loop.
//!
//! # Examples
//! ```no_run
//! use postshark_core::{
//!     CaptureProcessor, DissectorConfig, IdlePolicy, SourceConfig, SourceMode, build_source,
//!     run,
//! };
//!
//! let config = SourceConfig::new(SourceMode::File, vec!["/captures/a.pcap".into()], "/captures");
//! let mut source = build_source(&config)?;
//! let processor = CaptureProcessor::new(DissectorConfig::default());
//! let summary = run(source.as_mut(), &processor, IdlePolicy::Exit)?;
//! println!("rows written: {}", summary.rows);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod config;
pub mod dissect;
mod driver;
mod extract;
mod processor;
mod record;
pub mod sink;
pub mod source;

pub use config::{
    DEFAULT_REGION, DEFAULT_WAIT, DEFAULT_WORK_DIR, IdlePolicy, PipelineConfig, SourceConfig,
    SourceMode,
};
pub use dissect::{DissectError, DissectionStream, DissectorConfig, PacketArrayReader};
pub use driver::{DriverError, RunSummary, run};
pub use extract::{derive_caller, extract_row, first_or_empty, parse_epoch};
pub use processor::{
    CaptureProcessor, CaptureSummary, ProcessError, Stage, artifact_path, partial_path,
};
pub use record::{DissectedPacketRecord, OutputRow, PacketEnvelope, PacketLayers};
pub use sink::{ParquetRowSink, SinkError, SinkSummary};
pub use source::{
    Job, MessageQueue, ObjectLocation, ObjectStore, QueueMessage, QueueSource, RequestSource,
    SourceError, StaticListSource, StorageNotification, build_source, decode_notification,
};
