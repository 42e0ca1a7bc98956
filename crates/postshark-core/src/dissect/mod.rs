//! Dissector subprocess and streaming decode of its JSON output.
//!
//! `process` owns the `tshark` child and its pipes; `reader` turns any
//! buffered byte stream holding a JSON array of packets into a lazy iterator
//! of records, independent of where the bytes come from.

pub mod error;
pub mod layout;
pub mod process;
pub mod reader;

pub use error::DissectError;
pub use process::{DissectionStream, DissectorConfig};
pub use reader::PacketArrayReader;
