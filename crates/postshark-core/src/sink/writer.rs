use std::fs::File;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parquet::data_type::{ByteArray, ByteArrayType, Int96, Int96Type};
use parquet::file::properties::{WriterProperties, WriterVersion};
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use tracing::debug;

use super::error::SinkError;
use super::int96::to_int96;
use super::layout;
use crate::record::OutputRow;

/// Totals reported when an artifact is sealed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkSummary {
    pub rows: u64,
    pub row_groups: usize,
}

/// Column-wise buffer for the row group being assembled.
#[derive(Default)]
struct ColumnBuffers {
    filename: Vec<ByteArray>,
    timestamp: Vec<Int96>,
    forwarded_for: Vec<ByteArray>,
    caller: Vec<ByteArray>,
    user_agent: Vec<ByteArray>,
    referer: Vec<ByteArray>,
    uri: Vec<ByteArray>,
    query: Vec<ByteArray>,
    bytes: usize,
}

impl ColumnBuffers {
    fn push(&mut self, row: &OutputRow) {
        self.bytes += layout::INT96_WIDTH
            + row.filename.len()
            + row.forwarded_for.len()
            + row.caller.len()
            + row.user_agent.len()
            + row.referer.len()
            + row.uri.len()
            + row.query.len();
        self.filename.push(ByteArray::from(row.filename.as_str()));
        self.timestamp.push(to_int96(row.timestamp));
        self.forwarded_for.push(ByteArray::from(row.forwarded_for.as_str()));
        self.caller.push(ByteArray::from(row.caller.as_str()));
        self.user_agent.push(ByteArray::from(row.user_agent.as_str()));
        self.referer.push(ByteArray::from(row.referer.as_str()));
        self.uri.push(ByteArray::from(row.uri.as_str()));
        self.query.push(ByteArray::from(row.query.as_str()));
    }

    fn len(&self) -> usize {
        self.timestamp.len()
    }

    fn strings(&self, index: usize) -> Option<&[ByteArray]> {
        match index {
            0 => Some(&self.filename),
            2 => Some(&self.forwarded_for),
            3 => Some(&self.caller),
            4 => Some(&self.user_agent),
            5 => Some(&self.referer),
            6 => Some(&self.uri),
            7 => Some(&self.query),
            _ => None,
        }
    }
}

/// Parquet encoder for [`OutputRow`]s with the fixed artifact layout.
///
/// Rows are buffered column-wise and written as one row group each time the
/// buffer reaches [`layout::ROW_GROUP_SIZE_BYTES`]. Nothing is readable as a
/// Parquet file until [`ParquetRowSink::seal`] writes the footer.
pub struct ParquetRowSink {
    path: PathBuf,
    writer: SerializedFileWriter<File>,
    buffers: ColumnBuffers,
    row_group_bytes: usize,
    summary: SinkSummary,
}

impl ParquetRowSink {
    /// Create (or truncate) the artifact at `path`.
    ///
    /// # Errors
    /// Returns `SinkError` when the file cannot be created or the writer
    /// cannot be initialised.
    pub fn create(path: &Path) -> Result<Self, SinkError> {
        Self::with_row_group_bytes(path, layout::ROW_GROUP_SIZE_BYTES)
    }

    pub(crate) fn with_row_group_bytes(
        path: &Path,
        row_group_bytes: usize,
    ) -> Result<Self, SinkError> {
        let schema = Arc::new(parse_message_type(layout::ARTIFACT_SCHEMA)?);
        let props = Arc::new(writer_properties());
        let file = File::create(path)?;
        let writer = SerializedFileWriter::new(file, schema, props)?;
        debug!(path = %path.display(), "opened artifact writer");
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            buffers: ColumnBuffers::default(),
            row_group_bytes,
            summary: SinkSummary::default(),
        })
    }

    /// Buffer one row, flushing a row group once the size threshold is hit.
    ///
    /// # Errors
    /// Returns `SinkError` if a row group flush fails.
    pub fn append(&mut self, row: &OutputRow) -> Result<(), SinkError> {
        self.buffers.push(row);
        if self.buffers.bytes >= self.row_group_bytes {
            self.flush_row_group()?;
        }
        Ok(())
    }

    /// Flush buffered rows and write the footer.
    ///
    /// # Errors
    /// Returns `SinkError` if the final flush or footer write fails.
    pub fn seal(mut self) -> Result<SinkSummary, SinkError> {
        self.flush_row_group()?;
        self.writer.close()?;
        debug!(
            path = %self.path.display(),
            rows = self.summary.rows,
            row_groups = self.summary.row_groups,
            "sealed artifact"
        );
        Ok(self.summary)
    }

    fn flush_row_group(&mut self) -> Result<(), SinkError> {
        if self.buffers.len() == 0 {
            return Ok(());
        }
        let buffers = mem::take(&mut self.buffers);
        let mut row_group = self.writer.next_row_group()?;
        let mut index = 0;
        while let Some(mut column) = row_group.next_column()? {
            if index == 1 {
                column
                    .typed::<Int96Type>()
                    .write_batch(&buffers.timestamp, None, None)?;
            } else {
                let values = buffers
                    .strings(index)
                    .ok_or(SinkError::UnexpectedColumn { index })?;
                column
                    .typed::<ByteArrayType>()
                    .write_batch(values, None, None)?;
            }
            column.close()?;
            index += 1;
        }
        row_group.close()?;

        self.summary.rows += buffers.len() as u64;
        self.summary.row_groups += 1;
        Ok(())
    }
}

fn writer_properties() -> WriterProperties {
    WriterProperties::builder()
        .set_writer_version(WriterVersion::PARQUET_1_0)
        .set_compression(layout::COMPRESSION)
        .set_dictionary_enabled(true)
        .set_data_page_size_limit(layout::PAGE_SIZE_BYTES)
        .set_max_row_group_size(usize::MAX)
        .set_created_by(format!("postshark {}", env!("CARGO_PKG_VERSION")))
        .build()
}
