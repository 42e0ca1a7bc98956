//! Fixed physical layout of the output artifact.

use parquet::basic::Compression;

/// Parquet message type; every column is required.
pub const ARTIFACT_SCHEMA: &str = "
message http_post {
  required binary filename (UTF8);
  required int96 timestamp;
  required binary forwardedfor (UTF8);
  required binary caller (UTF8);
  required binary useragent (UTF8);
  required binary referer (UTF8);
  required binary uri (UTF8);
  required binary query (UTF8);
}
";

/// Column names in schema order.
pub const COLUMNS: [&str; 8] = [
    "filename",
    "timestamp",
    "forwardedfor",
    "caller",
    "useragent",
    "referer",
    "uri",
    "query",
];

/// Buffered bytes that trigger a row group flush (128 MiB).
pub const ROW_GROUP_SIZE_BYTES: usize = 128 * 1024 * 1024;
/// Data page size limit (8 KiB).
pub const PAGE_SIZE_BYTES: usize = 8 * 1024;
pub const COMPRESSION: Compression = Compression::SNAPPY;

/// Encoded width of one INT96 value.
pub const INT96_WIDTH: usize = 12;
/// Julian day number of 1970-01-01.
pub const JULIAN_DAY_OF_UNIX_EPOCH: i128 = 2_440_588;
pub const NANOS_PER_DAY: i128 = 86_400 * 1_000_000_000;
