//! Fixed `tshark` invocation and output framing.

/// Default dissector executable, resolved through `PATH`.
pub const DEFAULT_TSHARK: &str = "tshark";

/// Reassembly preferences so HTTP requests spanning segments are decoded.
pub const TSHARK_PREFERENCES: [&str; 3] = [
    "tcp.desegment_tcp_streams:TRUE",
    "http.desegment_headers:TRUE",
    "http.desegment_body:TRUE",
];

pub const FIELD_TIME_EPOCH: &str = "frame.time_epoch";
pub const FIELD_METHOD: &str = "http.request.method";
pub const FIELD_URI: &str = "http.request.uri";
pub const FIELD_FORWARDED_FOR: &str = "http.x_forwarded_for";
pub const FIELD_USER_AGENT: &str = "http.user_agent";
pub const FIELD_REFERER: &str = "http.referer";
pub const FIELD_FILE_DATA: &str = "http.file_data";

/// Fields passed to `tshark -e`, in emission order.
pub const EXTRACTED_FIELDS: [&str; 7] = [
    FIELD_TIME_EPOCH,
    FIELD_METHOD,
    FIELD_URI,
    FIELD_FORWARDED_FOR,
    FIELD_USER_AGENT,
    FIELD_REFERER,
    FIELD_FILE_DATA,
];

pub const HTTP_METHOD_POST: &str = "POST";

pub const ARRAY_OPEN: u8 = b'[';
pub const ARRAY_CLOSE: u8 = b']';
pub const ELEMENT_SEPARATOR: u8 = b',';

/// Stdout buffer for the dissector pipe.
pub const STDOUT_BUFFER_SIZE: usize = 64 * 1024;
