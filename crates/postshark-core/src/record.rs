use serde::Deserialize;
use time::OffsetDateTime;

/// One packet as emitted by `tshark -T json -e ...`.
///
/// Every extracted field is an array holding zero or one string; missing
/// keys deserialize to empty arrays.
///
/// # Examples
/// ```
/// use postshark_core::DissectedPacketRecord;
///
/// let json = r#"{"_source":{"layers":{"http.request.method":["POST"]}}}"#;
/// let record: DissectedPacketRecord = serde_json::from_str(json).unwrap();
/// assert_eq!(record.method(), Some("POST"));
/// assert!(record.source.layers.uri.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DissectedPacketRecord {
    #[serde(rename = "_source", default)]
    pub source: PacketEnvelope,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PacketEnvelope {
    #[serde(default)]
    pub layers: PacketLayers,
}

/// Extracted `tshark` fields, keyed by their display filter names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PacketLayers {
    #[serde(rename = "frame.time_epoch", default)]
    pub timestamp: Vec<String>,
    #[serde(rename = "http.request.method", default)]
    pub method: Vec<String>,
    #[serde(rename = "http.request.uri", default)]
    pub uri: Vec<String>,
    #[serde(rename = "http.x_forwarded_for", default)]
    pub forwarded_for: Vec<String>,
    #[serde(rename = "http.user_agent", default)]
    pub user_agent: Vec<String>,
    #[serde(rename = "http.referer", default)]
    pub referer: Vec<String>,
    #[serde(rename = "http.file_data", default)]
    pub data: Vec<String>,
}

impl DissectedPacketRecord {
    /// HTTP request method, when the packet carried one.
    pub fn method(&self) -> Option<&str> {
        self.source.layers.method.first().map(String::as_str)
    }

    /// True when the packet is an HTTP POST request.
    pub fn is_post(&self) -> bool {
        self.method() == Some(crate::dissect::layout::HTTP_METHOD_POST)
    }
}

/// One persisted row of the artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    /// Capture file the row was extracted from.
    pub filename: String,
    pub timestamp: OffsetDateTime,
    pub forwarded_for: String,
    /// Client identity derived from the user agent product token.
    pub caller: String,
    pub user_agent: String,
    pub referer: String,
    pub uri: String,
    /// Raw request body.
    pub query: String,
}
