//! S3 event notifications as delivered through SQS.

use serde::Deserialize;

use super::error::SourceError;
use super::location::ObjectLocation;

const TEST_EVENT: &str = "s3:TestEvent";

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "Records", alias = "records", default)]
    records: Vec<EventRecord>,
    #[serde(rename = "Event", default)]
    event: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    s3: S3Entity,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
}

/// Decoded content of one queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageNotification {
    /// Object-created notification; only the first record is used.
    Object(ObjectLocation),
    /// Sent by S3 when notifications are first configured.
    Test,
}

/// Decode a queue message body.
///
/// # Errors
/// Returns `SourceError::Notification` when the body is not JSON, or carries
/// neither records nor a test event.
///
/// # Examples
/// ```
/// use postshark_core::{ObjectLocation, StorageNotification, decode_notification};
///
/// let body = r#"{"Records":[{"s3":{"bucket":{"name":"b"},"object":{"key":"dir/my+file.pcap"}}}]}"#;
/// assert_eq!(
///     decode_notification(body).unwrap(),
///     StorageNotification::Object(ObjectLocation::new("b", "dir/my file.pcap"))
/// );
/// ```
pub fn decode_notification(body: &str) -> Result<StorageNotification, SourceError> {
    let envelope: EventEnvelope =
        serde_json::from_str(body).map_err(|err| SourceError::Notification(err.to_string()))?;

    if envelope.event.as_deref() == Some(TEST_EVENT) {
        return Ok(StorageNotification::Test);
    }

    let record = envelope
        .records
        .into_iter()
        .next()
        .ok_or_else(|| SourceError::Notification("no records".to_string()))?;
    Ok(StorageNotification::Object(ObjectLocation::new(
        record.s3.bucket.name,
        decode_object_key(&record.s3.object.key),
    )))
}

/// S3 notifications form-encode keys: spaces become `+`, the rest `%XX`.
pub fn decode_object_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}
