use std::fmt;
use std::path::Path;

use super::error::SourceError;

pub const S3_SCHEME: &str = "s3://";

/// A bucket/key pair addressed as `s3://bucket/key`.
///
/// # Examples
/// ```
/// use postshark_core::ObjectLocation;
///
/// let loc = ObjectLocation::parse("s3://captures/2024/01/a.pcap").unwrap();
/// assert_eq!(loc.bucket, "captures");
/// assert_eq!(loc.key, "2024/01/a.pcap");
/// assert_eq!(loc.base_name(), "a.pcap");
/// assert_eq!(loc.to_string(), "s3://captures/2024/01/a.pcap");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectLocation {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
        }
    }

    /// Parse an `s3://bucket/key` locator (scheme is case-insensitive).
    ///
    /// # Errors
    /// Returns `SourceError::InvalidLocator` for other schemes or when the
    /// bucket or key is missing.
    pub fn parse(locator: &str) -> Result<Self, SourceError> {
        let invalid = || SourceError::InvalidLocator(locator.to_string());
        if !is_object_path(locator) {
            return Err(invalid());
        }
        let rest = &locator[S3_SCHEME.len()..];
        let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;
        if bucket.is_empty() || key.is_empty() {
            return Err(invalid());
        }
        Ok(Self::new(bucket, key))
    }

    /// Last path segment of the key.
    pub fn base_name(&self) -> &str {
        base_name(&self.key)
    }
}

impl fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{S3_SCHEME}{}/{}", self.bucket, self.key)
    }
}

/// True when `locator` uses the `s3://` scheme.
pub fn is_object_path(locator: &str) -> bool {
    locator
        .get(..S3_SCHEME.len())
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case(S3_SCHEME))
}

/// Last non-empty `/`-separated segment, or `""`.
pub fn base_name(locator: &str) -> &str {
    locator
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("")
}

/// Join a directory-like output location with a file name.
///
/// Works for both local directories and `s3://bucket/prefix` locations.
pub fn join_location(base: &str, name: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), name)
}

/// File name of a local path, as UTF-8.
pub fn file_name(path: &Path) -> Result<&str, SourceError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| SourceError::InvalidLocator(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{ObjectLocation, base_name, file_name, is_object_path, join_location};
    use crate::source::error::SourceError;

    #[test]
    fn scheme_detection_is_case_insensitive() {
        assert!(is_object_path("s3://b/k"));
        assert!(is_object_path("S3://b/k"));
        assert!(!is_object_path("/tmp/s3://b"));
        assert!(!is_object_path("s3:/"));
        assert!(!is_object_path(""));
    }

    #[test]
    fn parse_rejects_incomplete_locators() {
        for locator in ["s3://bucket", "s3://bucket/", "s3:///key", "gs://b/k", "/local"] {
            assert!(
                matches!(ObjectLocation::parse(locator), Err(SourceError::InvalidLocator(_))),
                "locator {locator:?}"
            );
        }
    }

    #[test]
    fn parse_keeps_nested_keys() {
        let loc = ObjectLocation::parse("S3://bucket/a/b/c.pcap").unwrap();
        assert_eq!(loc, ObjectLocation::new("bucket", "a/b/c.pcap"));
        assert_eq!(loc.base_name(), "c.pcap");
    }

    #[test]
    fn base_name_matches_last_segment() {
        assert_eq!(base_name("/a/x.pcap"), "x.pcap");
        assert_eq!(base_name("x.pcap"), "x.pcap");
        assert_eq!(base_name("/a/dir/"), "dir");
        assert_eq!(base_name(""), "");
    }

    #[test]
    fn join_trims_trailing_separator() {
        assert_eq!(join_location("/out/", "x.parquet"), "/out/x.parquet");
        assert_eq!(join_location("s3://b/prefix", "x.parquet"), "s3://b/prefix/x.parquet");
    }

    #[test]
    fn file_name_of_local_path() {
        assert_eq!(file_name(Path::new("/tmp/a.parquet")).unwrap(), "a.parquet");
        assert!(file_name(Path::new("/")).is_err());
    }
}
