//! Field extraction from dissected packets into output rows.
//!
//! Everything here is pure and infallible: malformed per-field input degrades
//! to a default value instead of failing the capture.

use time::OffsetDateTime;

use crate::record::{DissectedPacketRecord, OutputRow};

const NANOS_PER_SECOND: i128 = 1_000_000_000;
const FRACTION_DIGITS: usize = 9;

/// Map one dissected record to an output row.
///
/// # Examples
/// ```
/// use postshark_core::{DissectedPacketRecord, extract_row};
///
/// let json = r#"{"_source":{"layers":{
///     "frame.time_epoch":["1700000000.5"],
///     "http.request.method":["POST"],
///     "http.user_agent":["MyClient/1.2 (test)"]
/// }}}"#;
/// let record: DissectedPacketRecord = serde_json::from_str(json).unwrap();
/// let row = extract_row(&record, "capture.pcap");
/// assert_eq!(row.caller, "MyClient");
/// assert_eq!(row.timestamp.nanosecond(), 500_000_000);
/// assert_eq!(row.referer, "");
/// ```
pub fn extract_row(record: &DissectedPacketRecord, filename: &str) -> OutputRow {
    let layers = &record.source.layers;
    let user_agent = first_or_empty(&layers.user_agent);

    OutputRow {
        filename: filename.to_string(),
        timestamp: parse_epoch(first_or_empty(&layers.timestamp)),
        forwarded_for: first_or_empty(&layers.forwarded_for).to_string(),
        caller: derive_caller(user_agent).to_string(),
        user_agent: user_agent.to_string(),
        referer: first_or_empty(&layers.referer).to_string(),
        uri: first_or_empty(&layers.uri).to_string(),
        query: first_or_empty(&layers.data).to_string(),
    }
}

/// First element of a singleton-or-absent field, or `""`.
pub fn first_or_empty(values: &[String]) -> &str {
    values.first().map(String::as_str).unwrap_or("")
}

/// Caller identity: the user agent up to its first `/`.
///
/// # Examples
/// ```
/// use postshark_core::derive_caller;
///
/// assert_eq!(derive_caller("MyClient/1.2 (test)"), "MyClient");
/// assert_eq!(derive_caller("curl"), "curl");
/// assert_eq!(derive_caller(""), "");
/// ```
pub fn derive_caller(user_agent: &str) -> &str {
    user_agent
        .split_once('/')
        .map(|(product, _)| product)
        .unwrap_or(user_agent)
}

/// Parse a `frame.time_epoch` value into an instant.
///
/// Unparsable or out-of-range input maps to the Unix epoch.
///
/// # Examples
/// ```
/// use postshark_core::parse_epoch;
/// use time::OffsetDateTime;
///
/// let ts = parse_epoch("1700000000.5");
/// assert_eq!(ts.unix_timestamp(), 1_700_000_000);
/// assert_eq!(ts.nanosecond(), 500_000_000);
/// assert_eq!(parse_epoch("garbage"), OffsetDateTime::UNIX_EPOCH);
/// ```
pub fn parse_epoch(raw: &str) -> OffsetDateTime {
    let raw = raw.trim();
    parse_decimal_nanos(raw)
        .or_else(|| parse_float_nanos(raw))
        .and_then(|nanos| OffsetDateTime::from_unix_timestamp_nanos(nanos).ok())
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
}

// Exact path for the plain `seconds.fraction` form tshark emits.
fn parse_decimal_nanos(raw: &str) -> Option<i128> {
    let (negative, unsigned) = match raw.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, raw.strip_prefix('+').unwrap_or(raw)),
    };
    let (whole, fraction) = unsigned.split_once('.').unwrap_or((unsigned, ""));
    if whole.is_empty() && fraction.is_empty() {
        return None;
    }
    if !whole.bytes().all(|b| b.is_ascii_digit()) || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return None;
    }

    let seconds: i128 = if whole.is_empty() { 0 } else { whole.parse().ok()? };
    let mut fraction_nanos: i128 = 0;
    for (idx, digit) in fraction.bytes().take(FRACTION_DIGITS).enumerate() {
        let scale = 10i128.pow((FRACTION_DIGITS - 1 - idx) as u32);
        fraction_nanos += i128::from(digit - b'0') * scale;
    }

    let nanos = seconds.checked_mul(NANOS_PER_SECOND)?.checked_add(fraction_nanos)?;
    Some(if negative { -nanos } else { nanos })
}

// Fallback for exponent notation and the like.
fn parse_float_nanos(raw: &str) -> Option<i128> {
    let value: f64 = raw.parse().ok()?;
    if !value.is_finite() || value.abs() > i64::MAX as f64 {
        return None;
    }
    let seconds = value.trunc();
    let fraction = value - seconds;
    Some(seconds as i128 * NANOS_PER_SECOND + (fraction * 1e9) as i128)
}
