use parquet::data_type::Int96;
use time::OffsetDateTime;

use super::layout::{JULIAN_DAY_OF_UNIX_EPOCH, NANOS_PER_DAY};

/// Encode an instant as an Impala-style INT96 timestamp.
///
/// The first two words hold nanoseconds within the day (little-endian), the
/// third holds the Julian day number.
///
/// # Examples
/// ```
/// use postshark_core::sink::int96::to_int96;
/// use time::OffsetDateTime;
///
/// let value = to_int96(OffsetDateTime::UNIX_EPOCH);
/// assert_eq!(value.data(), &[0, 0, 2_440_588]);
/// ```
pub fn to_int96(ts: OffsetDateTime) -> Int96 {
    let nanos = ts.unix_timestamp_nanos();
    let days = nanos.div_euclid(NANOS_PER_DAY);
    let nanos_of_day = nanos.rem_euclid(NANOS_PER_DAY) as u64;
    let julian_day = u32::try_from(days + JULIAN_DAY_OF_UNIX_EPOCH).unwrap_or(0);

    let mut value = Int96::new();
    value.set_data(nanos_of_day as u32, (nanos_of_day >> 32) as u32, julian_day);
    value
}

/// Decode an INT96 timestamp back to Unix nanoseconds.
pub fn int96_to_unix_nanos(value: &Int96) -> i128 {
    let data = value.data();
    let nanos_of_day = (u64::from(data[1]) << 32) | u64::from(data[0]);
    let days = i128::from(data[2]) - JULIAN_DAY_OF_UNIX_EPOCH;
    days * NANOS_PER_DAY + i128::from(nanos_of_day)
}
