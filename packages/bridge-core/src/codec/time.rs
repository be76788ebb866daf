//! # Timestamp Codec
//!
//! Native timestamps are unsigned seconds since the Unix epoch, UTC.
//! Encoding normalizes to UTC first and never consults the process's local
//! timezone; decoding yields the same absolute instant in local time.

use chrono::{DateTime, Local, TimeZone, Utc};

use crate::error::{Error, Result};

/// Convert any zoned instant to native seconds. Sub-second precision is
/// truncated; instants before the epoch are out of range.
pub fn encode_timestamp<Tz: TimeZone>(t: &DateTime<Tz>) -> Result<u64> {
    let utc = t.with_timezone(&Utc);
    u64::try_from(utc.timestamp()).map_err(|_| {
        Error::TimestampOutOfRange(format!("{} is before the Unix epoch", utc.to_rfc3339()))
    })
}

/// Convert native seconds to a local-time instant
pub fn decode_timestamp(secs: u64) -> Result<DateTime<Local>> {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|utc| utc.with_timezone(&Local))
        .ok_or_else(|| {
            Error::TimestampOutOfRange(format!("{} seconds is beyond the supported range", secs))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    #[test]
    fn test_round_trip_same_instant() {
        let t = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();
        let secs = encode_timestamp(&t).unwrap();
        assert_eq!(secs, 1_709_251_199);
        let back = decode_timestamp(secs).unwrap();
        assert_eq!(back, t);
        assert_eq!(back.timestamp(), t.timestamp());
    }

    #[test]
    fn test_encode_normalizes_offsets() {
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let t = tokyo.with_ymd_and_hms(1970, 1, 1, 9, 0, 10).unwrap();
        assert_eq!(encode_timestamp(&t).unwrap(), 10);

        let local = Local.timestamp_opt(1_000_000, 0).unwrap();
        assert_eq!(encode_timestamp(&local).unwrap(), 1_000_000);
    }

    #[test]
    fn test_encode_truncates_subseconds() {
        let t = Utc.timestamp_opt(42, 999_000_000).unwrap();
        assert_eq!(encode_timestamp(&t).unwrap(), 42);
    }

    #[test]
    fn test_pre_epoch_rejected() {
        let t = Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap();
        assert!(matches!(encode_timestamp(&t), Err(Error::TimestampOutOfRange(_))));
    }

    #[test]
    fn test_decode_out_of_range() {
        assert!(decode_timestamp(u64::MAX).is_err());
        assert_eq!(decode_timestamp(0).unwrap().timestamp(), 0);
    }
}
