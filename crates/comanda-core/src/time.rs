//! # Timestamp Codec
//!
//! Every timestamp is persisted as text in a fixed UTC−5 offset with
//! microsecond precision, whatever the database's own timezone handling:
//!
//! ```text
//! 2026-10-18 09:30:00.123456-05:00
//! ```
//!
//! The format is fixed-width and single-offset, so lexical order equals
//! chronological order and window queries can compare the text directly.
//! [`encode`] and [`decode`] are applied on every write and every read.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};

/// Storage format (chrono strftime).
pub const STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f%:z";

/// UTC−5.
pub const STORAGE_OFFSET: FixedOffset = match FixedOffset::west_opt(5 * 3600) {
    Some(offset) => offset,
    None => panic!("invalid storage offset"),
};

/// Formats an instant for storage.
pub fn encode(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&STORAGE_OFFSET)
        .format(STORAGE_FORMAT)
        .to_string()
}

/// Parses a stored instant. RFC 3339 text is accepted as a fallback for rows
/// written by hand (seeds, manual fixes).
pub fn decode(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    match DateTime::parse_from_str(raw, STORAGE_FORMAT) {
        Ok(ts) => Ok(ts.with_timezone(&Utc)),
        Err(err) => DateTime::parse_from_rfc3339(raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|_| err),
    }
}

/// Drops sub-microsecond precision so in-memory values equal their stored
/// round trip.
pub fn truncate_micros(ts: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = ts.nanosecond();
    ts - Duration::nanoseconds(i64::from(nanos % 1_000))
}

/// Current instant at storage precision.
pub fn now() -> DateTime<Utc> {
    truncate_micros(Utc::now())
}

/// Calendar day of `ts` in the restaurant's local offset.
pub fn local_date(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&STORAGE_OFFSET).date_naive()
}

/// `YYYY-MM-DD` prefix of the stored form of any instant on `date`.
pub fn date_prefix(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Next instant strictly after `now` whose local wall clock reads `at`.
pub fn next_local_time(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let local_now = now.with_timezone(&STORAGE_OFFSET);
    let mut day = local_now.date_naive();
    loop {
        // Fixed offsets have no gaps, so `single()` always resolves.
        if let Some(candidate) = STORAGE_OFFSET.from_local_datetime(&day.and_time(at)).single() {
            if candidate > local_now {
                return candidate.with_timezone(&Utc);
            }
        }
        day = match day.succ_opt() {
            Some(next) => next,
            None => return now,
        };
    }
}

/// Whole minutes between two instants, floored, never negative.
pub fn elapsed_minutes(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - since).num_minutes().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uses_fixed_offset() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 2, 15, 0).unwrap();
        assert_eq!(encode(ts), "2026-02-28 21:15:00.000000-05:00");
    }

    #[test]
    fn test_round_trip_preserves_micros() {
        let ts = truncate_micros(Utc::now());
        assert_eq!(decode(&encode(ts)).unwrap(), ts);
    }

    #[test]
    fn test_decode_rfc3339_fallback() {
        let ts = decode("2026-01-01T05:00:00Z").unwrap();
        assert_eq!(encode(ts), "2026-01-01 00:00:00.000000-05:00");
    }

    #[test]
    fn test_lexical_order_is_chronological() {
        let a = Utc.with_ymd_and_hms(2026, 1, 1, 4, 59, 59).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 1, 1, 5, 0, 0).unwrap();
        assert!(encode(a) < encode(b));
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        let ts = Utc.with_ymd_and_hms(2026, 5, 2, 3, 0, 0).unwrap();
        assert_eq!(local_date(ts), NaiveDate::from_ymd_opt(2026, 5, 1).unwrap());
    }

    #[test]
    fn test_next_local_time() {
        let cutoff = NaiveTime::from_hms_opt(4, 0, 0).unwrap();
        // 08:00 UTC = 03:00 local → same local day at 04:00 = 09:00 UTC
        let now = Utc.with_ymd_and_hms(2026, 5, 2, 8, 0, 0).unwrap();
        assert_eq!(
            next_local_time(now, cutoff),
            Utc.with_ymd_and_hms(2026, 5, 2, 9, 0, 0).unwrap()
        );
        // exactly at cutoff → next day
        let at = Utc.with_ymd_and_hms(2026, 5, 2, 9, 0, 0).unwrap();
        assert_eq!(
            next_local_time(at, cutoff),
            Utc.with_ymd_and_hms(2026, 5, 3, 9, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_elapsed_minutes() {
        let now = Utc::now();
        assert_eq!(elapsed_minutes(now - Duration::seconds(659), now), 10);
        assert_eq!(elapsed_minutes(now + Duration::minutes(1), now), 0);
    }
}
