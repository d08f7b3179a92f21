//! HL7 timestamp parsing.
//!
//! HL7 v2 carries timestamps in the TS format `yyyyMMddHHmmss` (optionally
//! shorter, optionally with a fractional part and a `+hhmm`/`-hhmm` timezone
//! suffix) and dates in the DT format `yyyyMMdd`. These helpers convert them
//! to chrono types for the FHIR side of the bridge.
//!
//! Timezone offsets are stripped rather than applied: the source systems this
//! bridge was built for emit local timestamps with an unreliable offset, and
//! the original behaviour is preserved.

use chrono::{NaiveDate, NaiveDateTime};

/// Parses an HL7 TS value into a naive datetime.
///
/// Values shorter than 14 digits are right-padded with zeros, so `20240101`
/// becomes midnight on that day. Returns `None` for empty or unparseable
/// input.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if value.is_empty() {
        return None;
    }

    // Strip fractional seconds and timezone suffix.
    let clean: &str = value
        .split(['+', '-', '.'])
        .next()
        .unwrap_or(value);

    if clean.is_empty() || !clean.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut padded = clean.to_owned();
    while padded.len() < 14 {
        padded.push('0');
    }

    NaiveDateTime::parse_from_str(&padded[..14], "%Y%m%d%H%M%S").ok()
}

/// Parses an HL7 DT value into a naive date.
///
/// Only the first 8 digits are considered, so a full TS value parses as its
/// date part. Returns `None` for empty or unparseable input.
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    // get() rather than indexing: byte 8 of a multibyte value need not be a
    // char boundary.
    let clean = value.get(..8)?;
    if !clean.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(clean, "%Y%m%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn parses_full_timestamp() {
        let dt = parse_datetime("20240101120000").expect("valid timestamp");
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 1));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (12, 0, 0));
    }

    #[test]
    fn pads_short_timestamps() {
        let dt = parse_datetime("202401011230").expect("valid timestamp");
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (12, 30, 0));

        let midnight = parse_datetime("20240101").expect("valid timestamp");
        assert_eq!((midnight.hour(), midnight.minute()), (0, 0));
    }

    #[test]
    fn strips_timezone_suffix() {
        let dt = parse_datetime("20240101120000-0500").expect("valid timestamp");
        assert_eq!(dt.hour(), 12);
        let dt = parse_datetime("20240101120000+1000").expect("valid timestamp");
        assert_eq!(dt.hour(), 12);
    }

    #[test]
    fn strips_fractional_seconds() {
        let dt = parse_datetime("20240101120000.1234").expect("valid timestamp");
        assert_eq!(dt.second(), 0);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_datetime("").is_none());
        assert!(parse_datetime("not-a-date").is_none());
        assert!(parse_datetime("2024AB01").is_none());
        assert!(parse_datetime("20241301120000").is_none());
    }

    #[test]
    fn parses_date_from_ts_prefix() {
        let date = parse_date("19800115093000").expect("valid date");
        assert_eq!((date.year(), date.month(), date.day()), (1980, 1, 15));
    }

    #[test]
    fn rejects_short_or_invalid_dates() {
        assert!(parse_date("").is_none());
        assert!(parse_date("1980").is_none());
        assert!(parse_date("19800230").is_none());
    }

    #[test]
    fn rejects_multibyte_input_without_panicking() {
        // Nine bytes, three chars; byte 8 is mid-character.
        assert!(parse_date("€€€").is_none());
        assert!(parse_date("19€80115").is_none());
        assert!(parse_datetime("€€€€€").is_none());
    }
}
