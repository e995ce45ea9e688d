//! Date and time input parsing.
//!
//! The engine works on naive wall-clock values only. Offsets in RFC 3339
//! input are dropped, not converted.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::CoreError;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M"];

/// Parses a datetime. A bare date means midnight.
///
/// # Examples
/// ```
/// use cadence_core::datetime::parse_datetime;
///
/// let dt = parse_datetime("2023-01-01").unwrap();
/// assert_eq!(dt.to_string(), "2023-01-01 00:00:00");
/// ```
pub fn parse_datetime(input: &str) -> Result<NaiveDateTime, CoreError> {
    let input = input.trim();

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Ok(dt);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.naive_local());
    }
    if let Ok(date) = parse_date(input) {
        return Ok(date.and_time(NaiveTime::MIN));
    }

    Err(CoreError::InvalidInput(format!(
        "Unrecognized datetime '{}'. Use YYYY-MM-DD or YYYY-MM-DDTHH:MM[:SS]",
        input
    )))
}

pub fn parse_date(input: &str) -> Result<NaiveDate, CoreError> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d").map_err(|_| {
        CoreError::InvalidInput(format!("Unrecognized date '{}'. Use YYYY-MM-DD", input))
    })
}

pub fn parse_time(input: &str) -> Result<NaiveTime, CoreError> {
    let input = input.trim();
    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(input, format).ok())
        .ok_or_else(|| {
            CoreError::InvalidInput(format!("Unrecognized time '{}'. Use HH:MM[:SS]", input))
        })
}
