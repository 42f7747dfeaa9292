use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{DashError, DashResult};

const NAIVE_TIMESTAMP_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

pub fn decimal_to_f64(value: Decimal, field_name: &str) -> DashResult<f64> {
    value.to_f64().ok_or_else(|| {
        DashError::InvalidData(format!("{field_name} cannot be represented as f64"))
    })
}

#[must_use]
pub fn datetime_to_unix_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub fn unix_millis_to_datetime(millis: i64) -> DashResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| DashError::InvalidData(format!("timestamp {millis}ms is out of range")))
}

/// Parses the timestamp spellings a rendered table hands back for date cells.
///
/// Naive values (no offset) are read as UTC.
#[must_use]
pub fn parse_timestamp(input: &str) -> Option<DateTime<Utc>> {
    let trimmed = input.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_TIMESTAMP_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(trimmed, format)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

/// Parses a numeric cell typed as text without going through binary float parsing.
#[must_use]
pub fn parse_decimal_number(input: &str) -> Option<f64> {
    Decimal::from_str(input.trim())
        .ok()
        .and_then(|value| decimal_to_f64(value, "number").ok())
}
