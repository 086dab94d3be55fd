/*
 * Utility functions and helpers
 */

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use crate::models::{ArbviewError, Result};

/// Timestamps above this are taken to be milliseconds rather than seconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

pub fn unix_to_datetime(value: i64) -> Result<DateTime<Utc>> {
    let parsed = if !(-MILLIS_THRESHOLD..MILLIS_THRESHOLD).contains(&value) {
        Utc.timestamp_millis_opt(value).single()
    } else {
        Utc.timestamp_opt(value, 0).single()
    };
    parsed.ok_or_else(|| ArbviewError::ConfigError(format!("Timestamp out of range: {value}")))
}

/// Accepts unix seconds, unix milliseconds or an RFC 3339 string.
pub fn parse_time_arg(input: &str) -> Result<DateTime<Utc>> {
    let trimmed = input.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return unix_to_datetime(value);
    }
    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ArbviewError::ConfigError(format!("Invalid time {input}: {e}")))
}

pub(crate) fn deserialize_flexible_time<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTime {
        Number(i64),
        Float(f64),
        Text(String),
    }

    match RawTime::deserialize(deserializer)? {
        RawTime::Number(value) => unix_to_datetime(value).map_err(serde::de::Error::custom),
        RawTime::Float(value) => float_to_datetime(value).map_err(serde::de::Error::custom),
        RawTime::Text(text) => parse_time_arg(&text).map_err(serde::de::Error::custom),
    }
}

/// Record ids arrive as strings from the dashboard data and as integers from the backend.
pub(crate) fn deserialize_flexible_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Unsigned(value) => value.to_string(),
        RawId::Signed(value) => value.to_string(),
    })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn float_to_datetime(value: f64) -> Result<DateTime<Utc>> {
    if !value.is_finite() || value.abs() >= i64::MAX as f64 {
        return Err(ArbviewError::ConfigError(format!("Timestamp out of range: {value}")));
    }
    unix_to_datetime(value.trunc() as i64)
}

#[must_use]
pub fn format_usd(value: f64) -> String {
    if value < 0.0 {
        format!("-${:.2}", value.abs())
    } else {
        format!("${value:.2}")
    }
}

#[must_use]
pub fn format_signed_usd(value: f64) -> String {
    if value >= 0.0 {
        format!("+{}", format_usd(value))
    } else {
        format_usd(value)
    }
}

/// Seconds with one decimal, as shown next to a finished task.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    format!("{:.1}s", duration.as_secs_f64())
}

#[must_use]
pub fn format_timestamp(time: &DateTime<Utc>) -> String {
    time.format("%m/%d %H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_seconds_millis_and_rfc3339() {
        let secs = parse_time_arg("1725148800").unwrap();
        let millis = parse_time_arg("1725148800000").unwrap();
        let text = parse_time_arg("2024-09-01T00:00:00Z").unwrap();

        assert_eq!(secs, millis);
        assert_eq!(secs, text);
    }

    #[test]
    fn rejects_garbage_time() {
        assert!(parse_time_arg("yesterday").is_err());
    }

    #[test]
    fn extreme_numeric_times_are_errors() {
        assert!(unix_to_datetime(i64::MIN).is_err());
        assert!(unix_to_datetime(i64::MAX).is_err());
        assert!(float_to_datetime(f64::NAN).is_err());
        assert!(float_to_datetime(-1e30).is_err());
        assert_eq!(float_to_datetime(1_725_148_800.7).unwrap().timestamp(), 1_725_148_800);
    }

    #[test]
    fn price_point_with_extreme_time_fails_to_parse() {
        use crate::models::PricePoint;

        for time in ["-9223372036854775808", "-1e30", "1e300"] {
            let raw = format!(r#"{{"time": {time}, "priceA": 1.0, "priceB": 2.0}}"#);
            assert!(serde_json::from_str::<PricePoint>(&raw).is_err(), "time {time}");
        }
    }

    #[test]
    fn formats_money_and_durations() {
        assert_eq!(format_usd(12.346), "$12.35");
        assert_eq!(format_usd(-3.0), "-$3.00");
        assert_eq!(format_signed_usd(4.5), "+$4.50");
        assert_eq!(format_duration(Duration::from_millis(2400)), "2.4s");
    }
}
