//! Human readable rendering of the marker when it happens to be a timestamp

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

use super::source::Marker;

/// Interpret a marker as a UTC timestamp, if it is one
///
/// Accepts RFC 3339 as well as the bare `%Y-%m-%dT%H:%M:%SZ` form.
pub fn parse_valid_until(marker: &Marker) -> Option<DateTime<Utc>> {
    let raw = marker.as_str().trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%SZ")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Format an instant in the given zone, e.g. `2030-01-01 01:00:00 +01:00`
pub fn format_in<Tz: TimeZone>(instant: DateTime<Utc>, zone: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    instant
        .with_timezone(zone)
        .format("%Y-%m-%d %H:%M:%S %:z")
        .to_string()
}

/// Local-time description of the marker for log output
pub fn describe(marker: &Marker) -> Option<String> {
    parse_valid_until(marker).map(|instant| format_in(instant, &Local))
}
