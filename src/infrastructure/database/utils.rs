//! Database utility functions
//!
//! Common utilities for database operations including datetime handling.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};

/// Format a timestamp for storage.
///
/// Fixed nanosecond precision keeps stored values lexicographically ordered.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Parse datetime from multiple formats (RFC3339 and SQLite default format)
///
/// Supports:
/// - RFC3339: "2025-10-29T17:28:13Z", "2025-10-29T17:28:13+00:00"
/// - SQLite default: "2025-10-29 17:28:13"
/// - ISO 8601 without timezone: "2025-10-29T17:28:13"
pub fn parse_datetime(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    if let Ok(naive_dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive_dt, Utc));
    }

    if let Ok(naive_dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive_dt, Utc));
    }

    // Report the RFC3339 error if every format fails
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// Parse an optional stored timestamp.
pub fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, chrono::ParseError> {
    s.as_deref().map(parse_datetime).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse_datetime("2025-10-29T17:28:13Z").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-10-29T17:28:13+00:00");
    }

    #[test]
    fn test_parse_sqlite_format() {
        let dt = parse_datetime("2025-10-29 17:28:13").unwrap();
        assert_eq!(dt.to_rfc3339(), "2025-10-29T17:28:13+00:00");
    }

    #[test]
    fn test_parse_invalid_format() {
        assert!(parse_datetime("invalid datetime").is_err());
        assert!(parse_datetime("").is_err());
    }

    #[test]
    fn test_format_round_trips_and_sorts() {
        let early = parse_datetime("2025-10-29T17:28:13Z").unwrap();
        let late = early + chrono::Duration::milliseconds(500);

        assert_eq!(parse_datetime(&format_datetime(&late)).unwrap(), late);
        assert!(format_datetime(&early) < format_datetime(&late));
    }

    #[test]
    fn test_parse_optional() {
        assert_eq!(parse_optional_datetime(None).unwrap(), None);
        assert!(parse_optional_datetime(Some("2025-10-29 17:28:13".into()))
            .unwrap()
            .is_some());
    }
}
