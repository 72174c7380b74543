//! Epoch and timestamp helpers.

use chrono::{Local, TimeZone, Utc};

/// Current time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render an epoch-milliseconds instant as UTC, `MM/DD/YYYY HH:MM:SS UTC`.
pub fn format_utc_ms(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%m/%d/%Y %H:%M:%S UTC").to_string(),
        None => format!("epoch-ms {ms}"),
    }
}

/// Render an epoch-milliseconds instant as an ISO-8601 UTC string with
/// millisecond precision, e.g. `2024-06-01T12:30:45.123Z`.
pub fn iso8601_utc_ms(ms: i64) -> String {
    match Utc.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        None => format!("epoch-ms {ms}"),
    }
}

/// Local-time ISO prefix prepended to raw access log lines, microsecond
/// precision.
pub fn local_iso_ms(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        None => format!("epoch-ms {ms}"),
    }
}

/// Local-time ISO prefix for admin events, whole seconds.
pub fn local_iso_secs(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
        None => format!("epoch-ms {ms}"),
    }
}

/// Current UTC time in RFC 3339 form, used for dated row annotations.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_utc() {
        // 2024-06-01 12:30:45 UTC
        assert_eq!(format_utc_ms(1_717_245_045_000), "06/01/2024 12:30:45 UTC");
    }

    #[test]
    fn formats_iso8601_with_millis() {
        assert_eq!(
            iso8601_utc_ms(1_717_245_045_123),
            "2024-06-01T12:30:45.123Z"
        );
    }

    #[test]
    fn out_of_range_is_not_a_panic() {
        assert!(format_utc_ms(i64::MAX).contains("epoch-ms"));
    }
}
