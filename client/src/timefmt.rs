//! Timestamp text for hover labels and player summaries

use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// RFC 3339 text of an epoch-millisecond timestamp, in UTC.
pub fn format_timestamp(millis: u64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(millis as i128 * 1_000_000)
        .ok()
        .and_then(|t| t.format(&Rfc3339).ok())
        .unwrap_or_else(|| millis.to_string())
}

/// Coarse human wording of a duration, e.g. `a few seconds`, `5 minutes`.
pub fn humanize(millis: u64) -> String {
    let seconds = millis as f64 / 1000.0;
    let minutes = seconds / 60.0;
    let hours = minutes / 60.0;
    let days = hours / 24.0;

    if seconds < 45.0 {
        "a few seconds".to_string()
    } else if seconds < 90.0 {
        "a minute".to_string()
    } else if minutes < 45.0 {
        format!("{} minutes", minutes.round() as u64)
    } else if minutes < 90.0 {
        "an hour".to_string()
    } else if hours < 22.0 {
        format!("{} hours", hours.round() as u64)
    } else if hours < 36.0 {
        "a day".to_string()
    } else if days < 26.0 {
        format!("{} days", days.round() as u64)
    } else if days < 45.0 {
        "a month".to_string()
    } else if days < 320.0 {
        format!("{} months", (days / 30.4).round() as u64)
    } else if days < 548.0 {
        "a year".to_string()
    } else {
        format!("{} years", (days / 365.0).round() as u64)
    }
}

/// Age of `then` relative to `now`: `5 minutes ago`, or `in 5 minutes`
/// for timestamps ahead of the local clock.
pub fn from_now(then: u64, now: u64) -> String {
    if then <= now {
        format!("{} ago", humanize(now - then))
    } else {
        format!("in {}", humanize(then - now))
    }
}
