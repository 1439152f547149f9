//! `Retry-After` header parsing
//!
//! The header carries either a number of seconds or an HTTP-date. Hints
//! longer than an hour are ignored; the channel's own backoff applies then.

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::warn;

/// Longest server hint honored
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Parses a `Retry-After` value.
///
/// Returns `None` for unparsable values, dates in the past and hints
/// longer than [`MAX_RETRY_AFTER`].
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<u64>() {
        let hint = Duration::from_secs(seconds);
        return (hint <= MAX_RETRY_AFTER).then_some(hint);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        return diff
            .to_std()
            .ok()
            .filter(|hint| *hint <= MAX_RETRY_AFTER);
    }

    warn!(value, "Could not parse Retry-After header");
    None
}

/// Reads and parses the `Retry-After` header of a response
pub fn from_headers(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_retry_after)
}
