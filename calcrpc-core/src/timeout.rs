//! `connect-timeout-ms` parsing and computation.
//!
//! Clients announce their deadline as a relative timeout in milliseconds.
//! The server combines it with its own configured limit.

use std::time::Duration;

/// Header name for the call timeout in milliseconds.
pub const TIMEOUT_HEADER: &str = "connect-timeout-ms";

/// Largest timeout that fits the header (10 digits).
const MAX_TIMEOUT_MS: u128 = 9_999_999_999;

/// Parse a timeout milliseconds string.
///
/// Returns `Some(Duration)` for valid positive values,
/// or `None` for invalid values or 0 (which means no timeout).
pub fn parse_timeout_ms(value: &str) -> Option<Duration> {
    if value.is_empty() || value.len() > 10 {
        return None;
    }
    let ms: u64 = value.parse().ok()?;
    if ms == 0 {
        None
    } else {
        Some(Duration::from_millis(ms))
    }
}

/// Format a duration for the timeout header.
///
/// Sub-millisecond durations round up to 1ms so an almost-expired deadline
/// is still sent as a deadline. Returns `None` when the value does not fit.
pub fn duration_to_timeout_header(duration: Duration) -> Option<String> {
    let mut millis = duration.as_millis();
    if millis == 0 && !duration.is_zero() {
        millis = 1;
    }
    if millis == 0 || millis > MAX_TIMEOUT_MS {
        return None;
    }
    Some(millis.to_string())
}

/// Compute the effective timeout from server and client timeouts.
///
/// The smaller timeout always wins. Returns `None` if neither is set.
pub fn compute_effective_timeout(
    server_timeout: Option<Duration>,
    client_timeout: Option<Duration>,
) -> Option<Duration> {
    match (server_timeout, client_timeout) {
        (Some(server), Some(client)) => Some(server.min(client)),
        (Some(server), None) => Some(server),
        (None, client) => client,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timeout_ms_valid() {
        assert_eq!(parse_timeout_ms("1000"), Some(Duration::from_millis(1000)));
        assert_eq!(parse_timeout_ms("5000"), Some(Duration::from_millis(5000)));
    }

    #[test]
    fn test_parse_timeout_ms_zero() {
        assert_eq!(parse_timeout_ms("0"), None);
    }

    #[test]
    fn test_parse_timeout_ms_invalid() {
        assert_eq!(parse_timeout_ms("abc"), None);
        assert_eq!(parse_timeout_ms("-1"), None);
        assert_eq!(parse_timeout_ms(""), None);
        assert_eq!(parse_timeout_ms("12345678901"), None);
    }

    #[test]
    fn test_duration_to_timeout_header() {
        assert_eq!(
            duration_to_timeout_header(Duration::from_secs(30)),
            Some("30000".to_string())
        );
        assert_eq!(
            duration_to_timeout_header(Duration::from_micros(10)),
            Some("1".to_string())
        );
        assert_eq!(
            duration_to_timeout_header(Duration::from_millis(9_999_999_999)),
            Some("9999999999".to_string())
        );
        assert_eq!(
            duration_to_timeout_header(Duration::from_millis(10_000_000_000)),
            None
        );
        assert_eq!(duration_to_timeout_header(Duration::ZERO), None);
    }

    #[test]
    fn test_compute_effective_timeout() {
        let short = Some(Duration::from_secs(5));
        let long = Some(Duration::from_secs(10));

        assert_eq!(compute_effective_timeout(short, long), short);
        assert_eq!(compute_effective_timeout(long, short), short);
        assert_eq!(compute_effective_timeout(short, None), short);
        assert_eq!(compute_effective_timeout(None, short), short);
        assert_eq!(compute_effective_timeout(None, None), None);
    }
}
