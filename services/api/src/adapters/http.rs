//! services/api/src/adapters/http.rs
//!
//! Helpers shared by the adapters that talk to providers over plain HTTP.

use chrono::{DateTime, Utc};
use lesson_core::ports::PortError;
use reqwest::header::RETRY_AFTER;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("lesson-api/", env!("CARGO_PKG_VERSION"));

/// Builds a client with the shared user agent and a request timeout.
pub fn client(timeout: Duration) -> Result<reqwest::Client, PortError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| PortError::Unexpected(e.to_string()))
}

/// Transport failures (timeouts, refused connections) carry no provider status
/// and are not retried.
pub fn transport_error(e: reqwest::Error) -> PortError {
    if e.is_timeout() {
        PortError::Unexpected(format!("request timed out: {}", e))
    } else {
        PortError::Unexpected(e.to_string())
    }
}

/// Reads a `retry-after` value given either as delta seconds or as an
/// HTTP-date. A date in the past means "retry now".
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Turns a non-success response into `PortError::Provider`, keeping the
/// provider's `retry-after` delay when there is one.
pub async fn provider_error(response: reqwest::Response) -> PortError {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, Utc::now()));
    let message = response.text().await.unwrap_or_default();
    PortError::Provider {
        status,
        message,
        retry_after,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn retry_after_accepts_seconds_and_http_dates() {
        let now = Utc.with_ymd_and_hms(2015, 10, 21, 7, 27, 30).unwrap();
        assert_eq!(parse_retry_after(" 120 ", now), Some(Duration::from_secs(120)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT", now),
            Some(Duration::from_secs(30))
        );
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:00:00 GMT", now),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon", now), None);
    }
}
