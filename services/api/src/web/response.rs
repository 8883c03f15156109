//! services/api/src/web/response.rs
//!
//! The JSON envelope every REST handler answers with, and the mapping from
//! core errors to HTTP statuses.

use axum::http::{HeaderMap, StatusCode};
use lesson_core::error::LessonError;
use lesson_core::ports::PortError;
use serde::Serialize;
use tracing::error;

pub const DEVICE_ID_HEADER: &str = "x-device-id";

/// The error half of every handler result.
pub type HandlerError = (StatusCode, String);

/// `{ "success": true, "data": ..., "message": ... }`
#[derive(Serialize, Debug)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: Some(message.into()),
        }
    }
}

/// The device id from the `X-Device-Id` header, if present and non-blank.
pub fn device_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(DEVICE_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn require_device_id(headers: &HeaderMap) -> Result<String, HandlerError> {
    device_id(headers).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            "X-Device-Id header is required".to_string(),
        )
    })
}

pub fn bad_request(message: impl Into<String>) -> HandlerError {
    (StatusCode::BAD_REQUEST, message.into())
}

pub fn port_status(e: &PortError) -> StatusCode {
    match e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        PortError::Conflict(_) => StatusCode::CONFLICT,
        PortError::Provider { .. } => StatusCode::BAD_GATEWAY,
        PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn lesson_status(e: &LessonError) -> StatusCode {
    match e {
        LessonError::Generation { .. } => StatusCode::BAD_GATEWAY,
        LessonError::Synthesis(port) | LessonError::Storage(port) => match port {
            PortError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        },
        LessonError::Persistence(port) => port_status(port),
        LessonError::AlreadyRunning(_) => StatusCode::CONFLICT,
    }
}

/// Logs `e` and turns it into a response. Server-side failures hide their
/// details behind `context`.
pub fn port_error(context: &str, e: PortError) -> HandlerError {
    let status = port_status(&e);
    respond(context, status, &e)
}

pub fn lesson_error(context: &str, e: LessonError) -> HandlerError {
    let status = lesson_status(&e);
    respond(context, status, &e)
}

fn respond(context: &str, status: StatusCode, e: &dyn std::fmt::Display) -> HandlerError {
    if status.is_server_error() {
        error!(error = %e, "{}", context);
        (status, context.to_string())
    } else {
        (status, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use lesson_core::error::GenerationError;

    #[test]
    fn blank_device_ids_are_ignored() {
        let mut headers = HeaderMap::new();
        assert_eq!(device_id(&headers), None);
        headers.insert(DEVICE_ID_HEADER, HeaderValue::from_static("  "));
        assert_eq!(device_id(&headers), None);
        headers.insert(DEVICE_ID_HEADER, HeaderValue::from_static("tab-1"));
        assert_eq!(device_id(&headers).as_deref(), Some("tab-1"));
    }

    #[test]
    fn statuses_follow_the_error_kind() {
        assert_eq!(
            lesson_status(&LessonError::Persistence(PortError::NotFound("x".into()))),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            lesson_status(&LessonError::Generation {
                attempts: 5,
                source: GenerationError::Malformed("x".into()),
            }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(lesson_status(&LessonError::AlreadyRunning(1)), StatusCode::CONFLICT);
    }

    #[test]
    fn server_errors_hide_their_details() {
        let (status, body) = port_error(
            "Failed to load lesson",
            PortError::Unexpected("connection reset by peer".into()),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Failed to load lesson");
    }
}
