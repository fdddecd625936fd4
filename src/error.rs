//! Error payloads returned to API callers
//!
//! Every failure in the request pipeline ends up as an [`ErrorPayload`]: a
//! machine-readable [`ErrorKind`] tag plus an optional human-readable detail.
//! The kind alone decides the HTTP status code, so a payload replayed from
//! the cache carries the same status it was first served with.

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Enumerated failure tags exposed on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// City parameter is blank or too long
    InvalidCity,
    /// No provider credential is configured
    NoApiKey,
    /// Provider unreachable after all retries
    FetchFailed,
    /// Provider reports no such city
    NotFound,
    /// Provider answered with an unexpected status code
    UpstreamError,
    /// Provider body is not valid JSON
    InvalidResponse,
    /// A required field is missing or not numeric
    InvalidData,
    /// Anything else
    InternalError,
}

impl ErrorKind {
    /// HTTP status code served for this kind of failure
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::InvalidCity => StatusCode::BAD_REQUEST,
            ErrorKind::NoApiKey => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::FetchFailed => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::UpstreamError => StatusCode::BAD_GATEWAY,
            ErrorKind::InvalidResponse => StatusCode::BAD_GATEWAY,
            ErrorKind::InvalidData => StatusCode::BAD_GATEWAY,
            ErrorKind::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether an outcome of this kind is stored in the negative cache
    ///
    /// Only upstream conditions are cached. Bad input and misconfiguration
    /// are answered again on every request.
    pub fn is_cacheable(self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound | ErrorKind::UpstreamError | ErrorKind::FetchFailed
        )
    }

    /// Wire tag, e.g. `"not_found"`
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidCity => "invalid_city",
            ErrorKind::NoApiKey => "no_api_key",
            ErrorKind::FetchFailed => "fetch_failed",
            ErrorKind::NotFound => "not_found",
            ErrorKind::UpstreamError => "upstream_error",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::InvalidData => "invalid_data",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error body, e.g. `{"error": "not_found", "detail": "city not found"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{error}{}", .detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct ErrorPayload {
    /// Failure tag
    pub error: ErrorKind,
    /// Optional explanation for humans
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ErrorPayload {
    /// Creates a payload with a detail message
    pub fn new(error: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            error,
            detail: Some(detail.into()),
        }
    }

    /// Creates a payload carrying only the tag
    pub fn bare(error: ErrorKind) -> Self {
        Self {
            error,
            detail: None,
        }
    }

    /// HTTP status code for this payload
    pub fn status(&self) -> StatusCode {
        self.error.status()
    }
}

impl IntoResponse for ErrorPayload {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_match_kinds() {
        assert_eq!(ErrorKind::InvalidCity.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::NoApiKey.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(ErrorKind::FetchFailed.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::UpstreamError.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorKind::InvalidResponse.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorKind::InvalidData.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorKind::InternalError.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_only_upstream_failures_are_cacheable() {
        assert!(ErrorKind::NotFound.is_cacheable());
        assert!(ErrorKind::UpstreamError.is_cacheable());
        assert!(ErrorKind::FetchFailed.is_cacheable());

        assert!(!ErrorKind::InvalidCity.is_cacheable());
        assert!(!ErrorKind::NoApiKey.is_cacheable());
        assert!(!ErrorKind::InvalidResponse.is_cacheable());
        assert!(!ErrorKind::InvalidData.is_cacheable());
        assert!(!ErrorKind::InternalError.is_cacheable());
    }

    #[test]
    fn test_payload_serializes_snake_case_tag() {
        let payload = ErrorPayload::new(ErrorKind::FetchFailed, "connection refused");
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["error"], "fetch_failed");
        assert_eq!(json["detail"], "connection refused");
    }

    #[test]
    fn test_payload_omits_missing_detail() {
        let json = serde_json::to_string(&ErrorPayload::bare(ErrorKind::NoApiKey)).unwrap();
        assert_eq!(json, r#"{"error":"no_api_key"}"#);
    }

    #[test]
    fn test_display_includes_detail() {
        let payload = ErrorPayload::new(ErrorKind::NotFound, "city not found");
        assert_eq!(payload.to_string(), "not_found: city not found");
        assert_eq!(ErrorPayload::bare(ErrorKind::InvalidCity).to_string(), "invalid_city");
    }

    #[test]
    fn test_as_str_agrees_with_serde() {
        for kind in [
            ErrorKind::InvalidCity,
            ErrorKind::NoApiKey,
            ErrorKind::FetchFailed,
            ErrorKind::NotFound,
            ErrorKind::UpstreamError,
            ErrorKind::InvalidResponse,
            ErrorKind::InvalidData,
            ErrorKind::InternalError,
        ] {
            let json = serde_json::to_value(kind).unwrap();
            assert_eq!(json, kind.as_str());
        }
    }
}
