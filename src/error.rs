use axum::http::header::{ALLOW, RETRY_AFTER};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::middleware::rate_limit::write_rate_limit_headers;

/// Generic message sent to clients for any unexpected failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Message sent with every 429 response.
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests, please try again later.";

/// Application-wide error types with appropriate HTTP status codes.
///
/// Every variant except `Internal` and `Config` describes a condition the
/// client can act on, and its message is returned verbatim. `Internal` and
/// `Config` are logged in full and reported only as a generic 500.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    Validation {
        message: String,
        details: Vec<String>,
    },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Method {method} not allowed")]
    MethodNotAllowed {
        method: Method,
        allowed: Vec<Method>,
    },

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("{0}")]
    UnsupportedMediaType(String),

    #[error("Too many requests, please try again later.")]
    RateLimited {
        limit: u32,
        reset_at_secs: i64,
        retry_after_secs: u64,
    },

    #[error("CSRF token missing")]
    CsrfMissing,

    #[error("Invalid CSRF token")]
    CsrfInvalid,

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl AppError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) | AppError::CsrfMissing | AppError::CsrfInvalid => {
                StatusCode::FORBIDDEN
            }
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Internal(_) | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the error message may be shown to the client.
    fn is_client_facing(&self) -> bool {
        !matches!(self, AppError::Internal(_) | AppError::Config(_))
    }
}

/// Error response body shared by every failure path.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorBody {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            retry_after: None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // Log the full error details server-side but only expose
        // sanitized messages to clients
        if self.is_client_facing() {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        } else {
            tracing::error!(error = %self, "Request failed");
        }

        match self {
            AppError::Validation { message, details } => {
                let body = ErrorBody {
                    details: Some(details),
                    ..ErrorBody::message(message)
                };
                (status, axum::Json(body)).into_response()
            }
            AppError::MethodNotAllowed { ref allowed, .. } => {
                let allow = allow_header_value(allowed);
                let body = ErrorBody::message(self.to_string());
                let mut response = (status, axum::Json(body)).into_response();
                if let Ok(value) = HeaderValue::from_str(&allow) {
                    response.headers_mut().insert(ALLOW, value);
                }
                response
            }
            AppError::RateLimited {
                limit,
                reset_at_secs,
                retry_after_secs,
            } => {
                let body = ErrorBody {
                    retry_after: Some(retry_after_secs),
                    ..ErrorBody::message(RATE_LIMITED_MESSAGE)
                };
                let mut response = (status, axum::Json(body)).into_response();
                let headers = response.headers_mut();
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after_secs));
                // A denied request has used up the window
                write_rate_limit_headers(headers, limit, 0, reset_at_secs);
                response
            }
            AppError::Internal(_) | AppError::Config(_) => {
                (status, axum::Json(ErrorBody::message(INTERNAL_ERROR_MESSAGE))).into_response()
            }
            other => (status, axum::Json(ErrorBody::message(other.to_string()))).into_response(),
        }
    }
}

/// Format an allow-list as the value of an `Allow` header.
pub fn allow_header_value(methods: &[Method]) -> String {
    methods
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_client_errors_expose_message() {
        let response = AppError::NotFound("Venture not found".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({"error": "Venture not found"})
        );
    }

    #[tokio::test]
    async fn test_internal_error_is_sanitized() {
        let response =
            AppError::Internal("connection pool exhausted at db.rs:42".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = body_json(response).await;
        assert_eq!(body["error"], INTERNAL_ERROR_MESSAGE);
        assert!(!body.to_string().contains("db.rs"));
    }

    #[tokio::test]
    async fn test_validation_error_includes_details() {
        let response = AppError::Validation {
            message: "Validation failed".to_string(),
            details: vec!["name is required".to_string()],
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["details"][0], "name is required");
    }

    #[tokio::test]
    async fn test_method_not_allowed_sets_allow_header() {
        let response = AppError::MethodNotAllowed {
            method: Method::DELETE,
            allowed: vec![Method::GET, Method::POST],
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "GET, POST");
        assert_eq!(body_json(response).await["error"], "Method DELETE not allowed");
    }

    #[tokio::test]
    async fn test_rate_limited_response_shape() {
        let response = AppError::RateLimited {
            limit: 2,
            reset_at_secs: 1_700_000_000,
            retry_after_secs: 1,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[RETRY_AFTER], "1");
        assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
        assert_eq!(response.headers()["x-ratelimit-reset"], "1700000000");

        let body = body_json(response).await;
        assert_eq!(body["retryAfter"], 1);
        assert_eq!(body["error"], RATE_LIMITED_MESSAGE);
    }

    #[test]
    fn test_csrf_errors_are_forbidden() {
        assert_eq!(AppError::CsrfMissing.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::CsrfInvalid.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::CsrfMissing.to_string(), "CSRF token missing");
        assert_eq!(AppError::CsrfInvalid.to_string(), "Invalid CSRF token");
    }
}
