//! CSRF token issuance.

use axum::Json;
use axum::extract::State;
use axum::http::HeaderValue;
use axum::http::header::{CACHE_CONTROL, SET_COOKIE};
use axum::response::{IntoResponse, Response};
use tracing::{debug, instrument};

use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::CsrfTokenResponse;
use crate::state::AppState;

/// Issue a fresh CSRF token.
///
/// The token is returned in the body and set as an `HttpOnly` cookie. The
/// client echoes the body value in `x-csrf-token` on mutating requests.
///
/// # Response Body
///
/// ```json
/// { "csrfToken": "9f86d0...", "expiresAt": "2024-01-15T11:30:00Z" }
/// ```
#[instrument(skip(state))]
pub async fn issue_csrf_token(State(state): State<AppState>) -> AppResult<Response> {
    let token = state.guards.csrf.issue(state.clock().now());

    let cookie = HeaderValue::from_str(&state.guards.csrf.cookie_header(&token))
        .map_err(|e| AppError::Internal(format!("CSRF cookie is not a valid header: {e}")))?;

    metrics::record_csrf_token_issued();
    debug!(expires_at = %token.expires_at, "CSRF token issued");

    let body = CsrfTokenResponse {
        csrf_token: token.token,
        expires_at: token.expires_at,
    };

    Ok((
        [
            (SET_COOKIE, cookie),
            (CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
        Json(body),
    )
        .into_response())
}
