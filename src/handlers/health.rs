//! Liveness endpoint.
//!
//! `GET /health` runs through the pipeline like every other route (security
//! headers, method guard) but is never rate limited, so probes keep working
//! while clients are being throttled.

use axum::Json;
use axum::extract::State;
use tracing::instrument;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint.
///
/// # Response Body
///
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0",
///   "uptime_seconds": 3600,
///   "rate_limit_entries": 12,
///   "timestamp": "2024-01-15T10:30:00Z"
/// }
/// ```
#[instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.uptime_seconds(),
        rate_limit_entries: state.guards.limiter.tracked_keys(),
        timestamp: state.clock().now(),
    })
}
