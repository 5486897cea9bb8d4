use chrono::{DateTime, Utc};
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the process serves requests
    pub status: String,
    /// Crate version
    pub version: String,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// Rate-limit keys currently tracked
    pub rate_limit_entries: usize,
    /// Response timestamp
    pub timestamp: DateTime<Utc>,
}

/// Body of `GET /api/csrf-token`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsrfTokenResponse {
    pub csrf_token: String,
    pub expires_at: DateTime<Utc>,
}
