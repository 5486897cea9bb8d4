//! CSRF protection using the double-submit cookie pattern.
//!
//! # Flow
//!
//! 1. The client calls the issuance endpoint (`GET /api/csrf-token`)
//! 2. The response sets an `HttpOnly` `csrf-token` cookie and returns the
//!    same value as `{"csrfToken": "..."}`
//! 3. Client-side script echoes the value in the `x-csrf-token` header of
//!    every mutating request
//! 4. The guard accepts the request only if header and cookie are present
//!    and equal
//!
//! A cross-site attacker can make the browser send the cookie but cannot
//! read it, so it cannot produce the matching header.
//!
//! # Scope
//!
//! - No server-side record of issued tokens is kept; validity rests on
//!   header/cookie equality and the cookie's own expiry
//! - GET and HEAD requests are never validated
//! - Comparison is constant-time (`subtle`)

use std::time::Duration;

use axum::http::header::COOKIE;
use axum::http::Request;
use chrono::{DateTime, TimeDelta, Utc};
use rand::RngCore;
use serde::Serialize;
use subtle::ConstantTimeEq;

use super::method::is_mutating;
use crate::error::{AppError, AppResult};

/// Cookie carrying the token.
pub const CSRF_COOKIE_NAME: &str = "csrf-token";

/// Request header the client echoes the token in.
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Random bytes per token (256 bits).
const TOKEN_BYTES: usize = 32;

/// `Expires` attribute format (IMF-fixdate).
const COOKIE_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// A freshly issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsrfToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues and validates CSRF tokens.
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    ttl: TimeDelta,
    secure_cookie: bool,
}

impl Default for CsrfGuard {
    fn default() -> Self {
        Self {
            ttl: TimeDelta::hours(1),
            secure_cookie: false,
        }
    }
}

impl CsrfGuard {
    /// Create a guard issuing tokens valid for `ttl`.
    ///
    /// `secure_cookie` adds the `Secure` attribute; enable it in production.
    pub fn new(ttl: Duration, secure_cookie: bool) -> AppResult<Self> {
        if ttl.is_zero() {
            return Err(AppError::Config(
                "CSRF token TTL must be greater than 0".to_string(),
            ));
        }
        let ttl = TimeDelta::from_std(ttl)
            .map_err(|_| AppError::Config("CSRF token TTL is too large".to_string()))?;

        Ok(Self { ttl, secure_cookie })
    }

    /// Generate a new token expiring `ttl` after `now`.
    pub fn issue(&self, now: DateTime<Utc>) -> CsrfToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rng().fill_bytes(&mut bytes);
        let token = bytes.iter().map(|b| format!("{b:02x}")).collect();

        CsrfToken {
            token,
            expires_at: now + self.ttl,
        }
    }

    /// `Set-Cookie` header value delivering `token`.
    pub fn cookie_header(&self, token: &CsrfToken) -> String {
        let mut cookie = format!(
            "{CSRF_COOKIE_NAME}={}; HttpOnly; SameSite=Strict; Path=/; Expires={}",
            token.token,
            token.expires_at.format(COOKIE_DATE_FORMAT)
        );
        if self.secure_cookie {
            cookie.push_str("; Secure");
        }
        cookie
    }

    /// Check a header token against a cookie token.
    ///
    /// # Errors
    ///
    /// - `CsrfMissing` if either side is absent or empty
    /// - `CsrfInvalid` if both are present but differ
    pub fn validate(header: Option<&str>, cookie: Option<&str>) -> AppResult<()> {
        let (Some(header), Some(cookie)) = (
            header.filter(|h| !h.is_empty()),
            cookie.filter(|c| !c.is_empty()),
        ) else {
            return Err(AppError::CsrfMissing);
        };

        if constant_time_eq(header, cookie) {
            Ok(())
        } else {
            Err(AppError::CsrfInvalid)
        }
    }

    /// Validate the tokens carried by `req`.
    ///
    /// Requests whose method is GET or HEAD always pass.
    pub fn validate_request<B>(&self, req: &Request<B>) -> AppResult<()> {
        if !is_mutating(req.method()) {
            return Ok(());
        }

        let header = req
            .headers()
            .get(CSRF_HEADER_NAME)
            .and_then(|value| value.to_str().ok())
            .map(str::trim);
        let cookie = cookie_value(req, CSRF_COOKIE_NAME);

        Self::validate(header, cookie)
    }
}

/// Find cookie `name` across all `Cookie` headers of a request.
pub fn cookie_value<'a, B>(req: &'a Request<B>, name: &str) -> Option<&'a str> {
    req.headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
}

/// Constant-time string comparison.
///
/// Length mismatches return early; token length is public anyway.
fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
