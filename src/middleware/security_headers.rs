//! Fixed security response headers.
//!
//! Stamped onto every pipeline response, including early rejections.
//! Headers the handler sets itself are left alone.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::error::{AppError, AppResult};

/// Content-Security-Policy used when none is configured.
pub const DEFAULT_CONTENT_SECURITY_POLICY: &str = "default-src 'self'; \
     script-src 'self' 'unsafe-inline'; \
     style-src 'self' 'unsafe-inline'; \
     img-src 'self' data: https:; \
     font-src 'self' data:; \
     connect-src 'self'; \
     frame-ancestors 'none'; \
     base-uri 'self'; \
     form-action 'self'";

/// Permissions-Policy value.
pub const PERMISSIONS_POLICY: &str = "camera=(), microphone=(), geolocation=(), interest-cohort=()";

/// Strict-Transport-Security value, production only.
pub const HSTS_POLICY: &str = "max-age=31536000; includeSubDomains";

/// Prepared security header set.
#[derive(Debug, Clone)]
pub struct SecurityHeaders {
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl Default for SecurityHeaders {
    fn default() -> Self {
        Self {
            headers: base_headers(HeaderValue::from_static(DEFAULT_CONTENT_SECURITY_POLICY)),
        }
    }
}

impl SecurityHeaders {
    /// Build the header set.
    ///
    /// `production` adds `Strict-Transport-Security`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `content_security_policy` is not a valid
    /// header value.
    pub fn new(content_security_policy: &str, production: bool) -> AppResult<Self> {
        let csp = HeaderValue::from_str(content_security_policy).map_err(|e| {
            AppError::Config(format!("Invalid CONTENT_SECURITY_POLICY: {e}"))
        })?;

        let mut headers = base_headers(csp);
        if production {
            headers.push((
                HeaderName::from_static("strict-transport-security"),
                HeaderValue::from_static(HSTS_POLICY),
            ));
        }

        Ok(Self { headers })
    }

    /// Insert every header not already present in `headers`.
    pub fn apply(&self, headers: &mut HeaderMap) {
        for (name, value) in &self.headers {
            if !headers.contains_key(name) {
                headers.insert(name.clone(), value.clone());
            }
        }
    }
}

fn base_headers(csp: HeaderValue) -> Vec<(HeaderName, HeaderValue)> {
    vec![
        (
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ),
        (
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ),
        (
            HeaderName::from_static("x-xss-protection"),
            HeaderValue::from_static("1; mode=block"),
        ),
        (
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ),
        (
            HeaderName::from_static("permissions-policy"),
            HeaderValue::from_static(PERMISSIONS_POLICY),
        ),
        (HeaderName::from_static("content-security-policy"), csp),
    ]
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_set() {
        let mut headers = HeaderMap::new();
        SecurityHeaders::default().apply(&mut headers);

        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
        assert_eq!(headers["x-xss-protection"], "1; mode=block");
        assert_eq!(headers["referrer-policy"], "strict-origin-when-cross-origin");
        assert_eq!(headers["permissions-policy"], PERMISSIONS_POLICY);
        assert_eq!(
            headers["content-security-policy"],
            DEFAULT_CONTENT_SECURITY_POLICY
        );
        assert!(!headers.contains_key("strict-transport-security"));
    }

    #[test]
    fn test_production_adds_hsts() {
        let security = SecurityHeaders::new(DEFAULT_CONTENT_SECURITY_POLICY, true).unwrap();
        let mut headers = HeaderMap::new();
        security.apply(&mut headers);

        assert_eq!(headers["strict-transport-security"], HSTS_POLICY);
        assert_eq!(headers.len(), 7);
    }

    #[test]
    fn test_existing_headers_are_kept() {
        let mut headers = HeaderMap::new();
        headers.insert("x-frame-options", HeaderValue::from_static("SAMEORIGIN"));
        SecurityHeaders::default().apply(&mut headers);

        assert_eq!(headers["x-frame-options"], "SAMEORIGIN");
    }

    #[test]
    fn test_custom_csp() {
        let security = SecurityHeaders::new("default-src 'none'", false).unwrap();
        let mut headers = HeaderMap::new();
        security.apply(&mut headers);
        assert_eq!(headers["content-security-policy"], "default-src 'none'");
    }

    #[test]
    fn test_invalid_csp_rejected() {
        assert!(SecurityHeaders::new("bad\nvalue", false).is_err());
    }
}
