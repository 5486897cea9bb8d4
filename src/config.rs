//! Application configuration loaded from environment variables.
//!
//! # Configuration Hierarchy
//!
//! A `.env` file is loaded first if present, then environment variables are
//! read with development defaults. Values are validated before use.
//!
//! # Pipeline Tuning
//!
//! - `API_RATE_LIMIT` / `API_RATE_LIMIT_WINDOW_MS`: Ventures API limit (default: 100 per 60s)
//! - `CSRF_RATE_LIMIT` / `CSRF_RATE_LIMIT_WINDOW_MS`: Token issuance limit (default: 30 per 60s)
//! - `RATE_LIMIT_SWEEP_INTERVAL_SECS`: Expired counter sweep period (default: 60)
//! - `CSRF_TOKEN_TTL_SECS`: CSRF token lifetime (default: 3600)
//!
//! # Security Configuration
//!
//! - `APP_ENV`: `production` enables `Secure` cookies and HSTS
//! - `CONTENT_SECURITY_POLICY`: Overrides the built-in policy
//! - `TRUSTED_PROXIES`: Comma-separated CIDR ranges allowed to set forwarded headers

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::middleware::ip::CidrRange;
use crate::middleware::rate_limit::{DEFAULT_SWEEP_INTERVAL, RateLimitPolicy};
use crate::middleware::security_headers::DEFAULT_CONTENT_SECURITY_POLICY;

/// Application configuration loaded from environment variables.
///
/// # Example
///
/// ```rust,ignore
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.server_addr());
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 3000)
    pub port: u16,

    /// Deployment environment name (default: "development")
    pub app_env: String,

    /// Maximum request body size in bytes (default: 1MB)
    pub max_request_body_size: usize,

    // =========================================================================
    // Rate Limiting Configuration
    // =========================================================================
    /// Requests per window per client on the ventures API (default: 100)
    pub api_rate_limit: u32,

    /// Ventures API window length (default: 60s)
    pub api_rate_limit_window: Duration,

    /// Requests per window per client on CSRF token issuance (default: 30)
    pub csrf_rate_limit: u32,

    /// CSRF issuance window length (default: 60s)
    pub csrf_rate_limit_window: Duration,

    /// How often expired counters are swept (default: 60s)
    pub rate_limit_sweep_interval: Duration,

    // =========================================================================
    // Security Configuration
    // =========================================================================
    /// CSRF token lifetime (default: 1 hour)
    pub csrf_token_ttl: Duration,

    /// Content-Security-Policy header value
    pub content_security_policy: String,

    /// Trusted proxy CIDR ranges.
    ///
    /// Forwarded-for headers are only honoured when the socket peer falls in
    /// one of these ranges. Empty means every peer is trusted, which is only
    /// appropriate behind a proxy that overwrites the headers.
    ///
    /// Format: "10.0.0.0/8,172.16.0.0/12"
    pub trusted_proxies: Vec<String>,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    /// Port for Prometheus metrics endpoint (default: 9090, 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a value fails to parse or validate.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: Self::parse_env("PORT", 3000)?,
            app_env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            max_request_body_size: Self::parse_env("MAX_REQUEST_BODY_SIZE", 1024 * 1024)?,

            // Rate limiting
            api_rate_limit: Self::parse_env("API_RATE_LIMIT", 100)?,
            api_rate_limit_window: Duration::from_millis(Self::parse_env(
                "API_RATE_LIMIT_WINDOW_MS",
                60_000,
            )?),
            csrf_rate_limit: Self::parse_env("CSRF_RATE_LIMIT", 30)?,
            csrf_rate_limit_window: Duration::from_millis(Self::parse_env(
                "CSRF_RATE_LIMIT_WINDOW_MS",
                60_000,
            )?),
            rate_limit_sweep_interval: Duration::from_secs(Self::parse_env(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL.as_secs(),
            )?),

            // Security
            csrf_token_ttl: Duration::from_secs(Self::parse_env("CSRF_TOKEN_TTL_SECS", 3600)?),
            content_security_policy: env::var("CONTENT_SECURITY_POLICY")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CONTENT_SECURITY_POLICY.to_string()),
            trusted_proxies: Self::parse_list("TRUSTED_PROXIES"),

            // Observability
            metrics_port: Self::parse_env("METRICS_PORT", 9090)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the offending variable.
    pub fn validate(&self) -> AppResult<()> {
        RateLimitPolicy::new(self.api_rate_limit, self.api_rate_limit_window)
            .map_err(|e| AppError::Config(format!("API_RATE_LIMIT: {e}")))?;
        RateLimitPolicy::new(self.csrf_rate_limit, self.csrf_rate_limit_window)
            .map_err(|e| AppError::Config(format!("CSRF_RATE_LIMIT: {e}")))?;

        if self.rate_limit_sweep_interval.is_zero() {
            return Err(AppError::Config(
                "RATE_LIMIT_SWEEP_INTERVAL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.csrf_token_ttl.is_zero() {
            return Err(AppError::Config(
                "CSRF_TOKEN_TTL_SECS must be greater than 0".to_string(),
            ));
        }

        if self.max_request_body_size == 0 {
            return Err(AppError::Config(
                "MAX_REQUEST_BODY_SIZE must be greater than 0".to_string(),
            ));
        }

        if let Some(bad) = self
            .trusted_proxies
            .iter()
            .find(|cidr| CidrRange::parse(cidr).is_none())
        {
            return Err(AppError::Config(format!(
                "TRUSTED_PROXIES contains an invalid CIDR range: {bad}"
            )));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the service runs in production mode.
    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    /// Policy for the ventures API routes.
    pub fn api_rate_limit_policy(&self) -> AppResult<RateLimitPolicy> {
        Ok(RateLimitPolicy::new(
            self.api_rate_limit,
            self.api_rate_limit_window,
        )?)
    }

    /// Policy for the CSRF token issuance route.
    pub fn csrf_rate_limit_policy(&self) -> AppResult<RateLimitPolicy> {
        Ok(RateLimitPolicy::new(
            self.csrf_rate_limit,
            self.csrf_rate_limit_window,
        )?)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<SocketAddr> {
        self.metrics_enabled()
            .then(|| SocketAddr::from(([0, 0, 0, 0], self.metrics_port)))
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::Config(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse a comma-separated list, dropping empty items.
    fn parse_list(name: &str) -> Vec<String> {
        env::var(name)
            .map(|s| {
                s.split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            app_env: "development".to_string(),
            max_request_body_size: 1024 * 1024,
            api_rate_limit: 100,
            api_rate_limit_window: Duration::from_secs(60),
            csrf_rate_limit: 30,
            csrf_rate_limit_window: Duration::from_secs(60),
            rate_limit_sweep_interval: DEFAULT_SWEEP_INTERVAL,
            csrf_token_ttl: Duration::from_secs(3600),
            content_security_policy: DEFAULT_CONTENT_SECURITY_POLICY.to_string(),
            trusted_proxies: vec![],
            metrics_port: 9090,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = Config::default();

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.api_rate_limit, 100);
        assert_eq!(config.csrf_rate_limit, 30);
        assert_eq!(config.csrf_token_ttl, Duration::from_secs(3600));
        assert!(!config.is_production());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_server_addr_format() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };

        assert_eq!(config.server_addr(), "127.0.0.1:8080");
    }

    #[test]
    fn test_is_production() {
        let config = Config {
            app_env: "Production".to_string(),
            ..Config::default()
        };
        assert!(config.is_production());
    }

    #[test]
    fn test_policies_follow_config() {
        let config = Config {
            api_rate_limit: 2,
            api_rate_limit_window: Duration::from_millis(1000),
            ..Config::default()
        };

        let policy = config.api_rate_limit_policy().unwrap();
        assert_eq!(policy.limit(), 2);
        assert_eq!(policy.window(), Duration::from_millis(1000));
    }

    #[test]
    fn test_validate_zero_rate_limit() {
        let config = Config {
            api_rate_limit: 0,
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("API_RATE_LIMIT"));
    }

    #[test]
    fn test_validate_zero_window() {
        let config = Config {
            csrf_rate_limit_window: Duration::ZERO,
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("CSRF_RATE_LIMIT"));
    }

    #[test]
    fn test_validate_zero_ttl() {
        let config = Config {
            csrf_token_ttl: Duration::ZERO,
            ..Config::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_cidr() {
        let config = Config {
            trusted_proxies: vec!["10.0.0.0/8".to_string(), "not-a-cidr".to_string()],
            ..Config::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not-a-cidr"));
    }

    #[test]
    fn test_metrics_addr() {
        assert!(Config::default().metrics_addr().is_some());

        let config = Config {
            metrics_port: 0,
            ..Config::default()
        };
        assert!(config.metrics_addr().is_none());
    }
}
