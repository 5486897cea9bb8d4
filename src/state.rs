//! Shared application state for Axum handlers.
//!
//! Holds the configuration, the pipeline [`Guards`] every route shares, and
//! the ventures demo store.
//!
//! # Structured Concurrency
//!
//! The only background task is the rate-limit sweep, owned by the
//! [`RateLimiter`] inside the guards. Call [`AppState::shutdown`] after the
//! server stops to cancel it and wait for it to exit.

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::Config;
use crate::error::AppResult;
use crate::middleware::clock::{Clock, SystemClock};
use crate::middleware::csrf::CsrfGuard;
use crate::middleware::ip::TrustedProxyConfig;
use crate::middleware::pipeline::Guards;
use crate::middleware::rate_limit::{MemoryRateLimitStore, RateLimiter};
use crate::middleware::security_headers::SecurityHeaders;
use crate::services::VentureService;

/// Shared application state, cloned for each request handler.
///
/// # Lifecycle
///
/// ```rust,ignore
/// let state = AppState::new(config)?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<Config>,
    /// Collaborators shared by every route pipeline
    pub guards: Guards,
    /// Ventures demo store
    pub ventures: VentureService,
    /// Timestamp when the application started
    pub started_at: Instant,
}

impl AppState {
    /// Build state on the system clock and start the rate-limit sweep.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the security header or CSRF settings
    /// are invalid.
    pub fn new(config: Config) -> AppResult<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build state on an explicit clock.
    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> AppResult<Self> {
        let production = config.is_production();

        let security = SecurityHeaders::new(&config.content_security_policy, production)?;
        let csrf = CsrfGuard::new(config.csrf_token_ttl, production)?;
        let trusted_proxies = TrustedProxyConfig::new(&config.trusted_proxies);
        let limiter = RateLimiter::spawn(
            Arc::new(MemoryRateLimitStore::new()),
            clock.clone(),
            config.rate_limit_sweep_interval,
        );

        info!(
            production,
            trusted_proxies = config.trusted_proxies.len(),
            csrf_ttl_secs = config.csrf_token_ttl.as_secs(),
            "Request pipeline guards ready"
        );

        Ok(Self {
            guards: Guards::new(security, limiter, csrf, trusted_proxies),
            ventures: VentureService::seeded(clock),
            config: Arc::new(config),
            started_at: Instant::now(),
        })
    }

    /// The clock shared by the guards and the ventures store.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.guards.limiter.clock()
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");
        self.guards.limiter.shutdown().await;
        info!("All background tasks have completed");
    }

    /// Get the application uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
