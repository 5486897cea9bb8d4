//! Fixed-window rate limiting keyed by client and route.
//!
//! # Algorithm
//!
//! Each `(client, route)` pair owns a [`RateLimitEntry`] holding a request
//! count and the instant its window rolls over. On every request:
//!
//! 1. If `now > reset_at`, the count drops to 0 and `reset_at` becomes
//!    `now + window`
//! 2. The count is incremented, whether or not the request is allowed
//! 3. The request is allowed while `count <= limit`
//!
//! Denied requests still count, so clients hammering a limited route cannot
//! shorten their own penalty.
//!
//! # Response Headers
//!
//! Every response on a limited route carries:
//! - `X-RateLimit-Limit`: Configured requests per window
//! - `X-RateLimit-Remaining`: `max(0, limit - count)`
//! - `X-RateLimit-Reset`: Unix seconds at which the window rolls over
//!
//! On 429 the response also carries `Retry-After`.
//!
//! # Storage
//!
//! Counters live behind the [`RateLimitStore`] trait. The in-process
//! [`MemoryRateLimitStore`] is a sharded `DashMap`; separate server instances
//! each keep their own counters. Expired entries are removed by a periodic
//! sweep owned by the [`RateLimiter`] (see [`RateLimiter::spawn`]).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue};
use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace};

use super::clock::Clock;
use crate::error::AppError;
use crate::metrics;

/// Header carrying the configured limit.
pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";

/// Header carrying the requests left in the current window.
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Header carrying the window reset time (Unix seconds).
pub const RATE_LIMIT_RESET_HEADER: &str = "x-ratelimit-reset";

/// Default interval between expired-entry sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Lower bound for the sweep interval; `tokio::time::interval` rejects zero.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

/// Error type for rate limit policy configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// Limit value cannot be zero.
    ZeroLimit,
    /// Window length cannot be zero.
    ZeroWindow,
    /// Window length does not fit in a timestamp offset.
    WindowTooLarge,
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::ZeroLimit => {
                write!(f, "rate limit must be greater than 0; omit the policy for no limiting")
            }
            RateLimitError::ZeroWindow => write!(f, "rate limit window must be greater than 0"),
            RateLimitError::WindowTooLarge => write!(f, "rate limit window is too large"),
        }
    }
}

impl std::error::Error for RateLimitError {}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        AppError::Config(err.to_string())
    }
}

/// Insert the `X-RateLimit-*` headers, replacing any earlier values.
pub fn write_rate_limit_headers(
    headers: &mut HeaderMap,
    limit: u32,
    remaining: u32,
    reset_at_secs: i64,
) {
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(limit));
    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(remaining));
    headers.insert(RATE_LIMIT_RESET_HEADER, HeaderValue::from(reset_at_secs));
}

/// Requests allowed per window for one route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    limit: u32,
    window: Duration,
    window_delta: TimeDelta,
}

impl RateLimitPolicy {
    /// Create a policy of `limit` requests per `window`.
    ///
    /// # Errors
    ///
    /// Returns an error if `limit` is 0 or `window` is zero or too large.
    pub fn new(limit: u32, window: Duration) -> Result<Self, RateLimitError> {
        if limit == 0 {
            return Err(RateLimitError::ZeroLimit);
        }
        if window.is_zero() {
            return Err(RateLimitError::ZeroWindow);
        }
        let window_delta =
            TimeDelta::from_std(window).map_err(|_| RateLimitError::WindowTooLarge)?;

        Ok(Self {
            limit,
            window,
            window_delta,
        })
    }

    /// Convenience constructor taking the window in milliseconds.
    pub fn per_millis(limit: u32, window_ms: u64) -> Result<Self, RateLimitError> {
        Self::new(limit, Duration::from_millis(window_ms))
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Identifies one counter: a client on a route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    pub client: String,
    pub route: String,
}

impl RateLimitKey {
    pub fn new(client: impl Into<String>, route: impl Into<String>) -> Self {
        Self {
            client: client.into(),
            route: route.into(),
        }
    }
}

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests seen in the current window
    pub count: u32,
    /// When the current window rolls over
    pub reset_at: DateTime<Utc>,
}

/// Backing storage for rate-limit counters.
///
/// Implementations must apply the window rollover and the increment of
/// [`RateLimitStore::hit`] atomically per key.
pub trait RateLimitStore: Send + Sync + 'static {
    /// Count one request against `key` and return the updated entry.
    fn hit(&self, key: &RateLimitKey, window: TimeDelta, now: DateTime<Utc>) -> RateLimitEntry;

    /// Remove entries whose window ended before `now`. Returns how many were removed.
    fn sweep(&self, now: DateTime<Utc>) -> usize;

    /// Number of tracked keys.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process counter store.
#[derive(Debug, Default)]
pub struct MemoryRateLimitStore {
    entries: DashMap<RateLimitKey, RateLimitEntry>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimitStore for MemoryRateLimitStore {
    fn hit(&self, key: &RateLimitKey, window: TimeDelta, now: DateTime<Utc>) -> RateLimitEntry {
        // The shard lock is held for the whole read-modify-write
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| RateLimitEntry {
                count: 0,
                reset_at: now + window,
            });

        if now > entry.reset_at {
            entry.count = 0;
            entry.reset_at = now + window;
        }
        entry.count = entry.count.saturating_add(1);

        *entry
    }

    fn sweep(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.reset_at >= now);
        before.saturating_sub(self.entries.len())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Outcome of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
    /// Seconds until the window rolls over, rounded up (at least 1)
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    fn from_entry(entry: RateLimitEntry, limit: u32, now: DateTime<Utc>) -> Self {
        let millis_left = u64::try_from((entry.reset_at - now).num_milliseconds()).unwrap_or(0);
        let retry_after_secs = millis_left.div_ceil(1000).max(1);

        Self {
            allowed: entry.count <= limit,
            limit,
            remaining: limit.saturating_sub(entry.count),
            reset_at: entry.reset_at,
            retry_after_secs,
        }
    }

    /// Window reset time as Unix seconds.
    pub fn reset_at_secs(&self) -> i64 {
        self.reset_at.timestamp()
    }

    /// Write the `X-RateLimit-*` headers into `headers`.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        write_rate_limit_headers(headers, self.limit, self.remaining, self.reset_at_secs());
    }

    /// The error to reject a denied request with.
    pub fn to_error(&self) -> AppError {
        AppError::RateLimited {
            limit: self.limit,
            reset_at_secs: self.reset_at_secs(),
            retry_after_secs: self.retry_after_secs,
        }
    }
}

/// Background sweep task handles.
#[derive(Clone)]
struct Sweeper {
    tracker: TaskTracker,
    cancel: CancellationToken,
}

/// Rate limiter shared by every pipeline in the process.
///
/// Cloning is cheap; all clones share the same store, clock, and sweeper.
///
/// # Example
///
/// ```rust,ignore
/// let limiter = RateLimiter::spawn(
///     Arc::new(MemoryRateLimitStore::new()),
///     Arc::new(SystemClock),
///     DEFAULT_SWEEP_INTERVAL,
/// );
/// let policy = RateLimitPolicy::per_millis(2, 1000)?;
/// let decision = limiter.check("1.2.3.4", "/api/x", &policy);
/// // ... on shutdown
/// limiter.shutdown().await;
/// ```
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
    sweeper: Option<Sweeper>,
}

impl RateLimiter {
    /// Create a limiter with no background sweep.
    ///
    /// Expired entries are still reset lazily on their next hit, but keys
    /// that are never seen again stay in the store.
    pub fn new(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            sweeper: None,
        }
    }

    /// Create a limiter and start its periodic sweep.
    ///
    /// Must be called from within a Tokio runtime. Call
    /// [`RateLimiter::shutdown`] to stop the sweep.
    pub fn spawn(
        store: Arc<dyn RateLimitStore>,
        clock: Arc<dyn Clock>,
        sweep_every: Duration,
    ) -> Self {
        let sweeper = Sweeper {
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
        };

        let task_store = store.clone();
        let task_clock = clock.clone();
        let cancel = sweeper.cancel.clone();
        let period = sweep_every.max(MIN_SWEEP_INTERVAL);

        sweeper.tracker.spawn(async move {
            let mut ticker = interval(period);
            ticker.tick().await; // Skip the first immediate tick

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Rate limit sweep received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = task_store.sweep(task_clock.now());
                        let remaining = task_store.len();
                        metrics::set_rate_limit_entries(remaining);
                        trace!(removed, remaining, "Swept expired rate limit entries");
                    }
                }
            }

            debug!("Rate limit sweep shutting down");
        });

        info!(interval_secs = period.as_secs_f64(), "Rate limit sweep started");

        Self {
            store,
            clock,
            sweeper: Some(sweeper),
        }
    }

    /// Count a request from `client` on `route` at the clock's current time.
    pub fn check(&self, client: &str, route: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
        self.check_at(client, route, policy, self.clock.now())
    }

    /// Count a request from `client` on `route` at `now`.
    pub fn check_at(
        &self,
        client: &str,
        route: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let key = RateLimitKey::new(client, route);
        let entry = self.store.hit(&key, policy.window_delta, now);
        RateLimitDecision::from_entry(entry, policy.limit, now)
    }

    /// Remove expired entries now, outside the periodic schedule.
    pub fn sweep(&self) -> usize {
        self.store.sweep(self.clock.now())
    }

    /// Number of tracked `(client, route)` pairs.
    pub fn tracked_keys(&self) -> usize {
        self.store.len()
    }

    /// The clock this limiter reads.
    pub fn clock(&self) -> Arc<dyn Clock> {
        self.clock.clone()
    }

    /// Whether a background sweep was started.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .as_ref()
            .is_some_and(|sweeper| !sweeper.cancel.is_cancelled())
    }

    /// Stop the background sweep and wait for it to exit.
    ///
    /// A no-op for limiters created with [`RateLimiter::new`].
    pub async fn shutdown(&self) {
        if let Some(sweeper) = &self.sweeper {
            sweeper.cancel.cancel();
            sweeper.tracker.close();
            sweeper.tracker.wait().await;
            debug!("Rate limit sweep stopped");
        }
    }
}
