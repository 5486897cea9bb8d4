//! Request protection stages and their per-route composition.
//!
//! Each stage lives in its own module and knows nothing about the others:
//!
//! - **Security Headers**: Fixed hardening headers on every response
//! - **Error Normalizer**: Panic boundary and uniform `{"error": ...}` bodies
//! - **Method Guard**: Per-route method allow-list with `Allow` on 405
//! - **Rate Limiting**: Fixed-window counters per client and route
//! - **CSRF**: Double-submit cookie validation for mutating requests
//! - **Client IP**: Trusted-proxy aware client identification
//!
//! [`pipeline`] orders them for a route:
//!
//! ```text
//! Request → Security Headers → Error Normalizer → Method Guard → Rate Limiter → CSRF → Handler
//!                 ↓                   ↓                ↓              ↓           ↓
//!          headers on all        500 on panic         405            429         403
//! ```

pub mod clock;
pub mod csrf;
pub mod ip;
pub mod method;
pub mod normalize;
pub mod pipeline;
pub mod rate_limit;
pub mod security_headers;

pub use clock::{Clock, ManualClock, SystemClock};
pub use csrf::{CSRF_COOKIE_NAME, CSRF_HEADER_NAME, CsrfGuard, CsrfToken};
pub use ip::{CidrRange, TrustedProxyConfig, UNKNOWN_IP, client_identifier};
pub use pipeline::{Guards, Pipeline, RouteConfig, Stage, compose};
pub use rate_limit::{
    MemoryRateLimitStore, RateLimitDecision, RateLimitError, RateLimitPolicy, RateLimitStore,
    RateLimiter,
};
pub use security_headers::SecurityHeaders;
