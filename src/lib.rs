//! # studio_edge
//!
//! HTTP edge for the venture studio site: a per-route request pipeline in
//! front of a small ventures API, built on Axum and Tower.
//!
//! - **Rate Limiting**: Fixed-window counters per client and route
//! - **CSRF Protection**: Double-submit cookie tokens for mutating requests
//! - **Security Headers**: CSP, frame, sniffing, referrer, and HSTS headers
//! - **Method Guarding**: Per-route allow-lists with proper `Allow` headers
//! - **Error Normalization**: One JSON error shape; panics become 500s
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Tracing → Body Limit                                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Route Pipeline (Headers → Normalizer → Method → Limit →    │
//! │                  CSRF), composed per route                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (health, csrf-token, ventures)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Services (VentureService, in-memory)                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use studio_edge::{AppState, Config, build_router};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let state = AppState::new(config)?;
//!     let app = build_router(state.clone())?;
//!
//!     // Serve `app`, then:
//!     state.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Protecting Your Own Routes
//!
//! ```rust,ignore
//! use axum::http::Method;
//! use axum::routing::post;
//! use studio_edge::middleware::{RateLimitPolicy, RouteConfig, compose};
//!
//! let config = RouteConfig::new([Method::POST])
//!     .with_rate_limit(RateLimitPolicy::per_millis(10, 60_000)?);
//! let route = post(handler).layer(compose(&state.guards, config));
//! ```

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::build_router;
pub use state::AppState;
