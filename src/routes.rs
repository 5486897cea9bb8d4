//! Application routing with per-route protection pipelines.
//!
//! # Layering
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │     Tracing      │ ← HTTP request/response spans
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │    Body Limit    │ ← MAX_REQUEST_BODY_SIZE
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │  Route Pipeline  │ ← see `middleware::pipeline`, built per route
//! └────────┬─────────┘
//!          ▼
//!      Handler
//! ```
//!
//! # Routes
//!
//! | Route                | Methods          | Rate limit        | CSRF |
//! |----------------------|------------------|-------------------|------|
//! | `/health`            | GET              | none              | no   |
//! | `/api/csrf-token`    | GET              | `CSRF_RATE_LIMIT` | no   |
//! | `/api/ventures`      | GET, POST        | `API_RATE_LIMIT`  | yes  |
//! | `/api/ventures/{id}` | GET, PUT, DELETE | `API_RATE_LIMIT`  | yes  |

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::Method;
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodRouter, any};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::handlers;
use crate::middleware::pipeline::{Guards, RouteConfig, compose};
use crate::state::AppState;

/// Build the application router.
///
/// # Errors
///
/// Returns `AppError::Config` if a configured rate-limit policy is invalid.
pub fn build_router(state: AppState) -> AppResult<Router> {
    let config = &state.config;
    let guards = &state.guards;

    let api_limit = config.api_rate_limit_policy()?;
    let csrf_limit = config.csrf_rate_limit_policy()?;

    let health = RouteConfig::new([Method::GET]);
    let csrf_token = RouteConfig::new([Method::GET]).with_rate_limit(csrf_limit);
    let ventures = RouteConfig::new([Method::GET, Method::POST]).with_rate_limit(api_limit);
    let venture =
        RouteConfig::new([Method::GET, Method::PUT, Method::DELETE]).with_rate_limit(api_limit);

    info!(
        api_limit = api_limit.limit(),
        api_window = ?api_limit.window(),
        csrf_limit = csrf_limit.limit(),
        csrf_window = ?csrf_limit.window(),
        "Rate limiting configured"
    );

    let router = Router::new()
        .route(
            "/health",
            guarded(any(handlers::health_check), guards, health),
        )
        .route(
            "/api/csrf-token",
            guarded(any(handlers::issue_csrf_token), guards, csrf_token),
        )
        .route(
            "/api/ventures",
            MethodRouter::new()
                .get(handlers::list_ventures)
                .post(handlers::create_venture)
                .layer(compose(guards, ventures)),
        )
        .route(
            "/api/ventures/{id}",
            MethodRouter::new()
                .get(handlers::get_venture)
                .put(handlers::update_venture)
                .delete(handlers::delete_venture)
                .layer(compose(guards, venture)),
        )
        .fallback(not_found);

    info!(
        max_size_kb = config.max_request_body_size / 1024,
        "Request body size limit configured"
    );

    Ok(router
        .layer(DefaultBodyLimit::max(config.max_request_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Wrap a single-handler route in its pipeline.
///
/// The handler is registered for every method; the pipeline's method guard
/// decides which ones get through.
fn guarded(
    route: MethodRouter<AppState>,
    guards: &Guards,
    config: RouteConfig,
) -> MethodRouter<AppState> {
    route.layer(compose(guards, config))
}

/// Unmatched paths get no pipeline, but still carry the security headers.
async fn not_found(State(state): State<AppState>) -> Response {
    let mut response = AppError::NotFound("Not found".to_string()).into_response();
    state.guards.security.apply(response.headers_mut());
    response
}
