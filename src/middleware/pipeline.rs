//! Per-route middleware composition.
//!
//! A route's protections are described by a [`RouteConfig`] and turned into
//! an ordered list of [`Stage`]s by [`compose`]. The resulting [`Pipeline`]
//! is a Tower layer applied to the route's handler.
//!
//! # Stage Order
//!
//! ```text
//! Request
//!    │
//!    ▼
//! ┌──────────────────┐
//! │ Security Headers │ ← queued for every response
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │ Error Normalizer │ ← panic boundary, errors → {"error": ...}
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Method Guard   │ ← 405 + Allow
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │   Rate Limiter   │ ← 429 + X-RateLimit-* (only if configured)
//! └────────┬─────────┘
//!          ▼
//! ┌──────────────────┐
//! │    CSRF Guard    │ ← 403 (only for routes accepting mutating verbs)
//! └────────┬─────────┘
//!          ▼
//!       Handler
//! ```
//!
//! Guard stages run in order and stop at the first rejection. Headers queued
//! by earlier stages (security headers, rate-limit counters) are merged into
//! whatever response comes out, so they are present on early rejections and
//! handler errors alike.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::extract::MatchedPath;
use axum::http::{HeaderMap, Method, Request, Response};
use tower::{Layer, Service};
use tracing::{debug, warn};

use super::csrf::CsrfGuard;
use super::ip::{TrustedProxyConfig, client_identifier};
use super::method::{self, is_mutating};
use super::normalize;
use super::rate_limit::{RateLimitPolicy, RateLimiter};
use super::security_headers::SecurityHeaders;
use crate::error::{AppError, AppResult};
use crate::metrics;

/// One named step of a route pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    SecurityHeaders,
    ErrorNormalizer,
    MethodGuard,
    RateLimit,
    Csrf,
}

impl Stage {
    /// Label used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::SecurityHeaders => "security_headers",
            Stage::ErrorNormalizer => "error_normalizer",
            Stage::MethodGuard => "method_guard",
            Stage::RateLimit => "rate_limit",
            Stage::Csrf => "csrf",
        }
    }
}

/// Protection settings for one route.
///
/// # Example
///
/// ```rust,ignore
/// let config = RouteConfig::new([Method::GET, Method::POST])
///     .with_rate_limit(RateLimitPolicy::per_millis(100, 60_000)?);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    /// Allowed HTTP methods, in the order they are advertised in `Allow`
    pub methods: Vec<Method>,
    /// Requests per window per client (None = unlimited)
    pub rate_limit: Option<RateLimitPolicy>,
    /// CSRF validation switch (None = enabled)
    pub csrf_protection: Option<bool>,
}

impl RouteConfig {
    pub fn new(methods: impl IntoIterator<Item = Method>) -> Self {
        Self {
            methods: methods.into_iter().collect(),
            rate_limit: None,
            csrf_protection: None,
        }
    }

    pub fn with_rate_limit(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    pub fn with_csrf_protection(mut self, enabled: bool) -> Self {
        self.csrf_protection = Some(enabled);
        self
    }

    /// Whether the CSRF stage belongs in this route's pipeline.
    ///
    /// Requires protection not to be switched off and at least one allowed
    /// method other than GET or HEAD.
    pub fn needs_csrf(&self) -> bool {
        self.csrf_protection != Some(false) && self.methods.iter().any(is_mutating)
    }
}

/// Shared collaborators every pipeline reads from.
///
/// Built once at startup and handed to [`compose`] for each route, so all
/// routes share one rate-limit store and one CSRF configuration.
#[derive(Clone)]
pub struct Guards {
    pub security: Arc<SecurityHeaders>,
    pub limiter: RateLimiter,
    pub csrf: Arc<CsrfGuard>,
    pub trusted_proxies: Arc<TrustedProxyConfig>,
}

impl Guards {
    pub fn new(
        security: SecurityHeaders,
        limiter: RateLimiter,
        csrf: CsrfGuard,
        trusted_proxies: TrustedProxyConfig,
    ) -> Self {
        Self {
            security: Arc::new(security),
            limiter,
            csrf: Arc::new(csrf),
            trusted_proxies: Arc::new(trusted_proxies),
        }
    }
}

/// Build the pipeline for a route.
pub fn compose(guards: &Guards, config: RouteConfig) -> Pipeline {
    let mut stages = vec![
        Stage::SecurityHeaders,
        Stage::ErrorNormalizer,
        Stage::MethodGuard,
    ];
    if config.rate_limit.is_some() {
        stages.push(Stage::RateLimit);
    }
    if config.needs_csrf() {
        stages.push(Stage::Csrf);
    }

    debug!(
        stages = ?stages.iter().map(Stage::name).collect::<Vec<_>>(),
        "Composed route pipeline"
    );

    Pipeline {
        inner: Arc::new(PipelineInner {
            stages,
            config,
            guards: guards.clone(),
        }),
    }
}

/// Composed stage list for one route, usable as a Tower layer.
#[derive(Clone)]
pub struct Pipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    stages: Vec<Stage>,
    config: RouteConfig,
    guards: Guards,
}

impl Pipeline {
    /// Stages in execution order, outermost first.
    pub fn stages(&self) -> &[Stage] {
        &self.inner.stages
    }

    fn has_stage(&self, stage: Stage) -> bool {
        self.inner.stages.contains(&stage)
    }

    /// Run the guard stages against `req`.
    ///
    /// Headers destined for the response are queued in `pending`. Returns
    /// the failing stage alongside its error.
    fn run_guards(
        &self,
        req: &Request<Body>,
        route: &str,
        pending: &mut HeaderMap,
    ) -> Result<(), (Stage, AppError)> {
        let guards = &self.inner.guards;
        let config = &self.inner.config;

        for &stage in &self.inner.stages {
            let outcome = match stage {
                Stage::SecurityHeaders => {
                    guards.security.apply(pending);
                    Ok(())
                }
                // Wraps the handler call rather than checking the request
                Stage::ErrorNormalizer => Ok(()),
                Stage::MethodGuard => method::enforce(req.method(), &config.methods),
                Stage::RateLimit => match &config.rate_limit {
                    Some(policy) => {
                        let client = client_identifier(req, &guards.trusted_proxies);
                        let decision = guards.limiter.check(&client, route, policy);
                        decision.write_headers(pending);
                        if decision.allowed {
                            Ok(())
                        } else {
                            warn!(
                                client_ip = %client,
                                route,
                                retry_after_secs = decision.retry_after_secs,
                                "Rate limit exceeded"
                            );
                            Err(decision.to_error())
                        }
                    }
                    None => Ok(()),
                },
                Stage::Csrf => guards.csrf.validate_request(req).inspect_err(|e| {
                    warn!(
                        client_ip = %client_identifier(req, &guards.trusted_proxies),
                        route,
                        method = %req.method(),
                        reason = %e,
                        "CSRF validation failed"
                    );
                }),
            };

            outcome.map_err(|e| (stage, e))?;
        }

        Ok(())
    }
}

impl<S> Layer<S> for Pipeline {
    type Service = PipelineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PipelineService {
            inner,
            pipeline: self.clone(),
        }
    }
}

/// Service produced by applying a [`Pipeline`] to a handler.
#[derive(Clone)]
pub struct PipelineService<S> {
    inner: S,
    pipeline: Pipeline,
}

impl<S> Service<Request<Body>> for PipelineService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let pipeline = self.pipeline.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let started = Instant::now();
            let method = req.method().clone();
            let route = req
                .extensions()
                .get::<MatchedPath>()
                .map(|path| path.as_str().to_owned())
                .unwrap_or_else(|| req.uri().path().to_owned());

            let mut pending = HeaderMap::new();
            let checked = pipeline.run_guards(&req, &route, &mut pending);

            let outcome: AppResult<Response<Body>> = match checked {
                Ok(()) if pipeline.has_stage(Stage::ErrorNormalizer) => {
                    match normalize::catch_panic(inner.call(req)).await {
                        Ok(Ok(response)) => Ok(response),
                        Ok(Err(e)) => return Err(e),
                        Err(e) => Err(e),
                    }
                }
                Ok(()) => match inner.call(req).await {
                    Ok(response) => Ok(response),
                    Err(e) => return Err(e),
                },
                Err((stage, e)) => {
                    metrics::record_rejection(stage.name(), &route);
                    Err(e)
                }
            };

            let mut response = normalize::into_response(outcome);

            for (name, value) in &pending {
                if !response.headers().contains_key(name) {
                    response.headers_mut().insert(name.clone(), value.clone());
                }
            }

            metrics::record_request(
                &route,
                method.as_str(),
                response.status().as_str(),
                started.elapsed().as_secs_f64(),
            );

            Ok::<_, S::Error>(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::middleware::clock::ManualClock;
    use crate::middleware::rate_limit::MemoryRateLimitStore;
    use axum::Router;
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::routing::get;
    use chrono::{DateTime, TimeDelta};
    use tower::ServiceExt;

    fn guards_with_clock() -> (Guards, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let limiter = RateLimiter::new(Arc::new(MemoryRateLimitStore::new()), clock.clone());
        let guards = Guards::new(
            SecurityHeaders::default(),
            limiter,
            CsrfGuard::default(),
            TrustedProxyConfig::default(),
        );
        (guards, clock)
    }

    fn app(pipeline: Pipeline) -> Router {
        Router::new().route(
            "/api/x",
            get(|| async { "listed" })
                .post(|| async { "created" })
                .layer(pipeline),
        )
    }

    fn request(method: Method) -> axum::http::request::Builder {
        Request::builder()
            .method(method)
            .uri("/api/x")
            .header("x-forwarded-for", "1.2.3.4")
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_compose_full_stage_order() {
        let (guards, _) = guards_with_clock();
        let config = RouteConfig::new([Method::GET, Method::POST])
            .with_rate_limit(RateLimitPolicy::per_millis(10, 1000).unwrap());

        assert_eq!(
            compose(&guards, config).stages(),
            &[
                Stage::SecurityHeaders,
                Stage::ErrorNormalizer,
                Stage::MethodGuard,
                Stage::RateLimit,
                Stage::Csrf,
            ]
        );
    }

    #[test]
    fn test_compose_read_only_route_skips_csrf() {
        let (guards, _) = guards_with_clock();
        let pipeline = compose(&guards, RouteConfig::new([Method::GET, Method::HEAD]));
        assert!(!pipeline.stages().contains(&Stage::Csrf));
        assert!(!pipeline.stages().contains(&Stage::RateLimit));
    }

    #[test]
    fn test_compose_csrf_disabled() {
        let (guards, _) = guards_with_clock();
        let config = RouteConfig::new([Method::POST]).with_csrf_protection(false);
        assert!(!compose(&guards, config).stages().contains(&Stage::Csrf));
    }

    #[tokio::test]
    async fn test_rate_limit_scenario() {
        let (guards, clock) = guards_with_clock();
        let config = RouteConfig::new([Method::GET])
            .with_rate_limit(RateLimitPolicy::per_millis(2, 1000).unwrap());
        let app = app(compose(&guards, config));

        let mut statuses = Vec::new();
        for _ in 0..3 {
            clock.advance(TimeDelta::milliseconds(100));
            let response = app
                .clone()
                .oneshot(request(Method::GET).body(Body::empty()).unwrap())
                .await
                .unwrap();
            statuses.push(response.status());
        }
        assert_eq!(
            statuses,
            vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
        );

        clock.advance(TimeDelta::milliseconds(1100));
        let response = app
            .oneshot(request(Method::GET).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "1");
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
    }

    #[tokio::test]
    async fn test_rate_limited_response_carries_security_headers() {
        let (guards, _) = guards_with_clock();
        let config = RouteConfig::new([Method::GET])
            .with_rate_limit(RateLimitPolicy::per_millis(1, 1000).unwrap());
        let app = app(compose(&guards, config));

        app.clone()
            .oneshot(request(Method::GET).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let response = app
            .oneshot(request(Method::GET).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert_eq!(response.headers()["retry-after"], "1");
        assert!(body_text(response).await.contains("retryAfter"));
    }

    #[tokio::test]
    async fn test_method_guard_runs_before_rate_limit() {
        let (guards, _) = guards_with_clock();
        let limiter = guards.limiter.clone();
        let config = RouteConfig::new([Method::GET])
            .with_rate_limit(RateLimitPolicy::per_millis(5, 1000).unwrap());
        let app = app(compose(&guards, config));

        let response = app
            .oneshot(request(Method::POST).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()["allow"], "GET");
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn test_csrf_missing_and_invalid() {
        let (guards, _) = guards_with_clock();
        let app = app(compose(&guards, RouteConfig::new([Method::GET, Method::POST])));

        let missing = app
            .clone()
            .oneshot(
                request(Method::POST)
                    .header("cookie", "csrf-token=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(missing.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(missing).await, r#"{"error":"CSRF token missing"}"#);

        let invalid = app
            .oneshot(
                request(Method::POST)
                    .header("cookie", "csrf-token=abc")
                    .header("x-csrf-token", "xyz")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(invalid.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_text(invalid).await, r#"{"error":"Invalid CSRF token"}"#);
    }

    #[tokio::test]
    async fn test_csrf_match_reaches_handler() {
        let (guards, _) = guards_with_clock();
        let app = app(compose(&guards, RouteConfig::new([Method::GET, Method::POST])));

        let response = app
            .oneshot(
                request(Method::POST)
                    .header("cookie", "csrf-token=abc")
                    .header("x-csrf-token", "abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "created");
    }

    #[tokio::test]
    async fn test_get_never_csrf_validated() {
        let (guards, _) = guards_with_clock();
        let app = app(compose(&guards, RouteConfig::new([Method::GET, Method::POST])));

        for _ in 0..3 {
            let response = app
                .clone()
                .oneshot(request(Method::GET).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_handler_panic_is_normalized() {
        let (guards, _) = guards_with_clock();
        let pipeline = compose(&guards, RouteConfig::new([Method::GET]));
        let app = Router::new().route(
            "/api/x",
            get(|| async {
                if true {
                    panic!("database on fire");
                }
                "unreachable"
            })
            .layer(pipeline),
        );

        let response = app
            .oneshot(request(Method::GET).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        let body = body_text(response).await;
        assert_eq!(body, r#"{"error":"Internal server error"}"#);
        assert!(!body.contains("fire"));
    }

    #[tokio::test]
    async fn test_rate_limit_headers_survive_csrf_rejection() {
        let (guards, _) = guards_with_clock();
        let config = RouteConfig::new([Method::POST])
            .with_rate_limit(RateLimitPolicy::per_millis(3, 1000).unwrap());
        let app = app(compose(&guards, config));

        let response = app
            .oneshot(request(Method::POST).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(response.headers()["x-ratelimit-remaining"], "2");
    }

    #[tokio::test]
    async fn test_routes_are_limited_independently() {
        let (guards, _) = guards_with_clock();
        let policy = RateLimitPolicy::per_millis(1, 1000).unwrap();
        let app = Router::new()
            .route(
                "/api/a",
                get(|| async { "a" })
                    .layer(compose(&guards, RouteConfig::new([Method::GET]).with_rate_limit(policy))),
            )
            .route(
                "/api/b",
                get(|| async { "b" })
                    .layer(compose(&guards, RouteConfig::new([Method::GET]).with_rate_limit(policy))),
            );

        for path in ["/api/a", "/api/b"] {
            let response = app
                .clone()
                .oneshot(
                    Request::builder()
                        .uri(path)
                        .header("x-forwarded-for", "1.2.3.4")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
