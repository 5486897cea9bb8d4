//! Prometheus metrics for the request pipeline.
//!
//! Metrics are exposed by a dedicated HTTP listener (`METRICS_PORT`, default
//! 9090). Recording without an installed exporter is a no-op, so tests and
//! metrics-disabled deployments can call these functions freely.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `studio_edge_requests_total` - Pipeline responses (labels: route, method, status)
//! - `studio_edge_rejections_total` - Requests stopped by a guard stage (labels: stage, route)
//! - `studio_edge_csrf_tokens_issued_total` - CSRF tokens handed out
//!
//! ## Histograms
//! - `studio_edge_request_duration_seconds` - Time spent in the pipeline (labels: route, method)
//!
//! ## Gauges
//! - `studio_edge_rate_limit_entries` - Tracked rate-limit keys after the last sweep
//!
//! # Usage
//!
//! ```rust,ignore
//! use studio_edge::metrics::{try_init_metrics, record_rejection};
//!
//! try_init_metrics("0.0.0.0:9090".parse()?);
//! record_rejection("rate_limit", "/api/ventures");
//! ```

use std::net::SocketAddr;

use anyhow::Context;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

/// Metric names.
pub mod names {
    pub const REQUESTS_TOTAL: &str = "studio_edge_requests_total";
    pub const REJECTIONS_TOTAL: &str = "studio_edge_rejections_total";
    pub const CSRF_TOKENS_ISSUED_TOTAL: &str = "studio_edge_csrf_tokens_issued_total";
    pub const REQUEST_DURATION_SECONDS: &str = "studio_edge_request_duration_seconds";
    pub const RATE_LIMIT_ENTRIES: &str = "studio_edge_rate_limit_entries";
}

/// Install the Prometheus exporter and describe all metrics.
///
/// # Errors
///
/// Fails if the exporter cannot bind `metrics_addr` or a global recorder is
/// already installed.
pub fn init_metrics(metrics_addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .with_context(|| format!("Failed to install Prometheus exporter on {metrics_addr}"))?;

    describe_counter!(
        names::REQUESTS_TOTAL,
        "Total number of responses produced by route pipelines"
    );
    describe_counter!(
        names::REJECTIONS_TOTAL,
        "Total number of requests rejected by a pipeline stage"
    );
    describe_counter!(
        names::CSRF_TOKENS_ISSUED_TOTAL,
        "Total number of CSRF tokens issued"
    );
    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "Pipeline request duration in seconds"
    );
    describe_gauge!(
        names::RATE_LIMIT_ENTRIES,
        "Rate limit keys tracked after the most recent sweep"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Install the exporter, logging failures instead of returning them.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        let reason = format!("{e:#}");
        error!(error = %reason, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record a completed pipeline request.
pub fn record_request(route: &str, method: &str, status: &str, duration_secs: f64) {
    counter!(names::REQUESTS_TOTAL, "route" => route.to_string(), "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
    histogram!(names::REQUEST_DURATION_SECONDS, "route" => route.to_string(), "method" => method.to_string())
        .record(duration_secs);
}

/// Record a request stopped by `stage`.
pub fn record_rejection(stage: &str, route: &str) {
    counter!(names::REJECTIONS_TOTAL, "stage" => stage.to_string(), "route" => route.to_string())
        .increment(1);
}

pub fn record_csrf_token_issued() {
    counter!(names::CSRF_TOKENS_ISSUED_TOTAL).increment(1);
}

/// Update the tracked rate-limit key gauge.
#[allow(clippy::cast_precision_loss)]
pub fn set_rate_limit_entries(entries: usize) {
    gauge!(names::RATE_LIMIT_ENTRIES).set(entries as f64);
}
