//! Prometheus metrics for votequorum nodes.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides the HTTP RED middleware, and
//! exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "votequorum_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "votequorum_http_request_duration_seconds";

/// Coordinated votes by outcome (counter). Labels: outcome
/// (`committed`, `duplicate_vote`, `quorum_not_reached`).
pub const VOTES_TOTAL: &str = "votequorum_votes_total";

/// Peer replies seen while coordinating (counter). Labels: reply
/// (`acked`, `conflict`, `rejected`, `unreachable`).
pub const REPLICATION_REPLIES_TOTAL: &str = "votequorum_replication_replies_total";

/// Startup recoveries (counter). Labels: source (`peer`, `local`, `empty`).
pub const RECOVERY_TOTAL: &str = "votequorum_recovery_total";

/// Records in this node's vote log (gauge).
pub const LOG_LENGTH: &str = "votequorum_log_length";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(VOTES_TOTAL, "Coordinated votes by outcome");
    describe_counter!(
        REPLICATION_REPLIES_TOTAL,
        "Peer replies to replicated votes"
    );
    describe_counter!(RECOVERY_TOTAL, "Startup recoveries by state source");
    describe_gauge!(LOG_LENGTH, "Records in the local vote log");
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Map a request path to a route label. Unknown paths collapse to `other`.
fn normalize_path(path: &str) -> &'static str {
    match path {
        "/votes" => "/votes",
        "/results" => "/results",
        "/internal/replicate" => "/internal/replicate",
        "/internal/state" => "/internal/state",
        "/health" => "/health",
        "/ready" => "/ready",
        "/openapi.json" => "/openapi.json",
        _ => "other",
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics` -- Render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_known_paths() {
        assert_eq!(normalize_path("/votes"), "/votes");
        assert_eq!(normalize_path("/results"), "/results");
        assert_eq!(normalize_path("/internal/replicate"), "/internal/replicate");
        assert_eq!(normalize_path("/internal/state"), "/internal/state");
        assert_eq!(normalize_path("/ready"), "/ready");
    }

    #[test]
    fn test_normalize_unknown_paths() {
        assert_eq!(normalize_path("/"), "other");
        assert_eq!(normalize_path("/votes/123"), "other");
        assert_eq!(normalize_path("/wp-admin"), "other");
    }
}
