//! Prometheus metrics collection and HTTP request instrumentation.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

use axum::{
    body::Body,
    http::{Request, Response},
    middleware::Next,
};

/// Initialize the Prometheus metrics recorder and return the handle for rendering.
pub fn init_metrics() -> PrometheusHandle {
    let builder = PrometheusBuilder::new();
    builder
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Axum middleware that records HTTP request metrics.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().clone().to_string();
    let path = request.uri().path().to_string();
    // Normalize path to avoid high-cardinality labels (strip UUIDs and IDs)
    let normalized = normalize_path(&path);

    let start = Instant::now();
    counter!("cd_http_requests_total", "method" => method.clone(), "path" => normalized.clone())
        .increment(1);
    gauge!("cd_http_requests_in_flight", "method" => method.clone(), "path" => normalized.clone())
        .increment(1.0);

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    histogram!("cd_http_request_duration_seconds", "method" => method.clone(), "path" => normalized.clone(), "status" => status.clone()).record(duration);
    counter!("cd_http_responses_total", "method" => method.clone(), "path" => normalized.clone(), "status" => status).increment(1);
    gauge!("cd_http_requests_in_flight", "method" => method, "path" => normalized).decrement(1.0);

    response
}

/// Normalize URL paths to reduce label cardinality.
/// Replaces UUIDs and numeric IDs with placeholders.
fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let normalized: Vec<String> = segments
        .iter()
        .map(|seg| {
            if seg.len() == 36 && seg.chars().filter(|c| *c == '-').count() == 4 {
                // UUID pattern
                ":id".to_string()
            } else if seg.parse::<i64>().is_ok() && !seg.is_empty() {
                // Numeric ID
                ":id".to_string()
            } else {
                seg.to_string()
            }
        })
        .collect();
    normalized.join("/")
}

/// Record the outcome of a request-gate evaluation.
pub fn record_gate_decision(outcome: &'static str) {
    counter!("cd_gate_decisions_total", "outcome" => outcome).increment(1);
}

/// Record a login attempt.
pub fn record_login(success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!("cd_logins_total", "status" => status).increment(1);
}

/// Record a credential revocation, labeled by what triggered it.
pub fn record_session_revoked(reason: &'static str) {
    counter!("cd_sessions_revoked_total", "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/v1/complaints/550e8400-e29b-41d4-a716-446655440000/assign";
        let result = normalize_path(path);
        assert_eq!(result, "/api/v1/complaints/:id/assign");
    }

    #[test]
    fn test_normalize_path_numeric() {
        let path = "/api/v1/users/123";
        let result = normalize_path(path);
        assert_eq!(result, "/api/v1/users/:id");
    }

    #[test]
    fn test_normalize_path_no_change() {
        let path = "/api/v1/health";
        let result = normalize_path(path);
        assert_eq!(result, "/api/v1/health");
    }
}
