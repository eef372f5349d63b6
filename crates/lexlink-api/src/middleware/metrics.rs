//! # HTTP Metrics
//!
//! Records one counter and one histogram per request through the `metrics`
//! facade. Whatever recorder the binary installed (Prometheus in
//! production, none in most tests) receives them.
//!
//! - `lexlink_http_requests_total{method, path, status}`
//! - `lexlink_http_request_duration_seconds{method, path}`
//!
//! `path` is the matched route template (`/v1/orders/{id}`), never the raw
//! URI, so label cardinality stays bounded.

use std::time::Instant;

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;

pub async fn track_http(request: Request, next: Next) -> Response {
    let method = request.method().as_str().to_string();
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16().to_string();
    metrics::counter!(
        "lexlink_http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        "lexlink_http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(started.elapsed().as_secs_f64());

    response
}
