//! # lexlink-api: HTTP Service for LexLink
//!
//! Axum routes over the `lexlink-finalize` services.
//!
//! ## API Surface
//!
//! | Prefix | Module | Domain |
//! |--------|--------|--------|
//! | `/v1/orders/*` | [`routes::orders`] | Orders and finalization |
//! | `/v1/ip-assets/*` | [`routes::ip_assets`], [`routes::disputes`] | IP assets, training, disputes |
//! | `/v1/disputes/*` | [`routes::disputes`] | Dispute lifecycle |
//! | `/v1/poll` | [`routes::poll`] | Funding poll |
//! | `/v1/audit/*` | [`routes::audit`] | Audit trail |
//! | `/openapi.json` | [`openapi`] | API document |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → HTTP metrics → Auth → Handler
//! ```
//!
//! `/health/*` and `/metrics` sit outside the stack and need no token.

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;
pub mod worker;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::middleware::from_fn;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full router.
pub fn app(state: AppState, auth_config: AuthConfig) -> Router {
    let api = Router::new()
        .merge(routes::orders::router())
        .merge(routes::ip_assets::router())
        .merge(routes::disputes::router())
        .merge(routes::poll::router())
        .merge(routes::audit::router())
        .merge(openapi::router())
        .layer(DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::track_http))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state.clone());

    let unauthenticated = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state);

    Router::new().merge(unauthenticated).merge(api)
}

async fn liveness() -> &'static str {
    "ok"
}

/// 503 until the store answers.
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    if state.is_ready().await {
        (StatusCode::OK, "ready")
    } else {
        tracing::warn!("readiness check failed: store unreachable");
        (StatusCode::SERVICE_UNAVAILABLE, "store unreachable")
    }
}

async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed".to_string(),
        ),
    }
}
