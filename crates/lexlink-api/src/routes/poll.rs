//! Manual trigger for one funding poll run.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use lexlink_finalize::PollSummary;
use lexlink_state::Role;

use crate::auth::{require_role, Caller};
use crate::error::AppError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/v1/poll", post(run_poll))
}

/// POST /v1/poll
///
/// Scans every candidate order once and reports per-order outcomes. A
/// failing order appears in the summary; it does not fail the request.
#[utoipa::path(
    post,
    path = "/v1/poll",
    responses(
        (status = 200, description = "Poll run summary", body = serde_json::Value),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "operations"
)]
pub(crate) async fn run_poll(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<PollSummary>, AppError> {
    require_role(&caller, Role::Admin)?;
    tracing::info!(actor = %caller.actor().principal, "manual funding poll");
    let summary = state.poller.run_once().await?;
    Ok(Json(summary))
}
