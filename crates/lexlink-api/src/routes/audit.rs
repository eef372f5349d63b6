//! # Audit Trail API
//!
//! Per-resource event history and whole-chain verification.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use lexlink_state::{AuditEvent, ChainIntegrity, ResourceKind, Role};

use crate::auth::{require_role, Caller};
use crate::error::AppError;
use crate::state::AppState;

const DEFAULT_VERIFY_LIMIT: usize = 10_000;
const MAX_VERIFY_LIMIT: usize = 100_000;

#[derive(Debug, Deserialize, IntoParams)]
pub struct VerifyParams {
    /// Events to walk from the start of the chain (default 10000).
    pub limit: Option<usize>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/audit/verify", get(verify_chain))
        .route("/v1/audit/{kind}/{id}", get(resource_events))
}

/// GET /v1/audit/verify
#[utoipa::path(
    get,
    path = "/v1/audit/verify",
    params(VerifyParams),
    responses(
        (status = 200, description = "Hash chain integrity report", body = serde_json::Value),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
    ),
    tag = "audit"
)]
pub(crate) async fn verify_chain(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<VerifyParams>,
) -> Result<Json<ChainIntegrity>, AppError> {
    require_role(&caller, Role::Admin)?;
    let limit = params
        .limit
        .unwrap_or(DEFAULT_VERIFY_LIMIT)
        .clamp(1, MAX_VERIFY_LIMIT);
    let report = state.stores.audit.verify_chain(limit).await?;
    if !report.chain_valid {
        tracing::error!(
            broken_links = report.broken_links,
            total_events = report.total_events,
            "audit hash chain is broken"
        );
    }
    Ok(Json(report))
}

/// GET /v1/audit/{kind}/{id}
///
/// `kind` is one of `ip_asset`, `license_order`, `dispute`,
/// `training_batch`. Visible to the resource's owner and admins.
#[utoipa::path(
    get,
    path = "/v1/audit/{kind}/{id}",
    params(
        ("kind" = String, Path, description = "Resource kind"),
        ("id" = String, Path, description = "Resource ID"),
    ),
    responses(
        (status = 200, description = "Events for the resource, oldest first", body = serde_json::Value),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Resource not found", body = crate::error::ErrorBody),
        (status = 422, description = "Unknown kind", body = crate::error::ErrorBody),
    ),
    tag = "audit"
)]
pub(crate) async fn resource_events(
    State(state): State<AppState>,
    caller: Caller,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<Vec<AuditEvent>>, AppError> {
    let kind = ResourceKind::parse(&kind)
        .ok_or_else(|| AppError::Validation(format!("unknown resource kind: {kind}")))?;
    state
        .ownership
        .authorize(caller.actor(), kind, &id)
        .await?;
    let events = state.stores.audit.events_for_resource(kind, &id).await?;
    Ok(Json(events))
}
