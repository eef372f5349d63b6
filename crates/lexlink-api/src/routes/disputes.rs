//! # Dispute API
//!
//! Any authenticated caller may raise a dispute against an IP asset and
//! becomes its claimant. The asset's owner responds inside the liveness
//! window; an admin resolves.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use lexlink_core::IpId;
use lexlink_state::{Dispute, ResourceKind, Role};

use crate::auth::{require_role, Caller};
use crate::error::AppError;
use crate::extractors::{extract_validated_json, Validate};
use crate::state::AppState;

/// Upper bound on the response window: 30 days.
const MAX_LIVENESS_SECONDS: u64 = 30 * 24 * 3600;

#[derive(Debug, Deserialize, ToSchema)]
pub struct RaiseDisputeRequest {
    /// Seconds the owner has to respond.
    pub liveness_seconds: u64,
    /// Claim material. Only its canonical hash is stored.
    #[serde(default)]
    pub evidence: serde_json::Value,
}

impl Validate for RaiseDisputeRequest {
    fn validate(&self) -> Result<(), String> {
        if self.liveness_seconds == 0 || self.liveness_seconds > MAX_LIVENESS_SECONDS {
            return Err(format!(
                "liveness_seconds must be between 1 and {MAX_LIVENESS_SECONDS}"
            ));
        }
        Ok(())
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/ip-assets/{id}/disputes", post(raise_dispute))
        .route("/v1/disputes/{id}", get(get_dispute))
        .route("/v1/disputes/{id}/respond", post(respond_dispute))
        .route("/v1/disputes/{id}/resolve", post(resolve_dispute))
}

fn parse_dispute_id(raw: &str) -> Result<Uuid, AppError> {
    raw.parse()
        .map_err(|_| AppError::Validation(format!("invalid dispute id: {raw}")))
}

async fn load_dispute(state: &AppState, dispute_id: Uuid) -> Result<Dispute, AppError> {
    state
        .stores
        .records
        .get_dispute(dispute_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("dispute {dispute_id} not found")))
}

/// POST /v1/ip-assets/{id}/disputes
#[utoipa::path(
    post,
    path = "/v1/ip-assets/{id}/disputes",
    params(("id" = String, Path, description = "Disputed IP asset ID")),
    request_body = RaiseDisputeRequest,
    responses(
        (status = 201, description = "Dispute raised", body = serde_json::Value),
        (status = 404, description = "IP asset not found", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn raise_dispute(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<RaiseDisputeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Dispute>), AppError> {
    let req = extract_validated_json(body)?;
    let ip_id = IpId::new(id)?;
    let dispute = state
        .disputes
        .raise(caller.actor(), &ip_id, req.liveness_seconds, req.evidence)
        .await?;
    Ok((StatusCode::CREATED, Json(dispute)))
}

/// GET /v1/disputes/{id}
///
/// Visible to the claimant, the disputed asset's owner and admins.
#[utoipa::path(
    get,
    path = "/v1/disputes/{id}",
    params(("id" = String, Path, description = "Dispute ID")),
    responses(
        (status = 200, description = "Dispute found", body = serde_json::Value),
        (status = 403, description = "Not a party", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn get_dispute(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Dispute>, AppError> {
    let dispute_id = parse_dispute_id(&id)?;
    let dispute = load_dispute(&state, dispute_id).await?;
    let claimant = state
        .ownership
        .authorize(caller.actor(), ResourceKind::Dispute, &dispute_id.to_string())
        .await;
    if claimant.is_err() {
        state
            .ownership
            .authorize(caller.actor(), ResourceKind::IpAsset, dispute.ip_id.as_str())
            .await?;
    }
    Ok(Json(dispute))
}

/// POST /v1/disputes/{id}/respond
#[utoipa::path(
    post,
    path = "/v1/disputes/{id}/respond",
    params(("id" = String, Path, description = "Dispute ID")),
    responses(
        (status = 200, description = "Dispute answered", body = serde_json::Value),
        (status = 403, description = "Not the asset owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Dispute is not open", body = crate::error::ErrorBody),
        (status = 422, description = "Liveness window closed", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn respond_dispute(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Dispute>, AppError> {
    let dispute_id = parse_dispute_id(&id)?;
    let dispute = load_dispute(&state, dispute_id).await?;
    state
        .ownership
        .authorize(caller.actor(), ResourceKind::IpAsset, dispute.ip_id.as_str())
        .await?;
    let dispute = state.disputes.respond(caller.actor(), dispute_id).await?;
    Ok(Json(dispute))
}

/// POST /v1/disputes/{id}/resolve
#[utoipa::path(
    post,
    path = "/v1/disputes/{id}/resolve",
    params(("id" = String, Path, description = "Dispute ID")),
    responses(
        (status = 200, description = "Dispute resolved", body = serde_json::Value),
        (status = 403, description = "Admin role required", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 409, description = "Already resolved", body = crate::error::ErrorBody),
    ),
    tag = "disputes"
)]
pub(crate) async fn resolve_dispute(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Dispute>, AppError> {
    require_role(&caller, Role::Admin)?;
    let dispute_id = parse_dispute_id(&id)?;
    let dispute = state.disputes.resolve(caller.actor(), dispute_id).await?;
    Ok(Json(dispute))
}
