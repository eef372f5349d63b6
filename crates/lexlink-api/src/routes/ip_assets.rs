//! # IP Asset API
//!
//! Registration, lookup, the asset's orders, and training batch recording.
//! The registering caller owns the asset.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use lexlink_core::IpId;
use lexlink_state::{Creator, IpAsset, LicenseOrder, NewIpAsset, ResourceKind, TrainingBatch};

use crate::auth::Caller;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::state::AppState;

// ── DTOs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatorInput {
    pub name: String,
    /// Share of the work; all creators must sum to 100.
    pub contribution_percent: u8,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterIpRequest {
    pub ip_id: String,
    pub title: String,
    pub media_url: String,
    pub license_terms_id: String,
    #[serde(default)]
    pub royalty_bps: u32,
    #[serde(default)]
    pub commercial_use: bool,
    #[serde(default)]
    pub derivatives_allowed: bool,
    pub creators: Vec<CreatorInput>,
    #[serde(default)]
    pub parent_ip_ids: Vec<String>,
    /// SHA-256 of the media, if known at registration.
    #[serde(default)]
    pub content_hash: Option<String>,
}

impl Validate for RegisterIpRequest {
    fn validate(&self) -> Result<(), String> {
        if self.creators.is_empty() {
            return Err("at least one creator is required".to_string());
        }
        Ok(())
    }
}

impl RegisterIpRequest {
    fn into_new_ip(self) -> Result<NewIpAsset, AppError> {
        let parent_ip_ids = self
            .parent_ip_ids
            .into_iter()
            .map(IpId::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(NewIpAsset {
            ip_id: IpId::new(self.ip_id)?,
            title: self.title,
            media_url: self.media_url,
            license_terms_id: self.license_terms_id,
            royalty_bps: self.royalty_bps,
            commercial_use: self.commercial_use,
            derivatives_allowed: self.derivatives_allowed,
            creators: self
                .creators
                .into_iter()
                .map(|c| Creator {
                    name: c.name,
                    contribution_percent: c.contribution_percent,
                })
                .collect(),
            parent_ip_ids,
            content_hash: self.content_hash,
        })
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct TrainingBatchRequest {
    /// Positive number of training units consumed.
    pub units: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TrainingBatchResponse {
    #[schema(value_type = Object)]
    pub batch: TrainingBatch,
    /// Units recorded for the asset, this batch included.
    pub total_units: u64,
    /// Finalized orders whose compliance score was recomputed.
    pub rescored_orders: usize,
}

// ── Router ──────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/ip-assets", post(register_ip))
        .route("/v1/ip-assets/{id}", get(get_ip))
        .route("/v1/ip-assets/{id}/orders", get(list_ip_orders))
        .route("/v1/ip-assets/{id}/training-batches", post(record_training))
}

async fn authorized_ip_id(
    state: &AppState,
    caller: &Caller,
    raw_id: &str,
) -> Result<IpId, AppError> {
    let ip_id = IpId::new(raw_id)?;
    state
        .ownership
        .authorize(caller.actor(), ResourceKind::IpAsset, ip_id.as_str())
        .await?;
    Ok(ip_id)
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// POST /v1/ip-assets
#[utoipa::path(
    post,
    path = "/v1/ip-assets",
    request_body = RegisterIpRequest,
    responses(
        (status = 201, description = "IP asset registered", body = serde_json::Value),
        (status = 409, description = "IP id already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "ip-assets"
)]
pub(crate) async fn register_ip(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<RegisterIpRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IpAsset>), AppError> {
    let req = extract_validated_json(body)?;
    let ip = state
        .intake
        .register_ip(caller.actor(), req.into_new_ip()?)
        .await?;
    Ok((StatusCode::CREATED, Json(ip)))
}

/// GET /v1/ip-assets/{id}
#[utoipa::path(
    get,
    path = "/v1/ip-assets/{id}",
    params(("id" = String, Path, description = "IP asset ID")),
    responses(
        (status = 200, description = "IP asset found", body = serde_json::Value),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "ip-assets"
)]
pub(crate) async fn get_ip(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<IpAsset>, AppError> {
    let ip_id = authorized_ip_id(&state, &caller, &id).await?;
    let ip = state
        .stores
        .records
        .get_ip(&ip_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("IP asset {ip_id} not found")))?;
    Ok(Json(ip))
}

/// GET /v1/ip-assets/{id}/orders
#[utoipa::path(
    get,
    path = "/v1/ip-assets/{id}/orders",
    params(("id" = String, Path, description = "IP asset ID")),
    responses(
        (status = 200, description = "Orders against the asset, oldest first", body = serde_json::Value),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "ip-assets"
)]
pub(crate) async fn list_ip_orders(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Vec<LicenseOrder>>, AppError> {
    let ip_id = authorized_ip_id(&state, &caller, &id).await?;
    let orders = state.stores.orders.list_by_ip(&ip_id).await?;
    Ok(Json(orders))
}

/// POST /v1/ip-assets/{id}/training-batches
///
/// Anchors the batch, then recomputes the compliance score of every
/// finalized order of the asset.
#[utoipa::path(
    post,
    path = "/v1/ip-assets/{id}/training-batches",
    params(("id" = String, Path, description = "IP asset ID")),
    request_body = TrainingBatchRequest,
    responses(
        (status = 201, description = "Batch recorded", body = TrainingBatchResponse),
        (status = 403, description = "Not the owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
        (status = 422, description = "Non-positive units", body = crate::error::ErrorBody),
    ),
    tag = "ip-assets"
)]
pub(crate) async fn record_training(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<TrainingBatchRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TrainingBatchResponse>), AppError> {
    let req = extract_json(body)?;
    let ip_id = authorized_ip_id(&state, &caller, &id).await?;
    let record = state
        .training
        .record(caller.actor(), &ip_id, req.units)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(TrainingBatchResponse {
            batch: record.batch,
            total_units: record.total_units,
            rescored_orders: record.rescored_orders,
        }),
    ))
}
