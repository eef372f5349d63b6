//! # License Order API
//!
//! Order creation, lookup and the synchronous finalization trigger.
//!
//! An order is visible to its buyer, to the resolved owner (normally the
//! IP asset's owner) and to admins. Anyone authenticated may open an order
//! against an existing IP asset; the caller becomes the buyer unless one is
//! named.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use lexlink_core::{EvmAddress, IpId, OrderId, Principal, ValidationError};
use lexlink_finalize::FinalizeOutcome;
use lexlink_state::{
    Actor, FinalizedEvidence, LicenseOrder, Network, NewOrder, PaymentMode, PaymentProof,
    ResourceKind,
};

use crate::auth::Caller;
use crate::error::AppError;
use crate::extractors::{extract_json, extract_validated_json, Validate};
use crate::state::AppState;

// ── DTOs ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub order_id: String,
    pub ip_id: String,
    /// Defaults to the caller.
    #[serde(default)]
    pub buyer_principal: Option<String>,
    /// EVM address that receives the license token.
    pub mint_to: String,
    /// `btc` or `ckbtc`.
    pub payment_mode: String,
    pub amount_sats: i64,
    /// Defaults to the service's configured network.
    #[serde(default)]
    pub network: Option<String>,
    /// Escrow address, required for `btc`.
    #[serde(default)]
    pub btc_address: Option<String>,
}

impl Validate for CreateOrderRequest {
    fn validate(&self) -> Result<(), String> {
        if PaymentMode::parse(self.payment_mode.trim()).is_none() {
            return Err(format!(
                "payment_mode must be 'btc' or 'ckbtc', got '{}'",
                self.payment_mode
            ));
        }
        Ok(())
    }
}

impl CreateOrderRequest {
    fn into_new_order(self, caller: &Actor, state: &AppState) -> Result<NewOrder, AppError> {
        let payment_mode = PaymentMode::parse(self.payment_mode.trim())
            .ok_or_else(|| ValidationError::field("payment_mode", "must be 'btc' or 'ckbtc'"))?;
        let network = match self.network {
            Some(raw) => raw.parse::<Network>()?,
            None => state.default_network,
        };
        let buyer_principal = match self.buyer_principal {
            Some(raw) => Principal::new(raw)?,
            None => caller.principal.clone(),
        };
        Ok(NewOrder {
            order_id: OrderId::new(self.order_id)?,
            ip_id: IpId::new(self.ip_id)?,
            buyer_principal: Some(buyer_principal),
            mint_to: EvmAddress::parse(self.mint_to)?,
            payment_mode,
            amount_sats: self.amount_sats,
            network,
            btc_address: self.btc_address,
            owner_principal: None,
        })
    }
}

/// Optional payment proof supplied with a finalize call. An empty body
/// finalizes with the proof the poller stored.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(default)]
pub struct FinalizeRequest {
    /// Bitcoin funding transaction, for `btc` orders.
    pub tx_id: Option<String>,
    /// Amount the buyer reports minting into the escrow subaccount, for
    /// `ckbtc` orders. Finalization reads the actual balance from the
    /// ledger and refuses an underfunded escrow.
    pub minted_amount: Option<u64>,
    /// Ledger block of the buyer's transfer; kept as the payment reference.
    pub block_index: Option<u64>,
}

impl FinalizeRequest {
    fn into_proof(self, order: &LicenseOrder) -> Result<Option<PaymentProof>, ValidationError> {
        match (self.tx_id, self.minted_amount, self.block_index) {
            (None, None, None) => Ok(None),
            (Some(tx_id), None, None) => {
                let tx_id = tx_id.trim();
                if tx_id.is_empty() {
                    return Err(ValidationError::field("tx_id", "must not be empty"));
                }
                Ok(Some(PaymentProof::Btc {
                    tx_id: tx_id.to_string(),
                }))
            }
            (None, Some(minted_amount), block_index) => Ok(Some(PaymentProof::Ckbtc {
                subaccount: order.ckbtc_subaccount,
                minted_amount,
                block_index,
            })),
            (None, None, Some(_)) => Err(ValidationError::field(
                "block_index",
                "requires minted_amount",
            )),
            (Some(_), _, _) => Err(ValidationError::field(
                "tx_id",
                "cannot be combined with minted_amount or block_index",
            )),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FinalizeResponse {
    pub order_id: String,
    /// `finalized`, `already_finalized` or `in_progress`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub evidence: Option<FinalizedEvidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_attempts: Option<u32>,
    /// The evidence archive, inlined when it could not be uploaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_base64: Option<String>,
}

// ── Router ──────────────────────────────────────────────────────────────────

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/orders", post(create_order))
        .route("/v1/orders/{id}", get(get_order))
        .route("/v1/orders/{id}/finalize", post(finalize_order))
}

/// Buyer, resolved owner or admin.
pub(crate) async fn authorize_order(
    state: &AppState,
    caller: &Actor,
    order: &LicenseOrder,
) -> Result<(), AppError> {
    if order.buyer_principal.as_ref() == Some(&caller.principal) {
        return Ok(());
    }
    state
        .ownership
        .authorize(caller, ResourceKind::LicenseOrder, order.order_id.as_str())
        .await?;
    Ok(())
}

async fn load_order(state: &AppState, raw_id: &str) -> Result<LicenseOrder, AppError> {
    let order_id = OrderId::new(raw_id)?;
    state
        .stores
        .orders
        .get(&order_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))
}

// ── Handlers ────────────────────────────────────────────────────────────────

/// POST /v1/orders
#[utoipa::path(
    post,
    path = "/v1/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created in `pending`", body = serde_json::Value),
        (status = 404, description = "IP asset not found", body = crate::error::ErrorBody),
        (status = 409, description = "Order id already exists", body = crate::error::ErrorBody),
        (status = 422, description = "Validation error", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn create_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    body: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<LicenseOrder>), AppError> {
    let req = extract_validated_json(body)?;
    let input = req.into_new_order(&actor, &state)?;
    let order = state.intake.create_order(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /v1/orders/{id}
#[utoipa::path(
    get,
    path = "/v1/orders/{id}",
    params(("id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order found", body = serde_json::Value),
        (status = 403, description = "Not the buyer or owner", body = crate::error::ErrorBody),
        (status = 404, description = "Not found", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn get_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
) -> Result<Json<LicenseOrder>, AppError> {
    let order = load_order(&state, &id).await?;
    authorize_order(&state, &actor, &order).await?;
    Ok(Json(order))
}

/// POST /v1/orders/{id}/finalize
///
/// Runs the saga inline. Lock contention is not an error: the response
/// reports `in_progress` or `already_finalized` with status 200.
#[utoipa::path(
    post,
    path = "/v1/orders/{id}/finalize",
    params(("id" = String, Path, description = "Order ID")),
    request_body = FinalizeRequest,
    responses(
        (status = 200, description = "Finalized, already finalized or in progress", body = FinalizeResponse),
        (status = 403, description = "Not the buyer or owner", body = crate::error::ErrorBody),
        (status = 404, description = "Order or IP asset not found", body = crate::error::ErrorBody),
        (status = 422, description = "Missing or mismatched payment proof, or unfunded escrow", body = crate::error::ErrorBody),
        (status = 502, description = "A finalization step failed", body = crate::error::ErrorBody),
    ),
    tag = "orders"
)]
pub(crate) async fn finalize_order(
    State(state): State<AppState>,
    Caller(actor): Caller,
    Path(id): Path<String>,
    body: Result<Json<FinalizeRequest>, JsonRejection>,
) -> Result<Json<FinalizeResponse>, AppError> {
    let req = extract_json(body)?;
    let order = load_order(&state, &id).await?;
    authorize_order(&state, &actor, &order).await?;
    let proof = req.into_proof(&order)?;

    let outcome = state
        .finalizer
        .lock_and_finalize(&actor, &order.order_id, proof)
        .await?;

    let status = outcome.as_str().to_string();
    let response = match outcome {
        FinalizeOutcome::Finalized(result) => {
            let archive_base64 = result.evidence.archive_uri.is_none().then(|| {
                base64::engine::general_purpose::STANDARD.encode(&result.archive.bytes)
            });
            FinalizeResponse {
                order_id: result.order_id.to_string(),
                status,
                mint_attempts: Some(result.mint_attempts),
                evidence: Some(result.evidence),
                archive_base64,
            }
        }
        FinalizeOutcome::AlreadyFinalized => {
            let current = state.stores.orders.get(&order.order_id).await?;
            FinalizeResponse {
                order_id: order.order_id.to_string(),
                status,
                evidence: current.and_then(|o| o.evidence),
                mint_attempts: None,
                archive_base64: None,
            }
        }
        FinalizeOutcome::InProgress => FinalizeResponse {
            order_id: order.order_id.to_string(),
            status,
            evidence: None,
            mint_attempts: None,
            archive_base64: None,
        },
    };
    Ok(Json(response))
}
