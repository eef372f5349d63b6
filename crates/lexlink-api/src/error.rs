//! # API Error Types
//!
//! [`AppError`] implements `IntoResponse` and is the only error handlers
//! return. Domain errors from `lexlink-finalize` and `lexlink-store` map
//! onto it here, so every route shares one status-code policy:
//!
//! | Domain error | Status |
//! |--------------|--------|
//! | validation, payment-mode mismatch, missing proof, unfunded escrow | 422 |
//! | unknown order, IP asset or dispute | 404 |
//! | not the owner | 403 |
//! | duplicate id, illegal status move | 409 |
//! | a capability failed during the saga | 502 |
//! | store or canonicalization failure | 500 |
//!
//! 500 and 502 bodies never carry the underlying message; it is logged.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use lexlink_finalize::{AccessError, FinalizeError};
use lexlink_store::StoreError;

/// Structured JSON error response body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    /// Machine-readable code (`NOT_FOUND`, `VALIDATION_ERROR`, ...).
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    /// Body could not be parsed.
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// A finalization step failed against an external service.
    #[error("{step} failed: {message}")]
    Upstream { step: &'static str, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Upstream { .. } => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        let (message, details) = match &self {
            Self::Internal(_) => {
                tracing::error!(error = %self, "internal server error");
                ("An internal error occurred".to_string(), None)
            }
            Self::Upstream { step, .. } => {
                tracing::error!(error = %self, "upstream service error");
                (
                    "An upstream service error occurred".to_string(),
                    Some(serde_json::json!({ "step": step })),
                )
            }
            other => (other.to_string(), None),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<lexlink_core::ValidationError> for AppError {
    fn from(err: lexlink_core::ValidationError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match &err {
            StoreError::NotFound { .. } => Self::NotFound(err.to_string()),
            StoreError::DuplicateOrder(_)
            | StoreError::DuplicateRecord { .. }
            | StoreError::InvalidTransition(_)
            | StoreError::InvalidDisputeTransition(_) => Self::Conflict(err.to_string()),
            _ => Self::Internal(err.to_string()),
        }
    }
}

impl From<FinalizeError> for AppError {
    fn from(err: FinalizeError) -> Self {
        match err {
            FinalizeError::Validation(e) => e.into(),
            FinalizeError::OrderNotFound(_) | FinalizeError::IpNotFound(_) => {
                Self::NotFound(err.to_string())
            }
            FinalizeError::MissingPaymentProof(_)
            | FinalizeError::PaymentModeMismatch { .. }
            | FinalizeError::Unfunded { .. } => Self::Validation(err.to_string()),
            FinalizeError::Store(e) => e.into(),
            FinalizeError::Canonicalization(_) => Self::Internal(err.to_string()),
            FinalizeError::Payment(_)
            | FinalizeError::Ledger(_)
            | FinalizeError::Attestation(_)
            | FinalizeError::Mint(_)
            | FinalizeError::Media(_)
            | FinalizeError::Archive(_)
            | FinalizeError::Credential(_) => Self::Upstream {
                step: err.step(),
                message: err.to_string(),
            },
        }
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        match err {
            AccessError::Forbidden { .. } => Self::Forbidden(err.to_string()),
            AccessError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use lexlink_core::{OrderId, Principal};
    use lexlink_finalize::{CapabilityError, MintError};
    use lexlink_state::ResourceKind;

    #[test]
    fn status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND"),
            (
                AppError::Validation("x".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
            ),
            (AppError::BadRequest("x".into()), StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            (AppError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            (AppError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN"),
            (AppError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT"),
            (
                AppError::Internal("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
            ),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status_and_code(), (status, code));
        }
    }

    #[test]
    fn finalize_errors_map_by_kind() {
        let id = OrderId::new("o-1").unwrap();
        assert!(matches!(
            AppError::from(FinalizeError::OrderNotFound(id.clone())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(FinalizeError::MissingPaymentProof(id.clone())),
            AppError::Validation(_)
        ));
        assert!(matches!(
            AppError::from(FinalizeError::Unfunded {
                order_id: id.clone(),
                required: 1_000,
                received: 0,
            }),
            AppError::Validation(_)
        ));
        assert!(matches!(
            AppError::from(FinalizeError::Ledger(CapabilityError::NotConfigured("ledger"))),
            AppError::Upstream { step: "payment", .. }
        ));
        assert!(matches!(
            AppError::from(FinalizeError::Mint(MintError::EmptyTokenIds)),
            AppError::Upstream { step: "mint", .. }
        ));
        assert!(matches!(
            AppError::from(FinalizeError::Payment(CapabilityError::NotConfigured("payments"))),
            AppError::Upstream { step: "payment", .. }
        ));
        assert!(matches!(
            AppError::from(FinalizeError::Store(StoreError::DuplicateOrder(id))),
            AppError::Conflict(_)
        ));
    }

    #[test]
    fn access_errors_map_to_forbidden() {
        let err = AccessError::Forbidden {
            principal: Principal::new("p").unwrap(),
            kind: ResourceKind::LicenseOrder,
            id: "o-1".into(),
        };
        assert!(matches!(AppError::from(err), AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn upstream_body_hides_message_but_names_step() {
        let resp = AppError::Upstream {
            step: "mint",
            message: "registry said secret things".into(),
        }
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.error.code, "UPSTREAM_ERROR");
        assert!(!body.error.message.contains("secret"));
        assert_eq!(body.error.details.unwrap()["step"], "mint");
    }

    #[tokio::test]
    async fn internal_body_hides_message() {
        let resp = AppError::Internal("pool exhausted".into()).into_response();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("pool exhausted"));
    }
}
