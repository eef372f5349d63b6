//! # Authentication
//!
//! Bearer token middleware that turns every authenticated request into an
//! [`Actor`].
//!
//! ## Token Format
//!
//! ```text
//! Bearer {role}:{principal}:{secret}   role is `creator` or `admin`
//! Bearer {secret}                      operator token, treated as admin
//! ```
//!
//! The `system` role is reserved for the background poller and is never
//! accepted from a token. Ownership checks happen in the handlers through
//! `OwnershipResolver`; this module only establishes who is calling.

use axum::extract::Request;
use axum::http::request::Parts;
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use subtle::ConstantTimeEq;

use lexlink_core::Principal;
use lexlink_state::{Actor, Role};

use crate::error::{AppError, ErrorBody, ErrorDetail};

/// Principal used for the legacy single-secret token and for requests
/// when auth is disabled.
pub const OPERATOR_PRINCIPAL: &str = "operator";

// ── Caller ──────────────────────────────────────────────────────────────────

/// The authenticated actor, extracted from request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub Actor);

impl Caller {
    pub fn actor(&self) -> &Actor {
        &self.0
    }
}

impl<S: Send + Sync> axum::extract::FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("no caller identity in request context".into()))
    }
}

/// 403 unless the caller holds at least `minimum`.
pub fn require_role(caller: &Caller, minimum: Role) -> Result<(), AppError> {
    if caller.0.role >= minimum {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role '{}' required, caller has '{}'",
            minimum.as_str(),
            caller.0.role.as_str()
        )))
    }
}

// ── Auth Configuration ──────────────────────────────────────────────────────

/// Shared secret injected into request extensions. `None` disables auth.
///
/// Custom `Debug` redacts the token.
#[derive(Clone)]
pub struct AuthConfig {
    pub token: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

// ── Token Validation ────────────────────────────────────────────────────────

/// Constant-time comparison. A length mismatch still performs a compare.
fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

fn operator() -> Result<Actor, String> {
    let principal = Principal::new(OPERATOR_PRINCIPAL).map_err(|e| e.to_string())?;
    Ok(Actor::new(principal, Role::Admin))
}

/// Parse `{role}:{principal}:{secret}` or a bare `{secret}`.
pub fn parse_bearer_token(provided: &str, expected_secret: &str) -> Result<Actor, String> {
    let parts: Vec<&str> = provided.splitn(3, ':').collect();
    match parts.as_slice() {
        [secret] => {
            if constant_time_token_eq(secret, expected_secret) {
                operator()
            } else {
                Err("invalid bearer token".into())
            }
        }
        [role, principal, secret] => {
            if !constant_time_token_eq(secret, expected_secret) {
                return Err("invalid bearer token".into());
            }
            let role = match Role::parse(role) {
                Some(Role::System) => return Err("role 'system' cannot be claimed".into()),
                Some(role) => role,
                None => return Err(format!("unknown role: {role}")),
            };
            let principal =
                Principal::new(principal).map_err(|e| format!("invalid principal: {e}"))?;
            Ok(Actor::new(principal, role))
        }
        _ => Err("invalid token format, expected {role}:{principal}:{secret} or {secret}".into()),
    }
}

// ── Middleware ──────────────────────────────────────────────────────────────

/// Validate the bearer token and insert a [`Caller`] into extensions.
///
/// With no configured token every request runs as the operator.
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let expected = request
        .extensions()
        .get::<AuthConfig>()
        .and_then(|c| c.token.clone());

    let actor = match expected {
        Some(expected) => {
            let auth_header = request
                .headers()
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok());
            match auth_header {
                Some(value) => match value.strip_prefix("Bearer ") {
                    Some(provided) => match parse_bearer_token(provided, &expected) {
                        Ok(actor) => actor,
                        Err(msg) => {
                            tracing::warn!(reason = %msg, "authentication failed");
                            return unauthorized_response(&msg);
                        }
                    },
                    None => {
                        tracing::warn!("authentication failed: non-Bearer authorization scheme");
                        return unauthorized_response("authorization header must use Bearer scheme");
                    }
                },
                None => {
                    tracing::warn!("authentication failed: missing authorization header");
                    return unauthorized_response("missing authorization header");
                }
            }
        }
        None => match operator() {
            Ok(actor) => actor,
            Err(msg) => return AppError::Internal(msg).into_response(),
        },
    };

    request.extensions_mut().insert(Caller(actor));
    next.run(request).await
}

fn unauthorized_response(message: &str) -> Response {
    let body = ErrorBody {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            details: None,
        },
    };
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}
