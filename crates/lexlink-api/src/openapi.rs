//! # OpenAPI Document
//!
//! Collects every annotated route into one document served at
//! `/openapi.json`.

use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::state::AppState;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some(
                            "`{role}:{principal}:{secret}` or the bare operator secret (AUTH_TOKEN).",
                        ))
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "LexLink API",
        description = "License order intake and finalization: escrow funding, license minting, \
                       hashed and anchored evidence, archives and verifiable credentials.\n\n\
                       All `/v1/*` endpoints require a Bearer token. Health probes and \
                       `/metrics` are unauthenticated.",
        license(name = "AGPL-3.0-or-later")
    ),
    security(("bearer_auth" = [])),
    paths(
        // ── Orders ───────────────────────────────────────────────────────
        crate::routes::orders::create_order,
        crate::routes::orders::get_order,
        crate::routes::orders::finalize_order,
        // ── IP assets ────────────────────────────────────────────────────
        crate::routes::ip_assets::register_ip,
        crate::routes::ip_assets::get_ip,
        crate::routes::ip_assets::list_ip_orders,
        crate::routes::ip_assets::record_training,
        // ── Disputes ─────────────────────────────────────────────────────
        crate::routes::disputes::raise_dispute,
        crate::routes::disputes::get_dispute,
        crate::routes::disputes::respond_dispute,
        crate::routes::disputes::resolve_dispute,
        // ── Operations ───────────────────────────────────────────────────
        crate::routes::poll::run_poll,
        crate::routes::audit::verify_chain,
        crate::routes::audit::resource_events,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorDetail,
            crate::routes::orders::CreateOrderRequest,
            crate::routes::orders::FinalizeRequest,
            crate::routes::orders::FinalizeResponse,
            crate::routes::ip_assets::RegisterIpRequest,
            crate::routes::ip_assets::CreatorInput,
            crate::routes::ip_assets::TrainingBatchRequest,
            crate::routes::ip_assets::TrainingBatchResponse,
            crate::routes::disputes::RaiseDisputeRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "orders", description = "License orders and finalization"),
        (name = "ip-assets", description = "IP registration and training usage"),
        (name = "disputes", description = "Disputes against IP assets"),
        (name = "operations", description = "Funding poller"),
        (name = "audit", description = "Audit trail"),
    )
)]
pub struct ApiDoc;

pub fn router() -> Router<AppState> {
    Router::new().route("/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = doc["paths"].as_object().unwrap();
        for path in [
            "/v1/orders",
            "/v1/orders/{id}",
            "/v1/orders/{id}/finalize",
            "/v1/ip-assets",
            "/v1/ip-assets/{id}/training-batches",
            "/v1/ip-assets/{id}/disputes",
            "/v1/disputes/{id}/resolve",
            "/v1/poll",
            "/v1/audit/verify",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
        assert!(doc["components"]["securitySchemes"]["bearer_auth"].is_object());
    }
}
