//! License minting against the IP registry service.
//!
//! The registry relays chain errors as text, so failures are classified
//! with [`MintError::from_message`]; nonce collisions become retryable
//! [`MintError::NonceConflict`] values and everything else is final.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lexlink_core::{EvmAddress, IpId, OrderId};
use lexlink_finalize::{LicenseMinter, MintError, MintReceipt, MintRequest};

use crate::http::{truncate, Service};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MintBody<'a> {
    ip_id: &'a IpId,
    license_terms_id: &'a str,
    receiver: &'a EvmAddress,
    order_id: &'a OrderId,
    amount: u32,
}

impl<'a> MintBody<'a> {
    fn single(request: &'a MintRequest) -> Self {
        Self {
            ip_id: &request.ip_id,
            license_terms_id: &request.license_terms_id,
            receiver: &request.receiver,
            order_id: &request.order_id,
            amount: 1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintResponse {
    #[serde(default)]
    license_token_ids: Vec<serde_json::Value>,
    #[serde(default)]
    tx_hash: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Token ids arrive as numbers or strings depending on the chain client.
fn token_id_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn error_text(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
        .unwrap_or_else(|| truncate(body))
}

/// `POST /licenses/mint`.
#[derive(Debug, Clone)]
pub struct HttpLicenseMinter {
    service: Service,
}

impl HttpLicenseMinter {
    pub(crate) fn new(service: Service) -> Self {
        Self { service }
    }
}

#[async_trait]
impl LicenseMinter for HttpLicenseMinter {
    async fn mint_license_token(&self, request: &MintRequest) -> Result<MintReceipt, MintError> {
        let url = self.service.url("licenses/mint");
        let body = MintBody::single(request);
        let resp = self
            .service
            .http()
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| MintError::Transport(format!("mint_license_token: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let message = error_text(&text);
            tracing::debug!(order_id = %request.order_id, %status, "registry refused mint: {message}");
            return Err(MintError::from_message(message));
        }

        let parsed: MintResponse = resp
            .json()
            .await
            .map_err(|e| MintError::Rejected(format!("mint response deserialization failed: {e}")))?;
        Ok(MintReceipt {
            token_ids: parsed
                .license_token_ids
                .iter()
                .filter_map(token_id_string)
                .collect(),
            tx_hash: parsed.tx_hash,
        })
    }
}
