//! Evidence anchoring over HTTP.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lexlink_finalize::{CapabilityError, EvidenceAnchor};
use lexlink_state::AnchorOutcome;

use crate::http::Service;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnchorRequest<'a> {
    evidence_hash: &'a str,
    payload: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnchorResponse {
    tx_ref: String,
    #[serde(default)]
    explorer_url: Option<String>,
}

/// `POST /anchors`.
#[derive(Debug, Clone)]
pub struct HttpEvidenceAnchor {
    service: Service,
}

impl HttpEvidenceAnchor {
    pub(crate) fn new(service: Service) -> Self {
        Self { service }
    }
}

#[async_trait]
impl EvidenceAnchor for HttpEvidenceAnchor {
    async fn publish_evidence(
        &self,
        evidence_hash: &str,
        payload: &serde_json::Value,
    ) -> Result<AnchorOutcome, CapabilityError> {
        let url = self.service.url("anchors");
        let body = AnchorRequest {
            evidence_hash,
            payload,
        };
        let resp = self
            .service
            .send(self.service.http().post(&url).json(&body), "publish_evidence")
            .await?;
        let anchored: AnchorResponse = self.service.json(resp, "publish_evidence").await?;
        if anchored.tx_ref.trim().is_empty() {
            return Err(self.service.invalid("publish_evidence: empty txRef"));
        }
        Ok(AnchorOutcome::Ok {
            tx_ref: anchored.tx_ref,
            explorer_url: anchored.explorer_url,
        })
    }
}
