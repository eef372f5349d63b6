//! Attestation documents, fetched as raw JSON text.

use async_trait::async_trait;

use lexlink_core::OrderId;
use lexlink_finalize::{AttestationSource, CapabilityError};

use crate::http::Service;

/// `GET /attestations/{order_id}`.
#[derive(Debug, Clone)]
pub struct HttpAttestationSource {
    service: Service,
}

impl HttpAttestationSource {
    pub(crate) fn new(service: Service) -> Self {
        Self { service }
    }
}

#[async_trait]
impl AttestationSource for HttpAttestationSource {
    async fn fetch_attestation(&self, order_id: &OrderId) -> Result<String, CapabilityError> {
        let url = self.service.url(&format!("attestations/{order_id}"));
        let resp = self.service.get_with_retry(&url, "fetch_attestation").await?;
        let text = resp
            .text()
            .await
            .map_err(|e| self.service.invalid(format!("fetch_attestation: {e}")))?;
        if text.trim().is_empty() {
            return Err(self.service.invalid("fetch_attestation: empty document"));
        }
        Ok(text)
    }
}
