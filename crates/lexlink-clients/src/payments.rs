//! Payment confirmation for native-chain (`btc`) orders.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lexlink_core::OrderId;
use lexlink_finalize::{CapabilityError, PaymentVerifier};

use crate::http::Service;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmRequest<'a> {
    order_id: &'a OrderId,
    tx_reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct ConfirmResponse {
    confirmed: bool,
    #[serde(default)]
    reason: Option<String>,
}

/// `POST /payments/confirm`.
#[derive(Debug, Clone)]
pub struct HttpPaymentVerifier {
    service: Service,
}

impl HttpPaymentVerifier {
    pub(crate) fn new(service: Service) -> Self {
        Self { service }
    }
}

#[async_trait]
impl PaymentVerifier for HttpPaymentVerifier {
    async fn confirm_payment(
        &self,
        order_id: &OrderId,
        tx_reference: &str,
    ) -> Result<(), CapabilityError> {
        let url = self.service.url("payments/confirm");
        let body = ConfirmRequest {
            order_id,
            tx_reference,
        };
        let resp = self
            .service
            .send(self.service.http().post(&url).json(&body), "confirm_payment")
            .await?;
        let result: ConfirmResponse = self.service.json(resp, "confirm_payment").await?;
        if !result.confirmed {
            return Err(CapabilityError::Rejected {
                capability: self.service.capability(),
                message: result
                    .reason
                    .unwrap_or_else(|| format!("payment {tx_reference} not confirmed")),
            });
        }
        Ok(())
    }
}
