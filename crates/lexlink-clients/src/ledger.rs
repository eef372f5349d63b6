//! Balance queries against the token ledger gateway.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

use lexlink_finalize::{CapabilityError, LedgerAccount, LedgerClient};

use crate::http::Service;

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    #[serde(deserialize_with = "u64_from_string_or_number")]
    balance: u64,
}

/// Ledgers report big naturals as strings; accept both forms.
fn u64_from_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(u64),
        Text(String),
    }
    match Raw::deserialize(d)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// `POST /ledger/balance` with `{owner, subaccount}`.
#[derive(Debug, Clone)]
pub struct HttpLedgerClient {
    service: Service,
}

impl HttpLedgerClient {
    pub(crate) fn new(service: Service) -> Self {
        Self { service }
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn balance_of(&self, account: &LedgerAccount) -> Result<u64, CapabilityError> {
        let url = self.service.url("ledger/balance");
        let resp = self
            .service
            .send(self.service.http().post(&url).json(account), "balance_of")
            .await?;
        let body: BalanceResponse = self.service.json(resp, "balance_of").await?;
        Ok(body.balance)
    }
}
