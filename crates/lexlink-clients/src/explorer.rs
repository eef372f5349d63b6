//! Esplora-compatible block explorer.
//!
//! Networks other than mainnet live under a path prefix (`/testnet`,
//! `/signet`), the layout public Esplora deployments use. Regtest has no
//! prefix; point the base URL at the local instance.

use async_trait::async_trait;
use serde::Deserialize;

use lexlink_finalize::{AddressFunding, BlockExplorer, CapabilityError};
use lexlink_state::Network;

use crate::http::Service;

#[derive(Debug, Deserialize)]
struct Utxo {
    txid: String,
    value: u64,
    status: UtxoStatus,
}

#[derive(Debug, Deserialize)]
struct UtxoStatus {
    confirmed: bool,
    #[serde(default)]
    block_height: Option<u64>,
}

fn network_prefix(network: Network) -> &'static str {
    match network {
        Network::Mainnet | Network::Regtest => "",
        Network::Testnet => "testnet/",
        Network::Signet => "signet/",
    }
}

#[derive(Debug, Clone)]
pub struct EsploraExplorer {
    service: Service,
}

impl EsploraExplorer {
    pub(crate) fn new(service: Service) -> Self {
        Self { service }
    }

    async fn tip_height(&self, prefix: &str) -> Result<u64, CapabilityError> {
        let url = self.service.url(&format!("{prefix}api/blocks/tip/height"));
        let resp = self.service.get_with_retry(&url, "tip_height").await?;
        let text = resp
            .text()
            .await
            .map_err(|e| self.service.invalid(format!("tip_height: {e}")))?;
        text.trim()
            .parse()
            .map_err(|_| self.service.invalid(format!("tip_height: not a number: {text}")))
    }
}

/// Sum of all outputs to the address. Confirmations are those of the
/// least-confirmed output, so a fresh top-up never counts as settled.
/// `tx_id` is the transaction of the largest output.
fn summarize(utxos: &[Utxo], tip: Option<u64>) -> AddressFunding {
    if utxos.is_empty() {
        return AddressFunding::default();
    }
    let received_sats = utxos.iter().map(|u| u.value).sum();
    let confirmations = utxos
        .iter()
        .map(|u| match (u.status.confirmed, u.status.block_height, tip) {
            (true, Some(height), Some(tip)) => tip.saturating_sub(height).saturating_add(1),
            _ => 0,
        })
        .min()
        .unwrap_or(0);
    let tx_id = utxos.iter().max_by_key(|u| u.value).map(|u| u.txid.clone());
    AddressFunding {
        received_sats,
        confirmations: u32::try_from(confirmations).unwrap_or(u32::MAX),
        tx_id,
    }
}

#[async_trait]
impl BlockExplorer for EsploraExplorer {
    async fn address_funding(
        &self,
        address: &str,
        network: Network,
    ) -> Result<AddressFunding, CapabilityError> {
        let prefix = network_prefix(network);
        let url = self
            .service
            .url(&format!("{prefix}api/address/{address}/utxo"));
        let resp = self.service.get_with_retry(&url, "address_utxo").await?;
        let utxos: Vec<Utxo> = self.service.json(resp, "address_utxo").await?;

        let tip = if utxos.iter().any(|u| u.status.confirmed) {
            Some(self.tip_height(prefix).await?)
        } else {
            None
        };
        Ok(summarize(&utxos, tip))
    }
}
