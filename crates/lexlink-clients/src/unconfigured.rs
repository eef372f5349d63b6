//! Stand-in for capabilities without a configured endpoint.

use async_trait::async_trait;

use lexlink_core::OrderId;
use lexlink_finalize::{
    AddressFunding, AttestationSource, BlockExplorer, CapabilityError, ContentStore,
    LedgerAccount, LedgerClient, LicenseMinter, MintError, MintReceipt, MintRequest,
    PaymentVerifier,
};
use lexlink_state::Network;

/// Fails every call with [`CapabilityError::NotConfigured`].
#[derive(Debug, Clone, Copy)]
pub struct Unconfigured(pub &'static str);

impl Unconfigured {
    fn err(&self) -> CapabilityError {
        CapabilityError::NotConfigured(self.0)
    }
}

#[async_trait]
impl PaymentVerifier for Unconfigured {
    async fn confirm_payment(&self, _: &OrderId, _: &str) -> Result<(), CapabilityError> {
        Err(self.err())
    }
}

#[async_trait]
impl AttestationSource for Unconfigured {
    async fn fetch_attestation(&self, _: &OrderId) -> Result<String, CapabilityError> {
        Err(self.err())
    }
}

#[async_trait]
impl LicenseMinter for Unconfigured {
    async fn mint_license_token(&self, _: &MintRequest) -> Result<MintReceipt, MintError> {
        Err(MintError::Rejected(self.err().to_string()))
    }
}

#[async_trait]
impl LedgerClient for Unconfigured {
    async fn balance_of(&self, _: &LedgerAccount) -> Result<u64, CapabilityError> {
        Err(self.err())
    }
}

#[async_trait]
impl BlockExplorer for Unconfigured {
    async fn address_funding(&self, _: &str, _: Network) -> Result<AddressFunding, CapabilityError> {
        Err(self.err())
    }
}

#[async_trait]
impl ContentStore for Unconfigured {
    async fn upload(&self, _: &str, _: &[u8]) -> Result<String, CapabilityError> {
        Err(self.err())
    }
}
