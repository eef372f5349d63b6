//! Scriptable fakes for every capability, plus a seeded harness.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use lexlink_core::{sha256_bytes_hex, EvmAddress, IpId, OrderId, Principal};
use lexlink_finalize::{
    AddressFunding, ArchiveBuilder, ArchiveInput, AttestationSource, BlockExplorer, BuiltArchive,
    Capabilities, CapabilityError, ContentStore, CredentialIssuer, CredentialRequest,
    EvidenceAnchor, FinalizeConfig, Finalizer, FundingPoller, IssuedCredential, LedgerAccount,
    LedgerClient, LicenseMinter, MediaFetcher, MintError, MintReceipt, MintRequest,
    PaymentVerifier,
};
use lexlink_state::{
    AnchorOutcome, Creator, IpAsset, LicenseOrder, Network, NewIpAsset, NewOrder, PaymentMode,
    TrainingBatch,
};
use lexlink_store::{MemoryStore, OrderStore, RecordStore};

pub const MEDIA: &[u8] = b"known media bytes";
pub const ESCROW_OWNER: &str = "escrow-owner";

// ── Fakes ────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakePayment {
    pub calls: Mutex<Vec<String>>,
    pub reject: Mutex<bool>,
}

#[async_trait]
impl PaymentVerifier for FakePayment {
    async fn confirm_payment(&self, _: &OrderId, tx: &str) -> Result<(), CapabilityError> {
        self.calls.lock().push(tx.to_string());
        if *self.reject.lock() {
            return Err(CapabilityError::Rejected {
                capability: "payment",
                message: "unconfirmed".into(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAttestation {
    /// Served instead of the default document when set.
    pub document: Mutex<Option<String>>,
}

#[async_trait]
impl AttestationSource for FakeAttestation {
    async fn fetch_attestation(&self, order_id: &OrderId) -> Result<String, CapabilityError> {
        let document = self.document.lock().clone();
        Ok(document.unwrap_or_else(|| {
            format!(r#"{{"orderId":"{order_id}","attestor":"lab","ok":true}}"#)
        }))
    }
}

#[derive(Default)]
pub struct FakeMinter {
    pub script: Mutex<VecDeque<Result<MintReceipt, MintError>>>,
    pub calls: Mutex<u32>,
    pub delay: Mutex<Option<Duration>>,
}

impl FakeMinter {
    pub fn push(&self, result: Result<MintReceipt, MintError>) {
        self.script.lock().push_back(result);
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock()
    }
}

pub fn receipt(token_id: &str) -> MintReceipt {
    MintReceipt {
        token_ids: vec![token_id.to_string()],
        tx_hash: Some("0xfeed".into()),
    }
}

#[async_trait]
impl LicenseMinter for FakeMinter {
    async fn mint_license_token(&self, _: &MintRequest) -> Result<MintReceipt, MintError> {
        *self.calls.lock() += 1;
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| Ok(receipt("1")))
    }
}

#[derive(Default)]
pub struct FakeMedia {
    pub fail: Mutex<bool>,
    pub calls: Mutex<u32>,
}

#[async_trait]
impl MediaFetcher for FakeMedia {
    async fn fetch_media(&self, _: &str) -> Result<Vec<u8>, CapabilityError> {
        *self.calls.lock() += 1;
        if *self.fail.lock() {
            return Err(CapabilityError::Status {
                capability: "media",
                status: 404,
                body: "gone".into(),
            });
        }
        Ok(MEDIA.to_vec())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorMode {
    Ok,
    Throw,
    Skip,
}

pub struct FakeAnchor {
    pub mode: Mutex<AnchorMode>,
}

impl Default for FakeAnchor {
    fn default() -> Self {
        Self {
            mode: Mutex::new(AnchorMode::Ok),
        }
    }
}

#[async_trait]
impl EvidenceAnchor for FakeAnchor {
    async fn publish_evidence(
        &self,
        hash: &str,
        _: &serde_json::Value,
    ) -> Result<AnchorOutcome, CapabilityError> {
        let mode = *self.mode.lock();
        match mode {
            AnchorMode::Ok => Ok(AnchorOutcome::Ok {
                tx_ref: format!("anchor-{}", &hash[..8]),
                explorer_url: Some(format!("https://explorer.example/tx/{}", &hash[..8])),
            }),
            AnchorMode::Throw => Err(CapabilityError::Transport {
                capability: "anchor",
                message: "connection reset".into(),
            }),
            AnchorMode::Skip => Ok(AnchorOutcome::Skipped {
                reason: "anchoring not configured".into(),
            }),
        }
    }
}

pub struct FakeArchive;

#[async_trait]
impl ArchiveBuilder for FakeArchive {
    async fn build_archive(&self, input: &ArchiveInput) -> Result<BuiltArchive, CapabilityError> {
        let mut bytes = input.media.clone();
        bytes.extend_from_slice(input.proof_fields.to_string().as_bytes());
        Ok(BuiltArchive {
            archive_hash: sha256_bytes_hex(&bytes),
            file_name: format!("{}.zip", input.order_id),
            bytes,
        })
    }
}

#[derive(Default)]
pub struct FakeContentStore {
    pub fail: Mutex<bool>,
}

#[async_trait]
impl ContentStore for FakeContentStore {
    async fn upload(&self, name: &str, _: &[u8]) -> Result<String, CapabilityError> {
        if *self.fail.lock() {
            return Err(CapabilityError::NotConfigured("content_store"));
        }
        Ok(format!("ipfs://bafy/{name}"))
    }
}

pub struct FakeCredentials;

#[async_trait]
impl CredentialIssuer for FakeCredentials {
    async fn issue_credential(
        &self,
        request: &CredentialRequest,
    ) -> Result<IssuedCredential, CapabilityError> {
        let document = serde_json::json!({
            "type": ["VerifiableCredential", "LicenseCredential"],
            "credentialSubject": request,
        });
        Ok(IssuedCredential {
            hash: sha256_bytes_hex(document.to_string().as_bytes()),
            document,
        })
    }
}

#[derive(Default)]
pub struct FakeLedger {
    pub balances: Mutex<HashMap<String, u64>>,
}

impl FakeLedger {
    pub fn credit(&self, order: &LicenseOrder, amount: u64) {
        self.balances
            .lock()
            .insert(order.ckbtc_subaccount.to_hex(), amount);
    }
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn balance_of(&self, account: &LedgerAccount) -> Result<u64, CapabilityError> {
        Ok(self
            .balances
            .lock()
            .get(&account.subaccount.to_hex())
            .copied()
            .unwrap_or(0))
    }
}

#[derive(Default)]
pub struct FakeExplorer {
    pub funding: Mutex<HashMap<String, AddressFunding>>,
    pub failing: Mutex<Vec<String>>,
}

impl FakeExplorer {
    pub fn fund(&self, address: &str, sats: u64, confirmations: u32) {
        self.funding.lock().insert(
            address.to_string(),
            AddressFunding {
                received_sats: sats,
                confirmations,
                tx_id: Some(format!("tx-{address}")),
            },
        );
    }
}

#[async_trait]
impl BlockExplorer for FakeExplorer {
    async fn address_funding(
        &self,
        address: &str,
        _: Network,
    ) -> Result<AddressFunding, CapabilityError> {
        if self.failing.lock().iter().any(|a| a == address) {
            return Err(CapabilityError::Status {
                capability: "explorer",
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(self
            .funding
            .lock()
            .get(address)
            .cloned()
            .unwrap_or_default())
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub struct Harness {
    pub store: MemoryStore,
    pub payment: Arc<FakePayment>,
    pub attestation: Arc<FakeAttestation>,
    pub minter: Arc<FakeMinter>,
    pub media: Arc<FakeMedia>,
    pub anchor: Arc<FakeAnchor>,
    pub uploads: Arc<FakeContentStore>,
    pub ledger: Arc<FakeLedger>,
    pub explorer: Arc<FakeExplorer>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            payment: Arc::default(),
            attestation: Arc::default(),
            minter: Arc::default(),
            media: Arc::default(),
            anchor: Arc::default(),
            uploads: Arc::default(),
            ledger: Arc::default(),
            explorer: Arc::default(),
        }
    }

    pub fn finalizer(&self) -> Finalizer {
        self.finalizer_with_orders(Arc::new(self.store.clone()))
    }

    /// A finalizer whose order store is `orders`; records and audit stay on
    /// the harness store.
    pub fn finalizer_with_orders(&self, orders: Arc<dyn OrderStore>) -> Finalizer {
        let store = Arc::new(self.store.clone());
        Finalizer::new(
            orders,
            store.clone(),
            store,
            Capabilities {
                payment: self.payment.clone(),
                ledger: self.ledger.clone(),
                attestation: self.attestation.clone(),
                minter: self.minter.clone(),
                media: self.media.clone(),
                anchor: self.anchor.clone(),
                archive: Arc::new(FakeArchive),
                content_store: self.uploads.clone(),
                credentials: Arc::new(FakeCredentials),
            },
            &FinalizeConfig::default(),
        )
    }

    pub fn poller(&self) -> FundingPoller {
        FundingPoller::new(
            self.finalizer(),
            self.ledger.clone(),
            self.explorer.clone(),
            4,
        )
    }

    pub async fn seed_ip(&self) -> IpAsset {
        let ip = IpAsset::register(
            NewIpAsset {
                ip_id: IpId::new("ip-1").unwrap(),
                title: "Night Drive".into(),
                media_url: "https://media.example/night-drive.mp3".into(),
                license_terms_id: "terms-commercial".into(),
                royalty_bps: 500,
                commercial_use: true,
                derivatives_allowed: false,
                creators: vec![Creator {
                    name: "Ada".into(),
                    contribution_percent: 100,
                }],
                parent_ip_ids: vec![],
                content_hash: Some(sha256_bytes_hex(MEDIA)),
            },
            Some(Principal::new("creator-1").unwrap()),
            Utc::now(),
        )
        .unwrap();
        self.store.insert_ip(ip.clone()).await.unwrap();
        ip
    }

    pub async fn seed_order(&self, id: &str, mode: PaymentMode, amount_sats: i64) -> LicenseOrder {
        let order = LicenseOrder::new_pending(
            NewOrder {
                order_id: OrderId::new(id).unwrap(),
                ip_id: IpId::new("ip-1").unwrap(),
                buyer_principal: Some(Principal::new("buyer-1").unwrap()),
                mint_to: EvmAddress::parse("0x1111111111111111111111111111111111111111").unwrap(),
                payment_mode: mode,
                amount_sats,
                network: Network::Testnet,
                btc_address: Some(format!("tb1q{}escrowaddress0000000000", id.replace('-', ""))),
                owner_principal: None,
            },
            ESCROW_OWNER,
            Utc::now(),
        )
        .unwrap();
        self.store.insert(order.clone()).await.unwrap();
        order
    }

    pub async fn seed_training(&self, units: u64) {
        self.store
            .insert_training_batch(TrainingBatch {
                batch_id: uuid::Uuid::new_v4(),
                ip_id: IpId::new("ip-1").unwrap(),
                units,
                evidence_hash: "b".repeat(64),
                anchor: AnchorOutcome::Skipped {
                    reason: "test".into(),
                },
                owner_principal: None,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    pub async fn order(&self, id: &str) -> LicenseOrder {
        self.store
            .get(&OrderId::new(id).unwrap())
            .await
            .unwrap()
            .unwrap()
    }
}
