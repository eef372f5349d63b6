//! # Application State
//!
//! [`AppState`] is cloned into every handler. It holds the stores behind
//! trait objects and the domain services built on them, so a handler
//! never constructs anything per request.

use std::sync::Arc;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use lexlink_clients::ClientSet;
use lexlink_finalize::{
    BlockExplorer, Capabilities, CredentialIssuer, DisputeDesk, Finalizer,
    FundingPoller, Intake, LedgerClient, OwnershipResolver, TrainingRecorder,
};
use lexlink_state::Network;
use lexlink_store::{AuditLog, MemoryStore, OrderStore, PgStore, RecordStore};

use crate::config::AppConfig;

// ── Stores ──────────────────────────────────────────────────────────────────

/// The three store seams, backed by one implementation.
#[derive(Clone)]
pub struct Stores {
    pub orders: Arc<dyn OrderStore>,
    pub records: Arc<dyn RecordStore>,
    pub audit: Arc<dyn AuditLog>,
    /// Present for Postgres; the readiness probe pings it.
    pub pool: Option<PgPool>,
}

impl Stores {
    pub fn memory(lock_ttl: Duration) -> Self {
        let store = Arc::new(MemoryStore::with_lock_ttl(lock_ttl));
        Self {
            orders: store.clone(),
            records: store.clone(),
            audit: store,
            pool: None,
        }
    }

    /// Postgres when `database_url` is configured, in-memory otherwise.
    pub async fn from_config(config: &AppConfig) -> Result<Self, sqlx::Error> {
        let lock_ttl = Duration::from_secs(config.lock_ttl_secs);
        match &config.database_url {
            Some(url) => {
                let pool = lexlink_store::init_pool(url, config.db_max_connections).await?;
                Ok(Self::postgres(pool, lock_ttl))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store; data is lost on restart");
                Ok(Self::memory(lock_ttl))
            }
        }
    }

    pub fn postgres(pool: PgPool, lock_ttl: Duration) -> Self {
        let store = Arc::new(PgStore::with_lock_ttl(pool.clone(), lock_ttl));
        Self {
            orders: store.clone(),
            records: store.clone(),
            audit: store,
            pool: Some(pool),
        }
    }
}

// ── External services ───────────────────────────────────────────────────────

/// Saga capabilities plus the two clients only the poller uses.
#[derive(Clone)]
pub struct Services {
    pub capabilities: Capabilities,
    pub ledger: Arc<dyn LedgerClient>,
    pub explorer: Arc<dyn BlockExplorer>,
}

impl Services {
    pub fn from_clients(clients: &ClientSet, credentials: Arc<dyn CredentialIssuer>) -> Self {
        Self {
            capabilities: clients.capabilities(credentials),
            ledger: clients.ledger.clone(),
            explorer: clients.explorer.clone(),
        }
    }
}

// ── AppState ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub finalizer: Finalizer,
    pub poller: FundingPoller,
    pub intake: Intake,
    pub training: TrainingRecorder,
    pub disputes: DisputeDesk,
    pub ownership: OwnershipResolver,
    /// Network for orders created without one.
    pub default_network: Network,
    /// Renders `/metrics`. `None` when no recorder was installed.
    pub metrics: Option<PrometheusHandle>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("database", &self.stores.pool.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(stores: Stores, services: Services, config: &AppConfig) -> Self {
        let finalize = &config.finalize;
        let Stores {
            orders,
            records,
            audit,
            ..
        } = stores.clone();

        let training = TrainingRecorder::new(
            orders.clone(),
            records.clone(),
            audit.clone(),
            services.capabilities.anchor.clone(),
        );
        let finalizer = Finalizer::new(
            orders.clone(),
            records.clone(),
            audit.clone(),
            services.capabilities,
            finalize,
        );
        let poller = FundingPoller::new(
            finalizer.clone(),
            services.ledger,
            services.explorer,
            finalize.poll_concurrency,
        );

        Self {
            intake: Intake::new(
                orders.clone(),
                records.clone(),
                audit.clone(),
                config.ckbtc_escrow_owner.clone(),
            ),
            disputes: DisputeDesk::new(records.clone(), audit.clone()),
            ownership: OwnershipResolver::new(orders, records, audit),
            finalizer,
            poller,
            training,
            stores,
            default_network: config.network,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Whether the backing store answers.
    pub async fn is_ready(&self) -> bool {
        match &self.stores.pool {
            Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            None => true,
        }
    }
}
