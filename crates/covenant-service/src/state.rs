//! Shared application state and start-up wiring

use std::sync::Arc;
use std::time::Duration;

use covenant_detectors::DetectorSet;
use covenant_gate::providers::{HttpCompletionProvider, ProviderRegistry};
use covenant_gate::{ConfidenceRegistry, GatedClient, Gatekeeper, GatekeeperConfig};
use covenant_ledger::{LedgerStore, MemoryLedgerBackend, SqliteLedgerBackend};
use covenant_learning::{
    AutoTuner, LearningRecorder, LearningStore, MemoryLearningStore, SqliteLearningStore,
};
use covenant_policy::{
    CategoryResolver, DriftBounds, MemoryPolicyStore, PolicyRegistry, PolicyStore,
    SqlitePolicyStore,
};
use covenant_types::EnforcementMode;
use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::config::{CovenantConfig, StorageConfig};
use crate::error::ServiceResult;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerStore>,
    pub policies: Arc<PolicyRegistry>,
    pub recorder: LearningRecorder,
    pub gatekeeper: Arc<Gatekeeper>,
    pub client: Arc<GatedClient>,
    pub tuner: AutoTuner,

    /// Injected into every gate call that does not name its own mode.
    pub default_mode: EnforcementMode,

    /// Upper bound on one HTTP request, enforced by the router.
    pub request_timeout: Duration,

    ingest_secret: Arc<str>,

    pub version: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

struct Stores {
    ledger: Arc<LedgerStore>,
    policies: Arc<dyn PolicyStore>,
    learning: Arc<dyn LearningStore>,
}

async fn open_stores(storage: &StorageConfig) -> ServiceResult<Stores> {
    match storage {
        StorageConfig::Memory => Ok(Stores {
            ledger: Arc::new(LedgerStore::new(Arc::new(MemoryLedgerBackend::new()))),
            policies: Arc::new(MemoryPolicyStore::new()),
            learning: Arc::new(MemoryLearningStore::new()),
        }),
        StorageConfig::Sqlite {
            url,
            max_connections,
        } => {
            let pool = covenant_ledger::sqlite::connect(url, *max_connections).await?;
            let ledger = SqliteLedgerBackend::new(pool.clone()).await?;
            let policies = SqlitePolicyStore::new(pool.clone()).await?;
            let learning = SqliteLearningStore::new(pool).await?;
            Ok(Stores {
                ledger: Arc::new(LedgerStore::new(Arc::new(ledger))),
                policies: Arc::new(policies),
                learning: Arc::new(learning),
            })
        }
    }
}

impl AppState {
    /// Open storage, check the chain, seed policy and wire the pipeline.
    ///
    /// A broken chain does not stop start-up: the ledger latches halted and
    /// keyed writes fail until the store is repaired.
    pub async fn bootstrap(config: &CovenantConfig) -> ServiceResult<Self> {
        let stores = open_stores(&config.storage).await?;
        let ledger = stores.ledger;

        let verification = ledger.verify().await?;
        if verification.intact {
            info!(
                entries = verification.total_entries,
                backend = ledger.backend_label(),
                "Ledger chain verified"
            );
        } else {
            warn!(
                first_break = ?verification.first_break,
                "Starting with ledger appends halted"
            );
        }

        let resolver = CategoryResolver::new(
            config.categories.exact.clone(),
            config.categories.keywords.clone(),
            config.categories.fallback.clone(),
        );
        let bounds = DriftBounds::new(config.drift_bounds.min, config.drift_bounds.max)?;
        let policies = Arc::new(PolicyRegistry::new(stores.policies, resolver, bounds));
        policies.seed(&config.seed_rules()).await?;

        let detectors = Arc::new(DetectorSet::with_rules(&config.detectors.rules)?);
        let ttl = chrono::Duration::seconds(
            i64::try_from(config.enforcement.confidence_ttl_secs).unwrap_or(i64::MAX / 1000),
        );
        let confidence = Arc::new(ConfidenceRegistry::new(ledger.clone(), ttl));
        let recorder = LearningRecorder::new(stores.learning);

        let gatekeeper = Arc::new(Gatekeeper::new(
            detectors,
            policies.clone(),
            confidence,
            ledger.clone(),
            recorder.clone(),
            GatekeeperConfig {
                persist_clean_decisions: config.enforcement.persist_clean_decisions,
            },
        ));

        let timeout = Duration::from_secs(config.completion.timeout_secs);
        let mut providers = ProviderRegistry::new();
        for provider in &config.completion.providers {
            if provider.api_key.trim().is_empty() {
                warn!(provider = %provider.name, "Completion provider has no api_key");
            }
            providers.register(Arc::new(HttpCompletionProvider::new(
                provider.name.clone(),
                provider.kind,
                provider.endpoint.clone(),
                provider.api_key.clone(),
                timeout,
            )?));
        }
        info!(providers = ?providers.names(), "Completion providers registered");

        Ok(Self::assemble(
            config, ledger, policies, recorder, gatekeeper, providers,
        ))
    }

    /// Wire already-built components into the shared state.
    pub fn assemble(
        config: &CovenantConfig,
        ledger: Arc<LedgerStore>,
        policies: Arc<PolicyRegistry>,
        recorder: LearningRecorder,
        gatekeeper: Arc<Gatekeeper>,
        providers: ProviderRegistry,
    ) -> Self {
        let default_mode = config.enforcement.default_mode;
        let client = Arc::new(GatedClient::new(
            gatekeeper.clone(),
            providers,
            Duration::from_secs(config.completion.timeout_secs),
        ));
        let tuner = AutoTuner::new(
            recorder.clone(),
            policies.clone(),
            ledger.clone(),
            config.tuner.tuner_config(),
            default_mode,
        );

        Self {
            ledger,
            policies,
            recorder,
            gatekeeper,
            client,
            tuner,
            default_mode,
            request_timeout: Duration::from_secs(config.server.request_timeout_secs.max(1)),
            ingest_secret: Arc::from(config.ingest.secret.as_str()),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: chrono::Utc::now(),
        }
    }

    /// Constant-time key check. An unset secret matches nothing.
    pub fn key_matches(&self, presented: Option<&str>) -> bool {
        let Some(presented) = presented else {
            return false;
        };
        if self.ingest_secret.is_empty() {
            return false;
        }
        presented
            .as_bytes()
            .ct_eq(self.ingest_secret.as_bytes())
            .into()
    }

    pub fn uptime(&self) -> String {
        let secs = (chrono::Utc::now() - self.started_at).num_seconds().max(0);
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
