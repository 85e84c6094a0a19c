//! Configuration for covenantd

use std::collections::HashMap;
use std::net::SocketAddr;

use covenant_detectors::RuleSpec;
use covenant_gate::ProviderKind;
use covenant_learning::TunerConfig;
use covenant_policy::{KeywordRule, PolicyRule, DEFAULT_FALLBACK, WILDCARD};
use covenant_types::{ConfidenceLevel, EnforcementMode};
use serde::{Deserialize, Serialize};

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CovenantConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub enforcement: EnforcementConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub tuner: TunerSection,

    #[serde(default)]
    pub drift_bounds: DriftBoundsConfig,

    #[serde(default)]
    pub categories: CategoriesConfig,

    /// Seed rows. Empty means the compiled-in seeds.
    #[serde(default)]
    pub policies: Vec<PolicySeed>,

    #[serde(default)]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub detectors: DetectorsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (for development/testing)
    #[default]
    Memory,

    Sqlite {
        url: String,

        #[serde(default = "default_pool_size")]
        max_connections: u32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnforcementConfig {
    /// Mode for event types with no configured policy.
    #[serde(default)]
    pub default_mode: EnforcementMode,

    #[serde(default = "default_confidence_ttl")]
    pub confidence_ttl_secs: u64,

    #[serde(default)]
    pub persist_clean_decisions: bool,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            default_mode: EnforcementMode::default(),
            confidence_ttl_secs: default_confidence_ttl(),
            persist_clean_decisions: false,
        }
    }
}

/// Keyed writes require `x-ingest-key` to equal `secret`. An empty secret
/// rejects every keyed write.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default)]
    pub secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_tuner_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_noise_threshold")]
    pub noise_threshold: f64,
    #[serde(default = "default_signal_threshold")]
    pub signal_threshold: f64,
    #[serde(default = "default_block_ratio")]
    pub block_ratio_threshold: f64,
    #[serde(default = "default_loosen_step")]
    pub loosen_step: u32,
    #[serde(default = "default_tighten_step")]
    pub tighten_step: u32,
    #[serde(default = "default_pattern_min_fires")]
    pub pattern_min_fires: usize,
    #[serde(default = "default_pattern_threshold")]
    pub pattern_noise_threshold: f64,
    #[serde(default = "default_pattern_threshold")]
    pub pattern_signal_threshold: f64,
    #[serde(default = "default_max_pattern_weight")]
    pub max_pattern_weight: f64,
    #[serde(default = "default_lock_wait")]
    pub lock_wait_ms: u64,
}

impl Default for TunerSection {
    fn default() -> Self {
        let t = TunerConfig::default();
        Self {
            enabled: true,
            interval_secs: default_tuner_interval(),
            min_samples: t.min_samples,
            noise_threshold: t.noise_threshold,
            signal_threshold: t.signal_threshold,
            block_ratio_threshold: t.block_ratio_threshold,
            loosen_step: t.loosen_step,
            tighten_step: t.tighten_step,
            pattern_min_fires: t.pattern_min_fires,
            pattern_noise_threshold: t.pattern_noise_threshold,
            pattern_signal_threshold: t.pattern_signal_threshold,
            max_pattern_weight: t.max_pattern_weight,
            lock_wait_ms: t.lock_wait_ms,
        }
    }
}

impl TunerSection {
    pub fn tuner_config(&self) -> TunerConfig {
        TunerConfig {
            min_samples: self.min_samples,
            noise_threshold: self.noise_threshold,
            signal_threshold: self.signal_threshold,
            block_ratio_threshold: self.block_ratio_threshold,
            loosen_step: self.loosen_step,
            tighten_step: self.tighten_step,
            pattern_min_fires: self.pattern_min_fires,
            pattern_noise_threshold: self.pattern_noise_threshold,
            pattern_signal_threshold: self.pattern_signal_threshold,
            max_pattern_weight: self.max_pattern_weight,
            lock_wait_ms: self.lock_wait_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DriftBoundsConfig {
    #[serde(default = "default_drift_min")]
    pub min: u32,
    #[serde(default = "default_drift_max")]
    pub max: u32,
}

impl Default for DriftBoundsConfig {
    fn default() -> Self {
        Self {
            min: default_drift_min(),
            max: default_drift_max(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoriesConfig {
    /// Event type to category, checked before keywords.
    #[serde(default)]
    pub exact: HashMap<String, String>,

    #[serde(default = "default_keywords")]
    pub keywords: Vec<KeywordRule>,

    #[serde(default = "default_fallback")]
    pub fallback: String,
}

impl Default for CategoriesConfig {
    fn default() -> Self {
        Self {
            exact: HashMap::new(),
            keywords: default_keywords(),
            fallback: default_fallback(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySeed {
    pub category: String,
    #[serde(default = "default_wildcard")]
    pub event_type: String,
    pub mode: EnforcementMode,
    pub max_drift_score: u32,
    #[serde(default)]
    pub required_confidence: Option<ConfidenceLevel>,
}

impl PolicySeed {
    pub fn to_rule(&self) -> PolicyRule {
        let rule = PolicyRule::new(
            &self.category,
            &self.event_type,
            self.mode,
            self.max_drift_score,
        );
        match self.required_confidence {
            Some(level) => rule.with_required_confidence(level),
            None => rule,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_completion_timeout")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_completion_timeout(),
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectorsConfig {
    /// Extra pattern rules appended to the compiled-in set.
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8088))
}

fn default_request_timeout() -> u64 {
    60
}

fn default_pool_size() -> u32 {
    5
}

fn default_confidence_ttl() -> u64 {
    900
}

fn default_tuner_interval() -> u64 {
    86_400
}

fn default_min_samples() -> usize {
    TunerConfig::default().min_samples
}

fn default_noise_threshold() -> f64 {
    TunerConfig::default().noise_threshold
}

fn default_signal_threshold() -> f64 {
    TunerConfig::default().signal_threshold
}

fn default_block_ratio() -> f64 {
    TunerConfig::default().block_ratio_threshold
}

fn default_loosen_step() -> u32 {
    TunerConfig::default().loosen_step
}

fn default_tighten_step() -> u32 {
    TunerConfig::default().tighten_step
}

fn default_pattern_min_fires() -> usize {
    TunerConfig::default().pattern_min_fires
}

fn default_pattern_threshold() -> f64 {
    TunerConfig::default().pattern_noise_threshold
}

fn default_max_pattern_weight() -> f64 {
    TunerConfig::default().max_pattern_weight
}

fn default_lock_wait() -> u64 {
    TunerConfig::default().lock_wait_ms
}

fn default_drift_min() -> u32 {
    1
}

fn default_drift_max() -> u32 {
    20
}

fn default_keywords() -> Vec<KeywordRule> {
    ["TAX", "CREDIT", "AUDIT"]
        .into_iter()
        .map(|k| KeywordRule::new(k, k))
        .collect()
}

fn default_fallback() -> String {
    DEFAULT_FALLBACK.to_string()
}

fn default_wildcard() -> String {
    WILDCARD.to_string()
}

fn default_completion_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CovenantConfig {
    /// Compiled defaults, then the optional file, then `COVENANT__*`
    /// environment variables (`COVENANT__INGEST__SECRET`, ...).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&CovenantConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("COVENANT")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    pub fn seed_rules(&self) -> Vec<PolicyRule> {
        if self.policies.is_empty() {
            covenant_policy::default_seeds()
        } else {
            self.policies.iter().map(PolicySeed::to_rule).collect()
        }
    }
}
