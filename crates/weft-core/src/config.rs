use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: u32 = 1;
pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 256 * 1024;
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000;
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Top-level config (weft.toml + WEFT_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeftConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub summary: SummaryConfig,
    #[serde(default)]
    pub processor: ProcessorConfig,
    #[serde(default)]
    pub proposals: ProposalsConfig,
}

impl Default for WeftConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            store: StoreConfig::default(),
            llm: LlmConfig {
                base_url: default_llm_base_url(),
                api_key: None,
                model: default_model(),
                context_window: default_context_window(),
                reserved_for_response: default_reserved_for_response(),
            },
            analyzer: AnalyzerConfig::default(),
            summary: SummaryConfig::default(),
            processor: ProcessorConfig::default(),
            proposals: ProposalsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_root")]
    pub root: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_store_root(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_context_window")]
    pub context_window: usize,
    #[serde(default = "default_reserved_for_response")]
    pub reserved_for_response: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    #[serde(default = "default_max_keyword_len")]
    pub max_keyword_len: usize,
    #[serde(default = "default_max_subject_members")]
    pub max_subject_members: usize,
    #[serde(default = "default_keyword_cache_ttl_ms")]
    pub keyword_cache_ttl_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_keyword_len: default_max_keyword_len(),
            max_subject_members: default_max_subject_members(),
            keyword_cache_ttl_ms: default_keyword_cache_ttl_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    #[serde(default = "default_verbatim_tail_turns")]
    pub verbatim_tail_turns: usize,
    #[serde(default = "default_significance_threshold")]
    pub significance_threshold: f64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            verbatim_tail_turns: default_verbatim_tail_turns(),
            significance_threshold: default_significance_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default = "default_llm_retry_max")]
    pub llm_retry_max: u32,
    #[serde(default = "default_llm_retry_backoff_ms")]
    pub llm_retry_backoff_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            llm_retry_max: default_llm_retry_max(),
            llm_retry_backoff_ms: default_llm_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalsConfig {
    #[serde(default = "default_proposal_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
    #[serde(default = "default_proposal_top_k")]
    pub top_k: usize,
    #[serde(default = "default_proposal_min_score")]
    pub min_score: f64,
}

impl Default for ProposalsConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: default_proposal_cache_ttl_ms(),
            top_k: default_proposal_top_k(),
            min_score: default_proposal_min_score(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_store_root() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.weft/store", home)
}
fn default_llm_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "local-model".to_string()
}
fn default_context_window() -> usize {
    32_000
}
fn default_reserved_for_response() -> usize {
    2_000
}
fn default_max_keyword_len() -> usize {
    50
}
fn default_max_subject_members() -> usize {
    12
}
fn default_keyword_cache_ttl_ms() -> u64 {
    5_000
}
fn default_verbatim_tail_turns() -> usize {
    6
}
fn default_significance_threshold() -> f64 {
    0.8
}
fn default_llm_retry_max() -> u32 {
    2
}
fn default_llm_retry_backoff_ms() -> u64 {
    200
}
fn default_proposal_cache_ttl_ms() -> u64 {
    30_000
}
fn default_proposal_top_k() -> usize {
    5
}
fn default_proposal_min_score() -> f64 {
    0.2
}

impl WeftConfig {
    /// Load config from a TOML file with WEFT_* env var overrides.
    ///
    /// Checks in order: explicit path argument, `WEFT_CONFIG` env var,
    /// then `~/.weft/weft.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .or_else(|| std::env::var("WEFT_CONFIG").ok())
            .unwrap_or_else(default_config_path);

        let config: WeftConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("WEFT_").split("_"))
            .extract()
            .map_err(|e| crate::error::WeftError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.weft/weft.toml", home)
}
