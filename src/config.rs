use std::path::Path;

use serde::Deserialize;

/// Process-wide configuration, loaded once from `config.toml` and
/// passed into each component constructor. Components never read the
/// environment themselves.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub ops: OpsConfig,
    #[serde(default)]
    pub agent: AgentLoopConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AssistantConfig {
    #[serde(default = "default_assistant_name")]
    pub name: String,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: default_assistant_name(),
        }
    }
}

fn default_assistant_name() -> String {
    "Assistant".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key: String::new(),
            model: default_model(),
        }
    }
}

fn default_provider_base_url() -> String {
    "http://127.0.0.1:1234/v1".to_string()
}

fn default_model() -> String {
    "qwen/qwen3-vl-4b-instruct".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebConfig {
    #[serde(default)]
    pub brave_api_key: String,
    #[serde(default = "default_brave_base_url")]
    pub brave_base_url: String,
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
    #[serde(default = "default_fetch_max_bytes")]
    pub fetch_max_bytes: usize,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    #[serde(default = "default_web_ttl_seconds")]
    pub search_ttl_seconds: u64,
    #[serde(default = "default_web_ttl_seconds")]
    pub page_ttl_seconds: u64,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            brave_api_key: String::new(),
            brave_base_url: default_brave_base_url(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            fetch_max_bytes: default_fetch_max_bytes(),
            max_redirects: default_max_redirects(),
            search_ttl_seconds: default_web_ttl_seconds(),
            page_ttl_seconds: default_web_ttl_seconds(),
            cache_dir: default_cache_dir(),
        }
    }
}

fn default_brave_base_url() -> String {
    "https://api.search.brave.com".to_string()
}
fn default_fetch_timeout_ms() -> u64 {
    10_000
}
fn default_fetch_max_bytes() -> usize {
    1_000_000
}
fn default_max_redirects() -> usize {
    5
}
fn default_web_ttl_seconds() -> u64 {
    900
}
fn default_cache_dir() -> String {
    ".cache/web-research".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpsConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_ops_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub enable_write_tools: bool,
    #[serde(default = "default_breaker_failure_threshold")]
    pub breaker_failure_threshold: u32,
    #[serde(default = "default_breaker_open_ms")]
    pub breaker_open_ms: i64,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            token: String::new(),
            timeout_ms: default_ops_timeout_ms(),
            enable_write_tools: false,
            breaker_failure_threshold: default_breaker_failure_threshold(),
            breaker_open_ms: default_breaker_open_ms(),
        }
    }
}

fn default_ops_timeout_ms() -> u64 {
    10_000
}
fn default_breaker_failure_threshold() -> u32 {
    5
}
fn default_breaker_open_ms() -> i64 {
    60_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentLoopConfig {
    #[serde(default = "default_max_loops")]
    pub max_loops: usize,
    #[serde(default = "default_lm_timeout_ms")]
    pub lm_timeout_ms: u64,
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            max_loops: default_max_loops(),
            lm_timeout_ms: default_lm_timeout_ms(),
            max_output_tokens: default_max_output_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_max_loops() -> usize {
    4
}
fn default_lm_timeout_ms() -> u64 {
    90_000
}
fn default_max_output_tokens() -> u32 {
    700
}
fn default_temperature() -> f32 {
    0.2
}

impl AppConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = toml::from_str(&content)?;
        config.clamp_ranges();
        Ok(config)
    }

    /// Missing file means defaults; a present-but-broken file is an
    /// error the operator should see.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let mut config = AppConfig::default();
            config.clamp_ranges();
            return Ok(config);
        }
        Self::load(path)
    }

    /// Every numeric knob has a documented range; out-of-range values
    /// are clamped rather than rejected.
    fn clamp_ranges(&mut self) {
        self.provider.base_url = self.provider.base_url.trim_end_matches('/').to_string();
        self.web.fetch_timeout_ms = self.web.fetch_timeout_ms.clamp(1_000, 120_000);
        self.web.fetch_max_bytes = self.web.fetch_max_bytes.clamp(1_024, 20_000_000);
        self.web.max_redirects = self.web.max_redirects.min(10);
        self.web.search_ttl_seconds = self.web.search_ttl_seconds.clamp(1, 86_400);
        self.web.page_ttl_seconds = self.web.page_ttl_seconds.clamp(1, 86_400);
        self.ops.base_url = self.ops.base_url.trim_end_matches('/').to_string();
        self.ops.timeout_ms = self.ops.timeout_ms.clamp(1_000, 60_000);
        self.ops.breaker_failure_threshold = self.ops.breaker_failure_threshold.clamp(1, 20);
        self.ops.breaker_open_ms = self.ops.breaker_open_ms.clamp(1_000, 600_000);
        self.agent.max_loops = self.agent.max_loops.clamp(1, 8);
        self.agent.lm_timeout_ms = self.agent.lm_timeout_ms.max(1_000);
        self.agent.temperature = self.agent.temperature.clamp(0.0, 2.0);
    }

    pub fn ops_enabled(&self) -> bool {
        !self.ops.base_url.is_empty()
    }
}
