pub mod exec;
pub mod policy;
pub mod tool_loop;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ops::OpsClient;
use crate::providers::ResponsesApi;
use crate::tools::web_research::WebResearch;

pub use tool_loop::AgentInput;

/// Knobs for one agent instance; everything comes from `AppConfig` at
/// construction time.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub assistant_name: String,
    pub model_name: String,
    pub started_at: DateTime<Utc>,
    pub max_loops: usize,
    pub lm_timeout_ms: u64,
    pub max_output_tokens: u32,
    pub temperature: f32,
    pub ops_write_enabled: bool,
}

/// The tool-loop orchestrator. Owns the model-endpoint seam, the
/// web-research pipeline, and (optionally) the ops client; everything
/// else about a request arrives through `run`.
pub struct Agent {
    pub(crate) provider: Arc<dyn ResponsesApi>,
    pub(crate) web_research: WebResearch,
    pub(crate) ops: Option<Arc<OpsClient>>,
    pub(crate) assistant_name: String,
    pub(crate) model_name: String,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) max_loops: usize,
    pub(crate) lm_timeout_ms: u64,
    pub(crate) max_output_tokens: u32,
    pub(crate) temperature: f32,
    pub(crate) ops_write_enabled: bool,
}

impl Agent {
    pub fn new(
        provider: Arc<dyn ResponsesApi>,
        web_research: WebResearch,
        ops: Option<Arc<OpsClient>>,
        settings: AgentSettings,
    ) -> Self {
        Self {
            provider,
            web_research,
            ops,
            assistant_name: settings.assistant_name,
            model_name: settings.model_name,
            started_at: settings.started_at,
            max_loops: settings.max_loops,
            lm_timeout_ms: settings.lm_timeout_ms,
            max_output_tokens: settings.max_output_tokens,
            temperature: settings.temperature,
            ops_write_enabled: settings.ops_write_enabled,
        }
    }
}
