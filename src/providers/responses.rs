use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error, info};
use zeroize::Zeroize;

use crate::providers::ProviderError;

/// A tool-call item emitted by the model. The input payload can arrive
/// in either `input` or `arguments` depending on the backend; the
/// orchestrator resolves which one is authoritative exactly once.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ResponseFunctionCall {
    pub name: String,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MessageContentPart {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ResponseOutputItem {
    #[serde(rename = "message")]
    Message {
        #[serde(default)]
        content: Vec<MessageContentPart>,
    },
    #[serde(rename = "function_call")]
    FunctionCall(ResponseFunctionCall),
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ResponsesResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub output: Vec<ResponseOutputItem>,
}

impl ResponsesResponse {
    /// Ordered text of all message items, concatenated losslessly.
    pub fn output_text(&self) -> String {
        let mut chunks = String::new();
        for item in &self.output {
            if let ResponseOutputItem::Message { content } = item {
                for part in content {
                    if part.kind == "output_text" {
                        chunks.push_str(&part.text);
                    }
                }
            }
        }
        chunks
    }

    pub fn function_calls(&self) -> Vec<&ResponseFunctionCall> {
        self.output
            .iter()
            .filter_map(|item| match item {
                ResponseOutputItem::FunctionCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    pub fn has_function_call(&self, tool_name: &str) -> bool {
        self.function_calls().iter().any(|call| call.name == tool_name)
    }
}

/// Request payload for one orchestration step. `input` is either plain
/// text, a multimodal content array, or the previous step's tool
/// outputs.
#[derive(Debug, Clone)]
pub enum ResponseInput {
    Text(String),
    Items(Vec<Value>),
}

impl ResponseInput {
    fn to_value(&self) -> Value {
        match self {
            ResponseInput::Text(text) => Value::String(text.clone()),
            ResponseInput::Items(items) => Value::Array(items.clone()),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResponseOptions {
    pub previous_response_id: Option<String>,
    pub temperature: Option<f32>,
    pub instructions: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub tools: Vec<Value>,
    pub timeout_ms: u64,
}

/// Seam for the model "create a response" endpoint; the orchestrator
/// only sees this trait so tests can script responses.
#[async_trait]
pub trait ResponsesApi: Send + Sync {
    async fn create_response(
        &self,
        input: ResponseInput,
        opts: &ResponseOptions,
    ) -> Result<ResponsesResponse, ProviderError>;
}

pub struct ResponsesClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl Drop for ResponsesClient {
    fn drop(&mut self) {
        self.api_key.zeroize();
    }
}

impl ResponsesClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

}

#[async_trait]
impl ResponsesApi for ResponsesClient {
    async fn create_response(
        &self,
        input: ResponseInput,
        opts: &ResponseOptions,
    ) -> Result<ResponsesResponse, ProviderError> {
        let mut body = json!({
            "model": self.model,
            "input": input.to_value(),
            "max_output_tokens": opts.max_output_tokens.unwrap_or(1024),
        });
        if let Some(id) = &opts.previous_response_id {
            body["previous_response_id"] = json!(id);
        }
        if let Some(temperature) = opts.temperature {
            body["temperature"] = json!(temperature);
        }
        if let Some(instructions) = &opts.instructions {
            body["instructions"] = json!(instructions);
        }
        if !opts.tools.is_empty() {
            body["tools"] = json!(opts.tools);
        }

        let url = format!("{}/responses", self.base_url);
        info!(model = %self.model, url = %url, tools = opts.tools.len(), "calling model endpoint");

        let mut builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        let timeout = Duration::from_millis(opts.timeout_ms.max(1));
        let response = match tokio::time::timeout(timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(error = %e, "model request failed");
                return Err(ProviderError::network(&e));
            }
            Err(_) => return Err(ProviderError::timeout(opts.timeout_ms)),
        };

        let status = response.status();
        let text = match tokio::time::timeout(timeout, response.text()).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => return Err(ProviderError::network(&e)),
            Err(_) => return Err(ProviderError::timeout(opts.timeout_ms)),
        };

        if !status.is_success() {
            error!(status = %status, "model endpoint returned an error");
            return Err(ProviderError::from_status(status.as_u16(), &text));
        }

        // UTF-8-safe preview for debugging, never the full body.
        let preview: String = text.chars().take(500).collect();
        debug!(preview = %preview, "model response body");

        serde_json::from_str(&text).map_err(|e| ProviderError::invalid_body(&e.to_string()))
    }
}
