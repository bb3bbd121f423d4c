use std::time::Instant;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::agent::Agent;
use crate::context::RequestContext;
use crate::providers::ResponseFunctionCall;
use crate::tools::assistant_profile::build_assistant_profile;
use crate::tools::current_time::{format_current_time, parse_current_time_params};
use crate::tools::ops_tools::run_ops_tool;
use crate::tools::output::{tool_error_json, tool_success_json};
use crate::tools::web_research::{parse_web_research_params, WebResearchDigestParams};
use crate::tools::{ToolError, ToolName};

/// Which field carried the payload for a function call. Resolved once
/// at the boundary; nothing downstream branches on the raw fields
/// again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputSource {
    Input,
    Arguments,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedInput {
    pub payload: Option<String>,
    pub source: InputSource,
}

fn has_non_blank(value: Option<&String>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// `input` is authoritative; `arguments` is only consulted when
/// `input` is blank after trimming.
pub fn resolve_function_call_input(call: &ResponseFunctionCall) -> ResolvedInput {
    if has_non_blank(call.input.as_ref()) {
        return ResolvedInput {
            payload: call.input.clone(),
            source: InputSource::Input,
        };
    }
    if has_non_blank(call.arguments.as_ref()) {
        return ResolvedInput {
            payload: call.arguments.clone(),
            source: InputSource::Arguments,
        };
    }
    ResolvedInput {
        payload: None,
        source: InputSource::None,
    }
}

#[derive(Debug, Clone)]
pub struct NormalizedWebResearchCall {
    pub params: WebResearchDigestParams,
    pub used_fallback_query: bool,
}

/// Parse a web-research call, substituting the latest user utterance
/// (cut to 300 chars) when the model sent an empty query.
pub fn normalize_web_research_call(
    raw_input: Option<&str>,
    fallback_query: &str,
) -> NormalizedWebResearchCall {
    let parsed = parse_web_research_params(raw_input);
    if !parsed.query.is_empty() {
        return NormalizedWebResearchCall {
            params: parsed,
            used_fallback_query: false,
        };
    }
    let query: String = fallback_query.trim().chars().take(300).collect();
    NormalizedWebResearchCall {
        params: WebResearchDigestParams { query, ..parsed },
        used_fallback_query: true,
    }
}

impl Agent {
    /// Execute one function call and wrap its outcome as a
    /// `function_call_output` item. Tool failures never escape as
    /// errors; they become structured failure envelopes so the loop
    /// can continue.
    pub(super) async fn execute_call(
        &self,
        call: &ResponseFunctionCall,
        fallback_query: &str,
        ctx: &RequestContext,
        citation_urls: &mut Vec<String>,
    ) -> Value {
        let started = Instant::now();
        let resolved = resolve_function_call_input(call);
        let tool = ToolName::parse(&call.name);
        debug!(
            tool = %call.name,
            call_id = call.call_id.as_deref().unwrap_or(""),
            source = ?resolved.source,
            "executing function call"
        );

        let result = self
            .dispatch(tool, &call.name, resolved.payload.as_deref(), fallback_query, citation_urls)
            .await;

        let duration_ms = started.elapsed().as_millis() as u64;
        let output = match result {
            Ok(data) => tool_success_json(data, ctx, duration_ms),
            Err(err) => {
                warn!(tool = %call.name, code = %err.code, "tool call failed");
                tool_error_json(&err.code, &err.message, err.details, ctx, duration_ms)
            }
        };

        json!({
            "type": "function_call_output",
            "call_id": call.call_id.clone().unwrap_or_else(|| call.name.clone()),
            "output": output,
        })
    }

    async fn dispatch(
        &self,
        tool: ToolName,
        raw_name: &str,
        payload: Option<&str>,
        fallback_query: &str,
        citation_urls: &mut Vec<String>,
    ) -> Result<Value, ToolError> {
        match tool {
            ToolName::CurrentTime => {
                let params = parse_current_time_params(payload);
                Ok(Value::String(format_current_time(&params, Utc::now())))
            }
            ToolName::AssistantProfile => {
                let profile = build_assistant_profile(
                    &self.assistant_name,
                    &self.model_name,
                    self.started_at,
                    Utc::now(),
                );
                serde_json::to_value(profile)
                    .map_err(|e| ToolError::new("api_error", &e.to_string()))
            }
            ToolName::WebResearchDigest => {
                let normalized = normalize_web_research_call(payload, fallback_query);
                debug!(
                    used_fallback_query = normalized.used_fallback_query,
                    query = %normalized.params.query,
                    max_results = normalized.params.max_results,
                    max_pages = normalized.params.max_pages,
                    "normalized web_research_digest params"
                );
                let digest = self.web_research.digest(&normalized.params).await;
                citation_urls.extend(digest.citation_urls());
                serde_json::to_value(digest)
                    .map_err(|e| ToolError::new("api_error", &e.to_string()))
            }
            _ if tool.is_ops() => {
                let Some(ops) = &self.ops else {
                    return Err(ToolError::new("api_error", "ops client is not configured"));
                };
                run_ops_tool(tool, payload, self.ops_write_enabled, ops).await
            }
            _ => Err(ToolError::new("unknown_tool", raw_name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(input: Option<&str>, arguments: Option<&str>) -> ResponseFunctionCall {
        ResponseFunctionCall {
            name: "web_research_digest".to_string(),
            call_id: Some("c1".to_string()),
            input: input.map(str::to_string),
            arguments: arguments.map(str::to_string),
        }
    }

    #[test]
    fn input_field_wins_when_present() {
        let resolved = resolve_function_call_input(&call(Some(r#"{"query":"a"}"#), Some(r#"{"query":"b"}"#)));
        assert_eq!(resolved.source, InputSource::Input);
        assert_eq!(resolved.payload.as_deref(), Some(r#"{"query":"a"}"#));
    }

    #[test]
    fn arguments_used_only_when_input_is_blank() {
        let resolved = resolve_function_call_input(&call(Some("   "), Some(r#"{"query":"tokyo weather"}"#)));
        assert_eq!(resolved.source, InputSource::Arguments);
        assert_eq!(resolved.payload.as_deref(), Some(r#"{"query":"tokyo weather"}"#));
    }

    #[test]
    fn both_blank_resolves_to_none() {
        let resolved = resolve_function_call_input(&call(None, Some("  ")));
        assert_eq!(resolved.source, InputSource::None);
        assert_eq!(resolved.payload, None);
    }

    #[test]
    fn empty_query_uses_fallback_and_reports_it() {
        let normalized = normalize_web_research_call(Some("{}"), "  明日の東京の天気は？ ");
        assert!(normalized.used_fallback_query);
        assert_eq!(normalized.params.query, "明日の東京の天気は？");
    }

    #[test]
    fn fallback_is_cut_to_300_chars() {
        let long = "あ".repeat(400);
        let normalized = normalize_web_research_call(None, &long);
        assert!(normalized.used_fallback_query);
        assert_eq!(normalized.params.query.chars().count(), 300);
    }

    #[test]
    fn non_empty_query_never_falls_back() {
        let normalized =
            normalize_web_research_call(Some(r#"{"query":"rust 1.80 release"}"#), "ignored");
        assert!(!normalized.used_fallback_query);
        assert_eq!(normalized.params.query, "rust 1.80 release");
    }
}
