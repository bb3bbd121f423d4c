use std::collections::HashSet;

use chrono::{FixedOffset, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::agent::policy::{
    build_assistant_instructions, build_forced_retry_plan, extract_latest_user_input,
    needs_assistant_profile, needs_current_time, needs_web_research, ForcedRetryParams,
    InstructionParams, Persona,
};
use crate::agent::Agent;
use crate::context::RequestContext;
use crate::providers::{ResponseFunctionCall, ResponseInput, ResponseOptions};

pub const MAX_INPUT_IMAGE_URLS: usize = 4;
pub const WAIT_FALLBACK: &str = "少しお待ちください、確認しています。";
pub const EXHAUSTED_FALLBACK: &str = "調査に時間がかかっています。もう一度試してください。";
const STRICT_RETRY_TEMPERATURE: f32 = 0.1;
const MAX_APPENDED_CITATIONS: usize = 5;

/// Caller-supplied input for one orchestration run: the user text (a
/// single question or a `user:`/`assistant:` transcript) plus any
/// image attachment URLs.
#[derive(Debug, Clone, Default)]
pub struct AgentInput {
    pub text: String,
    pub image_urls: Vec<String>,
}

impl AgentInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            image_urls: Vec::new(),
        }
    }
}

/// Plain text stays plain; attachments become a multimodal content
/// array capped at four images.
pub fn build_initial_response_input(input: &AgentInput) -> ResponseInput {
    let image_urls: Vec<&String> = input
        .image_urls
        .iter()
        .filter(|url| !url.is_empty())
        .take(MAX_INPUT_IMAGE_URLS)
        .collect();
    if image_urls.is_empty() {
        return ResponseInput::Text(input.text.clone());
    }

    let mut content = vec![json!({"type": "input_text", "text": input.text})];
    content.extend(
        image_urls
            .iter()
            .map(|url| json!({"type": "input_image", "image_url": url})),
    );
    ResponseInput::Items(vec![json!({"role": "user", "content": content})])
}

/// Append a source list when the answer cites nothing itself. At most
/// five unique URLs, in discovery order.
pub fn append_citations_if_needed(text: &str, citation_urls: &[String]) -> String {
    static URL_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)https?://\S+").unwrap());
    if citation_urls.is_empty() || URL_PATTERN.is_match(text) {
        return text.to_string();
    }

    let mut seen = HashSet::new();
    let unique: Vec<&String> = citation_urls
        .iter()
        .filter(|url| seen.insert(url.as_str()))
        .take(MAX_APPENDED_CITATIONS)
        .collect();
    if unique.is_empty() {
        return text.to_string();
    }
    let sources: Vec<String> = unique.iter().map(|url| format!("- {url}")).collect();
    format!("{text}\n\n参照元:\n{}", sources.join("\n"))
}

fn today_jst() -> String {
    let jst = FixedOffset::east_opt(9 * 3600).unwrap();
    Utc::now().with_timezone(&jst).format("%Y-%m-%d").to_string()
}

impl Agent {
    /// Drive the model through the bounded tool loop and return the
    /// final answer text.
    ///
    /// Model-endpoint failures propagate to the caller; tool failures
    /// are folded into the conversation as structured results and the
    /// loop keeps going.
    pub async fn run(
        &self,
        input: AgentInput,
        persona: Persona,
        tools: Vec<Value>,
        ctx: &RequestContext,
    ) -> anyhow::Result<String> {
        debug!(
            request_id = %ctx.request_id,
            guild_id = %ctx.guild_id,
            channel_id = %ctx.effective_channel_id,
            thread_id = %ctx.thread_id,
            message_id = %ctx.message_id,
            persona = %ctx.persona,
            enabled_tools = ctx.enabled_tools.len(),
            "request context"
        );
        let latest_user_input = extract_latest_user_input(&input.text);
        let force_web_research = needs_web_research(&latest_user_input);
        let force_current_time = needs_current_time(&latest_user_input);
        let force_assistant_profile = needs_assistant_profile(&latest_user_input);

        let today = today_jst();
        let instructions = build_assistant_instructions(&InstructionParams {
            assistant_name: &self.assistant_name,
            today: &today,
            persona,
            force_web_research,
            force_current_time,
            force_assistant_profile,
        });

        let initial_input = build_initial_response_input(&input);
        let base_opts = ResponseOptions {
            previous_response_id: None,
            temperature: Some(self.temperature),
            instructions: Some(instructions.clone()),
            max_output_tokens: Some(self.max_output_tokens),
            tools: tools.clone(),
            timeout_ms: self.lm_timeout_ms,
        };
        info!(
            request_id = %ctx.request_id,
            stage = "initial",
            force_web_research,
            force_current_time,
            force_assistant_profile,
            tools = tools.len(),
            "starting tool loop"
        );
        let mut response = self
            .provider
            .create_response(initial_input.clone(), &base_opts)
            .await?;

        let plan = build_forced_retry_plan(&ForcedRetryParams {
            base_instructions: &instructions,
            force_web_research,
            force_current_time,
            force_assistant_profile,
            has_web_research_call: response.has_function_call("web_research_digest"),
            has_current_time_call: response.has_function_call("current_time"),
            has_assistant_profile_call: response.has_function_call("assistant_profile"),
        });
        if plan.must_retry {
            info!(
                request_id = %ctx.request_id,
                stage = "forced_retry",
                for_web_research = plan.must_retry_for_web_research,
                for_current_time = plan.must_retry_for_current_time,
                for_assistant_profile = plan.must_retry_for_assistant_profile,
                "forced tool missing, retrying with strict instructions"
            );
            let strict_opts = ResponseOptions {
                temperature: Some(STRICT_RETRY_TEMPERATURE),
                instructions: Some(plan.strict_instructions.clone()),
                ..base_opts.clone()
            };
            response = self
                .provider
                .create_response(initial_input, &strict_opts)
                .await?;
        }

        let mut citation_urls: Vec<String> = Vec::new();
        for step in 0..self.max_loops {
            let calls: Vec<ResponseFunctionCall> =
                response.function_calls().into_iter().cloned().collect();
            debug!(
                request_id = %ctx.request_id,
                step,
                call_count = calls.len(),
                "tool loop step"
            );
            if calls.is_empty() {
                let text = response.output_text().trim().to_string();
                if text.is_empty() {
                    return Ok(WAIT_FALLBACK.to_string());
                }
                return Ok(append_citations_if_needed(&text, &citation_urls));
            }

            let mut outputs: Vec<Value> = Vec::with_capacity(calls.len());
            for call in &calls {
                outputs.push(
                    self.execute_call(call, &latest_user_input, ctx, &mut citation_urls)
                        .await,
                );
            }

            let follow_opts = ResponseOptions {
                previous_response_id: response.id.clone(),
                tools: tools.clone(),
                timeout_ms: self.lm_timeout_ms,
                ..Default::default()
            };
            response = self
                .provider
                .create_response(ResponseInput::Items(outputs), &follow_opts)
                .await?;
        }

        let text = response.output_text().trim().to_string();
        info!(request_id = %ctx.request_id, "tool loop budget exhausted");
        if text.is_empty() {
            return Ok(EXHAUSTED_FALLBACK.to_string());
        }
        Ok(append_citations_if_needed(&text, &citation_urls))
    }
}
