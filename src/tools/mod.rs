pub mod assistant_profile;
pub mod current_time;
pub mod ops_tools;
pub mod output;
pub mod web_research;

use serde_json::{json, Value};

/// Closed set of tool names the orchestrator can dispatch. Anything
/// the model invents maps to `Unknown` and produces a structured error
/// instead of breaking the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolName {
    CurrentTime,
    WebResearchDigest,
    AssistantProfile,
    OpsGetStatus,
    OpsGetSummary,
    OpsGetLogs,
    OpsStart,
    OpsStop,
    OpsRestart,
    OpsExecCommand,
    Unknown,
}

impl ToolName {
    pub fn parse(name: &str) -> ToolName {
        match name {
            "current_time" => ToolName::CurrentTime,
            "web_research_digest" => ToolName::WebResearchDigest,
            "assistant_profile" => ToolName::AssistantProfile,
            "ops_get_status" => ToolName::OpsGetStatus,
            "ops_get_summary" => ToolName::OpsGetSummary,
            "ops_get_logs" => ToolName::OpsGetLogs,
            "ops_start" => ToolName::OpsStart,
            "ops_stop" => ToolName::OpsStop,
            "ops_restart" => ToolName::OpsRestart,
            "ops_exec_command" => ToolName::OpsExecCommand,
            _ => ToolName::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::CurrentTime => "current_time",
            ToolName::WebResearchDigest => "web_research_digest",
            ToolName::AssistantProfile => "assistant_profile",
            ToolName::OpsGetStatus => "ops_get_status",
            ToolName::OpsGetSummary => "ops_get_summary",
            ToolName::OpsGetLogs => "ops_get_logs",
            ToolName::OpsStart => "ops_start",
            ToolName::OpsStop => "ops_stop",
            ToolName::OpsRestart => "ops_restart",
            ToolName::OpsExecCommand => "ops_exec_command",
            ToolName::Unknown => "unknown",
        }
    }

    pub fn is_ops(&self) -> bool {
        matches!(
            self,
            ToolName::OpsGetStatus
                | ToolName::OpsGetSummary
                | ToolName::OpsGetLogs
                | ToolName::OpsStart
                | ToolName::OpsStop
                | ToolName::OpsRestart
                | ToolName::OpsExecCommand
        )
    }
}

/// Structured tool failure, rendered into the error envelope by the
/// dispatcher.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
}

impl ToolError {
    pub fn new(code: &str, message: &str) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            details: None,
        }
    }
}

pub fn current_time_tool() -> Value {
    json!({
        "type": "function",
        "name": "current_time",
        "description": "Returns the current time for the specified timezone. If missing or invalid, defaults to Asia/Tokyo (Japan time).",
        "parameters": {
            "type": "object",
            "properties": {
                "timezone": {
                    "type": "string",
                    "description": "IANA timezone name (for example: Asia/Tokyo)."
                }
            },
            "required": [],
            "additionalProperties": false
        }
    })
}

pub fn web_research_digest_tool() -> Value {
    json!({
        "type": "function",
        "name": "web_research_digest",
        "description": "Uses web search and page extraction to return research highlights (bullets) and citations in JSON.",
        "parameters": {
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query to investigate (1-300 characters)."
                },
                "max_results": {
                    "type": "number",
                    "description": "Number of search results to fetch (1-8)."
                },
                "max_pages": {
                    "type": "number",
                    "description": "Number of pages to fetch and extract content from (1-5)."
                },
                "focus": {
                    "type": "string",
                    "description": "Optional focus or angle for summarization (0-200 characters)."
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }
    })
}

pub fn assistant_profile_tool() -> Value {
    json!({
        "type": "function",
        "name": "assistant_profile",
        "description": "Returns public assistant profile fields: assistant_name, model, version, started_at, uptime_day.",
        "parameters": {
            "type": "object",
            "properties": {},
            "required": [],
            "additionalProperties": false
        }
    })
}

fn ops_tool(name: &str, description: &str, properties: Value, required: Value) -> Value {
    json!({
        "type": "function",
        "name": name,
        "description": description,
        "parameters": {
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        }
    })
}

pub fn ops_read_tools() -> Vec<Value> {
    vec![
        ops_tool(
            "ops_get_status",
            "Get current game server status.",
            json!({}),
            json!([]),
        ),
        ops_tool(
            "ops_get_summary",
            "Get aggregated game server summary for a time window.",
            json!({
                "minutes": {
                    "type": "number",
                    "description": "Summary window in minutes (1-1440)."
                }
            }),
            json!([]),
        ),
        ops_tool(
            "ops_get_logs",
            "Get latest game server logs.",
            json!({
                "lines": {
                    "type": "number",
                    "description": "Number of log lines to fetch (1-200)."
                }
            }),
            json!([]),
        ),
    ]
}

pub fn ops_write_tools() -> Vec<Value> {
    vec![
        ops_tool("ops_start", "Start the game server.", json!({}), json!([])),
        ops_tool("ops_stop", "Stop the game server.", json!({}), json!([])),
        ops_tool("ops_restart", "Restart the game server.", json!({}), json!([])),
        ops_tool(
            "ops_exec_command",
            "Execute a console command on the game server.",
            json!({
                "command": {
                    "type": "string",
                    "description": "Server console command string."
                }
            }),
            json!(["command"]),
        ),
    ]
}

pub fn base_tools() -> Vec<Value> {
    vec![
        current_time_tool(),
        web_research_digest_tool(),
        assistant_profile_tool(),
    ]
}

/// Assemble the tool set for a request: base tools always, ops read
/// tools for ops-enabled contexts, write tools only when the feature
/// flag allows them.
pub fn tools_for_context(allow_ops: bool, enable_write_tools: bool) -> Vec<Value> {
    let mut tools = base_tools();
    if !allow_ops {
        return tools;
    }
    tools.extend(ops_read_tools());
    if enable_write_tools {
        tools.extend(ops_write_tools());
    }
    tools
}

pub fn extract_enabled_tool_names(tools: &[Value]) -> Vec<String> {
    tools
        .iter()
        .filter_map(|tool| tool.get("name").and_then(Value::as_str))
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
