use serde_json::{Map, Value};

use crate::ops::OpsClient;
use crate::tools::{ToolError, ToolName};

fn as_object(input: Option<&str>) -> Map<String, Value> {
    let Some(input) = input else {
        return Map::new();
    };
    match serde_json::from_str::<Value>(input) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn pick_number(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    obj.get(key).and_then(Value::as_f64).map(|n| n.floor() as i64)
}

fn pick_string(obj: &Map<String, Value>, key: &str) -> Option<String> {
    let value = obj.get(key)?.as_str()?.trim();
    if value.is_empty() {
        return None;
    }
    Some(value.to_string())
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

/// Dispatch one ops tool call. Read tools pass straight through; write
/// tools are refused unless the write flag is on. Client failures come
/// back as structured errors carrying the ops error code, never as a
/// panic or a bare string.
pub async fn run_ops_tool(
    tool: ToolName,
    raw_input: Option<&str>,
    write_enabled: bool,
    client: &OpsClient,
) -> Result<Value, ToolError> {
    let input = as_object(raw_input);

    let result = match tool {
        ToolName::OpsGetStatus => client.get_status().await,
        ToolName::OpsGetSummary => client.get_summary(pick_number(&input, "minutes")).await,
        ToolName::OpsGetLogs => client.get_logs(pick_number(&input, "lines")).await,
        ToolName::OpsStart | ToolName::OpsStop | ToolName::OpsRestart | ToolName::OpsExecCommand => {
            if !write_enabled {
                return Err(ToolError::new("write_disabled", "Write tools are disabled."));
            }
            match tool {
                ToolName::OpsStart => client.start().await,
                ToolName::OpsStop => client.stop().await,
                ToolName::OpsRestart => client.restart().await,
                ToolName::OpsExecCommand => {
                    let Some(command) = pick_string(&input, "command") else {
                        return Err(ToolError::new("invalid_params", "command is required."));
                    };
                    client.exec_command(&command).await
                }
                _ => unreachable!(),
            }
        }
        _ => return Err(ToolError::new("unknown_tool", tool.as_str())),
    };

    result.map_err(|e| ToolError::new(&e.code(), &truncate_chars(&e.to_string(), 300)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OpsConfig;

    fn tokenless_client() -> OpsClient {
        OpsClient::new(&OpsConfig {
            base_url: "http://192.0.2.1:9".to_string(),
            token: String::new(),
            timeout_ms: 1000,
            enable_write_tools: false,
            breaker_failure_threshold: 5,
            breaker_open_ms: 60_000,
        })
    }

    #[tokio::test]
    async fn write_tools_are_gated_before_any_client_work() {
        let client = tokenless_client();
        for tool in [
            ToolName::OpsStart,
            ToolName::OpsStop,
            ToolName::OpsRestart,
            ToolName::OpsExecCommand,
        ] {
            let err = run_ops_tool(tool, None, false, &client).await.unwrap_err();
            assert_eq!(err.code, "write_disabled");
        }
    }

    #[tokio::test]
    async fn exec_requires_a_command() {
        let client = tokenless_client();
        let err = run_ops_tool(ToolName::OpsExecCommand, Some("{}"), true, &client)
            .await
            .unwrap_err();
        assert_eq!(err.code, "invalid_params");
        let err = run_ops_tool(ToolName::OpsExecCommand, Some(r#"{"command":"   "}"#), true, &client)
            .await
            .unwrap_err();
        assert_eq!(err.code, "invalid_params");
    }

    #[tokio::test]
    async fn client_errors_surface_their_code() {
        let client = tokenless_client();
        let err = run_ops_tool(ToolName::OpsGetStatus, None, false, &client)
            .await
            .unwrap_err();
        assert_eq!(err.code, "missing_token");
    }

    #[tokio::test]
    async fn non_ops_tools_are_rejected() {
        let client = tokenless_client();
        let err = run_ops_tool(ToolName::CurrentTime, None, true, &client)
            .await
            .unwrap_err();
        assert_eq!(err.code, "unknown_tool");
    }

    #[test]
    fn malformed_input_degrades_to_empty_object() {
        assert!(as_object(Some("[1,2]")).is_empty());
        assert!(as_object(Some("nope")).is_empty());
        assert!(as_object(None).is_empty());
        let obj = as_object(Some(r#"{"minutes": 90.9}"#));
        assert_eq!(pick_number(&obj, "minutes"), Some(90));
    }
}
