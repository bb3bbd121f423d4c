use serde_json::{json, Value};

use crate::context::RequestContext;

/// Result envelope surfaced back to the model for every tool call:
/// `{ok:true, data, meta}` or `{ok:false, error:{code,message,details?}, meta}`.
/// `meta.requestId` echoes the caller-supplied request id.

pub fn tool_success_json(data: Value, ctx: &RequestContext, duration_ms: u64) -> String {
    json!({
        "ok": true,
        "data": data,
        "meta": {
            "requestId": ctx.request_id,
            "durationMs": duration_ms,
        },
    })
    .to_string()
}

pub fn tool_error_json(
    code: &str,
    message: &str,
    details: Option<Value>,
    ctx: &RequestContext,
    duration_ms: u64,
) -> String {
    let mut error = json!({
        "code": code,
        "message": message,
    });
    if let Some(details) = details {
        error["details"] = details;
    }
    json!({
        "ok": false,
        "error": error,
        "meta": {
            "requestId": ctx.request_id,
            "durationMs": duration_ms,
        },
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> RequestContext {
        RequestContext {
            request_id: "req-1".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn success_envelope_shape() {
        let raw = tool_success_json(json!({"answer": 42}), &ctx(), 12);
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["ok"], true);
        assert_eq!(parsed["data"]["answer"], 42);
        assert_eq!(parsed["meta"]["requestId"], "req-1");
        assert_eq!(parsed["meta"]["durationMs"], 12);
    }

    #[test]
    fn error_envelope_shape() {
        let raw = tool_error_json("unknown_tool", "no_such_tool", None, &ctx(), 3);
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["ok"], false);
        assert_eq!(parsed["error"]["code"], "unknown_tool");
        assert_eq!(parsed["error"]["message"], "no_such_tool");
        assert!(parsed["error"].get("details").is_none());
    }

    #[test]
    fn error_envelope_carries_details_when_present() {
        let raw = tool_error_json(
            "invalid_params",
            "command is required",
            Some(json!({"field": "command"})),
            &ctx(),
            1,
        );
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["error"]["details"]["field"], "command");
    }
}
