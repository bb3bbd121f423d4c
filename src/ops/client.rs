use std::time::Duration;

use reqwest::{Client, Method};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::cache::{system_clock_ms, ClockMs};
use crate::config::OpsConfig;
use crate::ops::breaker::{BreakerState, CircuitBreaker};

const MAX_ERROR_BODY_CHARS: usize = 300;
const MAX_COMMAND_CHARS: usize = 500;

/// Classified ops API failure. The `Display` form is the stable code
/// surfaced to logs and to the model-facing tool result; bearer tokens
/// never appear in it.
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("missing_token")]
    MissingToken,
    #[error("circuit_open")]
    CircuitOpen,
    #[error("timeout")]
    Timeout,
    #[error("http_error:{status}:{body}")]
    Http { status: u16, body: String },
    #[error("network_error:{cause}")]
    Network { cause: String },
    #[error("invalid_json")]
    InvalidJson,
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

fn redact_token(body: &str, token: &str) -> String {
    if token.is_empty() {
        return body.to_string();
    }
    body.replace(token, "[REDACTED]")
}

fn network_cause(err: &reqwest::Error) -> String {
    if err.is_connect() {
        return "connect_failed".to_string();
    }
    // Walk to the root cause; its message names the OS-level failure.
    let mut source: &dyn std::error::Error = err;
    while let Some(next) = source.source() {
        source = next;
    }
    let cause = truncate_chars(&source.to_string(), 120);
    if cause.is_empty() {
        "request_failed".to_string()
    } else {
        cause
    }
}

/// Client for the remote game-server operations API.
///
/// Every call is bearer-authenticated, timeout-bounded, and gated by a
/// circuit breaker owned by this instance: while the breaker is open
/// and no probe is available, calls fail with `circuit_open` before any
/// network I/O happens.
pub struct OpsClient {
    client: Client,
    base_url: String,
    token: String,
    timeout: Duration,
    breaker: Mutex<CircuitBreaker>,
    now_ms: ClockMs,
}

impl Drop for OpsClient {
    fn drop(&mut self) {
        self.token.zeroize();
    }
}

impl OpsClient {
    pub fn new(config: &OpsConfig) -> Self {
        Self::with_clock(config, system_clock_ms())
    }

    pub fn with_clock(config: &OpsConfig, now_ms: ClockMs) -> Self {
        Self {
            client: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout: Duration::from_millis(config.timeout_ms),
            breaker: Mutex::new(CircuitBreaker::new(
                config.breaker_failure_threshold,
                config.breaker_open_ms,
            )),
            now_ms,
        }
    }

    pub async fn get_status(&self) -> Result<Value, OpsError> {
        self.request(Method::GET, "/api/status", None).await
    }

    pub async fn get_summary(&self, minutes: Option<i64>) -> Result<Value, OpsError> {
        let minutes = minutes.unwrap_or(60).clamp(1, 1440);
        self.request(Method::GET, &format!("/api/summary?minutes={minutes}"), None)
            .await
    }

    pub async fn get_logs(&self, lines: Option<i64>) -> Result<Value, OpsError> {
        let lines = lines.unwrap_or(50).clamp(1, 200);
        self.request(Method::GET, &format!("/api/logs?lines={lines}"), None)
            .await
    }

    pub async fn start(&self) -> Result<Value, OpsError> {
        self.request(Method::POST, "/api/start", None).await
    }

    pub async fn stop(&self) -> Result<Value, OpsError> {
        self.request(Method::POST, "/api/stop", None).await
    }

    pub async fn restart(&self) -> Result<Value, OpsError> {
        self.request(Method::POST, "/api/restart", None).await
    }

    pub async fn exec_command(&self, command: &str) -> Result<Value, OpsError> {
        let command = truncate_chars(command, MAX_COMMAND_CHARS);
        self.request(Method::POST, "/api/exec", Some(json!({ "command": command })))
            .await
    }

    /// Snapshot of the breaker state, for logs and diagnostics.
    #[allow(dead_code)]
    pub async fn breaker_state(&self) -> BreakerState {
        self.breaker.lock().await.state((self.now_ms)())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        payload: Option<Value>,
    ) -> Result<Value, OpsError> {
        if self.token.is_empty() {
            return Err(OpsError::MissingToken);
        }

        {
            let now = (self.now_ms)();
            let mut breaker = self.breaker.lock().await;
            if breaker.is_open(now) {
                debug!(path, open_until_ms = breaker.open_until(), "circuit open, rejecting call");
                return Err(OpsError::CircuitOpen);
            }
            if breaker.state(now) == BreakerState::HalfOpen && !breaker.can_probe(now) {
                return Err(OpsError::CircuitOpen);
            }
        }

        let result = self.attempt(method, path, payload).await;
        let mut breaker = self.breaker.lock().await;
        match &result {
            Ok(_) => breaker.record_success(),
            Err(e) => {
                warn!(path, error = %e, "ops api call failed");
                breaker.record_failure((self.now_ms)());
            }
        }
        result
    }

    async fn attempt(
        &self,
        method: Method,
        path: &str,
        payload: Option<Value>,
    ) -> Result<Value, OpsError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, path, "ops api request");

        let mut builder = self
            .client
            .request(method, &url)
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json");
        if let Some(payload) = payload {
            builder = builder.json(&payload);
        }

        let response = match tokio::time::timeout(self.timeout, builder.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                if e.is_timeout() {
                    return Err(OpsError::Timeout);
                }
                return Err(OpsError::Network {
                    cause: redact_token(&network_cause(&e), &self.token),
                });
            }
            Err(_) => return Err(OpsError::Timeout),
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = match tokio::time::timeout(self.timeout, response.text()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                return Err(OpsError::Network {
                    cause: redact_token(&network_cause(&e), &self.token),
                })
            }
            Err(_) => return Err(OpsError::Timeout),
        };

        if !status.is_success() {
            return Err(OpsError::Http {
                status: status.as_u16(),
                body: redact_token(&truncate_chars(&body, MAX_ERROR_BODY_CHARS), &self.token),
            });
        }

        if content_type.contains("application/json") {
            return serde_json::from_str(&body).map_err(|_| OpsError::InvalidJson);
        }
        Ok(json!({ "ok": true, "text": body }))
    }
}

// Classification shortcut used in tests and by callers that only need
// the leading code (e.g. "http_error:503").
impl OpsError {
    pub fn code(&self) -> String {
        match self {
            OpsError::MissingToken => "missing_token".to_string(),
            OpsError::CircuitOpen => "circuit_open".to_string(),
            OpsError::Timeout => "timeout".to_string(),
            OpsError::Http { status, .. } => format!("http_error:{status}"),
            OpsError::Network { .. } => "network_error".to_string(),
            OpsError::InvalidJson => "invalid_json".to_string(),
        }
    }

    #[allow(dead_code)]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, OpsError::CircuitOpen)
    }
}
