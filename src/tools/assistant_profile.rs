use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Public identity fields the assistant may report about itself.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AssistantProfile {
    pub assistant_name: String,
    pub model: String,
    pub version: String,
    pub started_at: String,
    pub uptime_day: f64,
}

pub fn build_assistant_profile(
    assistant_name: &str,
    model: &str,
    started_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> AssistantProfile {
    let uptime_ms = (now - started_at).num_milliseconds().max(0);
    let uptime_day = uptime_ms as f64 / (24.0 * 60.0 * 60.0 * 1000.0);
    AssistantProfile {
        assistant_name: assistant_name.to_string(),
        model: model.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        started_at: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        uptime_day: (uptime_day * 10_000.0).round() / 10_000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reports_identity_and_uptime() {
        let started = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let profile = build_assistant_profile("Assistant", "qwen/qwen3-vl-4b-instruct", started, now);
        assert_eq!(profile.assistant_name, "Assistant");
        assert_eq!(profile.model, "qwen/qwen3-vl-4b-instruct");
        assert_eq!(profile.version, env!("CARGO_PKG_VERSION"));
        assert_eq!(profile.uptime_day, 1.5);
        assert!(profile.started_at.starts_with("2025-06-01T00:00:00"));
    }

    #[test]
    fn clock_skew_never_yields_negative_uptime() {
        let started = Utc.with_ymd_and_hms(2025, 6, 2, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let profile = build_assistant_profile("Assistant", "m", started, now);
        assert_eq!(profile.uptime_day, 0.0);
    }
}
