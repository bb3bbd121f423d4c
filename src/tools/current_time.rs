use chrono::{DateTime, FixedOffset, Utc};
use serde_json::Value;

pub const DEFAULT_TIMEZONE: &str = "Asia/Tokyo";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentTimeParams {
    pub timezone: String,
}

/// Zone names the model actually sends in practice. Anything not in
/// this table and not a numeric offset falls back to Asia/Tokyo, the
/// same default the instructions advertise.
fn named_zone_offset(name: &str) -> Option<(FixedOffset, &'static str)> {
    let offset = |secs: i32| FixedOffset::east_opt(secs).unwrap();
    match name {
        "Asia/Tokyo" => Some((offset(9 * 3600), "Asia/Tokyo")),
        "UTC" | "Etc/UTC" | "Z" => Some((offset(0), "UTC")),
        "Asia/Seoul" => Some((offset(9 * 3600), "Asia/Seoul")),
        "Asia/Shanghai" => Some((offset(8 * 3600), "Asia/Shanghai")),
        "Asia/Singapore" => Some((offset(8 * 3600), "Asia/Singapore")),
        "Australia/Sydney" => Some((offset(10 * 3600), "Australia/Sydney")),
        "Europe/London" => Some((offset(0), "Europe/London")),
        "Europe/Paris" => Some((offset(3600), "Europe/Paris")),
        "Europe/Berlin" => Some((offset(3600), "Europe/Berlin")),
        "America/New_York" => Some((offset(-5 * 3600), "America/New_York")),
        "America/Chicago" => Some((offset(-6 * 3600), "America/Chicago")),
        "America/Denver" => Some((offset(-7 * 3600), "America/Denver")),
        "America/Los_Angeles" => Some((offset(-8 * 3600), "America/Los_Angeles")),
        _ => None,
    }
}

fn is_jst_alias(lower: &str) -> bool {
    matches!(lower, "jst" | "japan" | "japan time" | "tokyo")
}

/// Parse "+09:00" / "-0530" / "+9" style offsets.
fn parse_numeric_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1i32, &raw[1..]),
        b'-' => (-1i32, &raw[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || rest.chars().any(|c| !c.is_ascii_digit() && c != ':') {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        3 | 4 => {
            let split = digits.len() - 2;
            (
                digits[..split].parse::<i32>().ok()?,
                digits[split..].parse::<i32>().ok()?,
            )
        }
        _ => return None,
    };
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Resolve a requested zone to (offset, display label), defaulting to
/// Asia/Tokyo for anything unrecognized.
pub fn normalize_timezone(raw: &str) -> (FixedOffset, String) {
    let input = raw.trim();
    let lower = input.to_lowercase();
    if input.is_empty() || is_jst_alias(&lower) {
        return (FixedOffset::east_opt(9 * 3600).unwrap(), DEFAULT_TIMEZONE.to_string());
    }
    if lower == "utc" || lower == "z" {
        return (FixedOffset::east_opt(0).unwrap(), "UTC".to_string());
    }
    if let Some((offset, label)) = named_zone_offset(input) {
        return (offset, label.to_string());
    }
    if let Some(offset) = parse_numeric_offset(input) {
        return (offset, format!("UTC{offset}"));
    }
    (FixedOffset::east_opt(9 * 3600).unwrap(), DEFAULT_TIMEZONE.to_string())
}

pub fn parse_current_time_params(input: Option<&str>) -> CurrentTimeParams {
    let fallback = CurrentTimeParams {
        timezone: DEFAULT_TIMEZONE.to_string(),
    };
    let Some(input) = input else {
        return fallback;
    };
    let Ok(parsed) = serde_json::from_str::<Value>(input) else {
        return fallback;
    };
    match parsed.get("timezone").and_then(Value::as_str) {
        Some(tz) if !tz.is_empty() => CurrentTimeParams {
            timezone: tz.to_string(),
        },
        _ => fallback,
    }
}

/// 24-hour formatted local time with a zone label, e.g.
/// `Asia/Tokyo の現在時刻: 2025/06/01 09:30:00 (UTC+09:00)`.
pub fn format_current_time(params: &CurrentTimeParams, now: DateTime<Utc>) -> String {
    let (offset, label) = normalize_timezone(&params.timezone);
    let local = now.with_timezone(&offset);
    format!(
        "{} の現在時刻: {} (UTC{})",
        label,
        local.format("%Y/%m/%d %H:%M:%S"),
        offset
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn defaults_to_tokyo_without_params() {
        assert_eq!(parse_current_time_params(None).timezone, "Asia/Tokyo");
        assert_eq!(parse_current_time_params(Some("not json")).timezone, "Asia/Tokyo");
        assert_eq!(parse_current_time_params(Some("{}")).timezone, "Asia/Tokyo");
    }

    #[test]
    fn accepts_explicit_timezone() {
        let params = parse_current_time_params(Some(r#"{"timezone":"UTC"}"#));
        assert_eq!(params.timezone, "UTC");
    }

    #[test]
    fn jst_aliases_map_to_tokyo() {
        for alias in ["jst", "JST", "japan", "Japan Time", "tokyo"] {
            let (_, label) = normalize_timezone(alias);
            assert_eq!(label, "Asia/Tokyo", "alias {alias}");
        }
    }

    #[test]
    fn unknown_zones_fall_back_to_tokyo() {
        let (_, label) = normalize_timezone("Mars/Olympus_Mons");
        assert_eq!(label, "Asia/Tokyo");
    }

    #[test]
    fn numeric_offsets_are_honored() {
        let (offset, _) = normalize_timezone("+05:30");
        assert_eq!(offset.local_minus_utc(), 5 * 3600 + 30 * 60);
        let (offset, _) = normalize_timezone("-0800");
        assert_eq!(offset.local_minus_utc(), -8 * 3600);
        let (_, label) = normalize_timezone("+99:99");
        assert_eq!(label, "Asia/Tokyo");
    }

    #[test]
    fn formats_tokyo_time_with_day_rollover() {
        let text = format_current_time(
            &CurrentTimeParams { timezone: "Asia/Tokyo".into() },
            at(2025, 5, 31, 23, 30, 0),
        );
        assert!(text.contains("2025/06/01 08:30:00"), "{text}");
        assert!(text.starts_with("Asia/Tokyo の現在時刻:"));
    }

    #[test]
    fn formats_utc_when_requested() {
        let text = format_current_time(
            &CurrentTimeParams { timezone: "UTC".into() },
            at(2025, 5, 31, 23, 30, 0),
        );
        assert!(text.contains("2025/05/31 23:30:00"), "{text}");
    }
}
