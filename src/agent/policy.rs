use once_cell::sync::Lazy;
use regex::Regex;

/// Instruction profile selected by the calling collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Persona {
    #[default]
    Default,
    Ops,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Default => "default",
            Persona::Ops => "ops",
        }
    }

    pub fn parse(raw: &str) -> Persona {
        match raw.trim().to_lowercase().as_str() {
            "ops" | "operations" => Persona::Ops,
            _ => Persona::Default,
        }
    }
}

/// Pull the newest user utterance out of the input. Transcripts arrive
/// as `user:`/`assistant:` lines; a single question arrives as-is. A
/// leading speaker label (`Name: ...`) after the role prefix is
/// stripped as well.
pub fn extract_latest_user_input(input_text: &str) -> String {
    static USER_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^user:\s*").unwrap());
    static SPEAKER_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^:]{1,40}:\s*").unwrap());

    let lines: Vec<&str> = input_text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let latest = lines
        .iter()
        .rev()
        .find(|line| line.starts_with("user:"));
    let Some(latest) = latest else {
        return input_text.trim().to_string();
    };

    let after_prefix = USER_PREFIX.replace(latest, "");
    SPEAKER_LABEL.replace(&after_prefix, "").trim().to_string()
}

static WEB_RESEARCH_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"天気|天候|気温|降水|台風|weather|forecast").unwrap(),
        Regex::new(r"ニュース|報道|速報|最新|today|tomorrow|yesterday|今日|明日|昨日").unwrap(),
        Regex::new(r"選挙|election|為替|株価|金利|価格|相場").unwrap(),
    ]
});

static CURRENT_TIME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"何時|時刻|現在時刻|今の時間|現在の時間|いま何時").unwrap(),
        Regex::new(r"\btime\b|\bcurrent time\b|\bwhat time\b|\bnow\b").unwrap(),
    ]
});

static ASSISTANT_PROFILE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"モデル名|モデルは|使用モデル|使ってるモデル|llm名|プロフィール|version|バージョン|起動時刻|稼働時間|uptime").unwrap(),
        Regex::new(r"\bmodel name\b|\bwhich model\b|\bwhat model\b|\bprofile\b|\bversion\b|\buptime\b|\bstarted at\b").unwrap(),
    ]
});

/// True when the utterance needs fresh information from the web
/// (weather, news, prices and other time-sensitive topics).
pub fn needs_web_research(input_text: &str) -> bool {
    let t = input_text.to_lowercase();
    WEB_RESEARCH_PATTERNS.iter().any(|p| p.is_match(&t))
}

/// True when the utterance asks about the current time.
pub fn needs_current_time(input_text: &str) -> bool {
    let t = input_text.to_lowercase();
    CURRENT_TIME_PATTERNS.iter().any(|p| p.is_match(&t))
}

/// True when the utterance asks about the assistant's own identity,
/// model, version, or uptime.
pub fn needs_assistant_profile(input_text: &str) -> bool {
    let t = input_text.to_lowercase();
    ASSISTANT_PROFILE_PATTERNS.iter().any(|p| p.is_match(&t))
}

pub struct InstructionParams<'a> {
    pub assistant_name: &'a str,
    pub today: &'a str,
    pub persona: Persona,
    pub force_web_research: bool,
    pub force_current_time: bool,
    pub force_assistant_profile: bool,
}

pub fn build_assistant_instructions(params: &InstructionParams<'_>) -> String {
    let mut base = vec![
        format!("You are a friendly assistant named {}.", params.assistant_name),
        "Answer in concise and polite Japanese.".to_string(),
        format!(
            "Today's date is {}. Use this as the reference date for all temporal reasoning.",
            params.today
        ),
        "You can use current_time, web_research_digest, and assistant_profile tools when needed."
            .to_string(),
        "For any time-related answer, use Asia/Tokyo and 24-hour format.".to_string(),
        "When calling web_research_digest, preserve the user's intent in the query.".to_string(),
        "If the user did not specify a year, do not arbitrarily lock the query to an older year."
            .to_string(),
        "Input can be either a single user question or a transcript formatted as 'user:'/'assistant:'. Prioritize full conversation context.".to_string(),
    ];
    if params.persona == Persona::Ops {
        base.push(
            "This is the operations channel. Use the ops_* tools to inspect or manage the game server before answering server questions.".to_string(),
        );
    }
    if params.force_current_time {
        base.push(
            "This question asks for current time. Call current_time at least once before the final answer.".to_string(),
        );
        base.push(r#"If timezone is omitted, call current_time with {"timezone":"Asia/Tokyo"}."#.to_string());
    }
    if params.force_assistant_profile {
        base.push(
            "This question asks about assistant profile. Call assistant_profile at least once before the final answer.".to_string(),
        );
    }
    if params.force_web_research {
        base.push(
            "This question requires up-to-date information. Call web_research_digest at least once before the final answer.".to_string(),
        );
        base.push(
            r#"Do not send an empty input to web_research_digest. Always pass JSON like {"query":"...","max_results":3,"max_pages":3}."#.to_string(),
        );
    }
    base.join("\n")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForcedRetryPlan {
    pub must_retry: bool,
    pub must_retry_for_web_research: bool,
    pub must_retry_for_current_time: bool,
    pub must_retry_for_assistant_profile: bool,
    pub strict_instructions: String,
}

pub struct ForcedRetryParams<'a> {
    pub base_instructions: &'a str,
    pub force_web_research: bool,
    pub force_current_time: bool,
    pub force_assistant_profile: bool,
    pub has_web_research_call: bool,
    pub has_current_time_call: bool,
    pub has_assistant_profile_call: bool,
}

/// Decide whether a policy-mandated tool was skipped and, if so, build
/// the stricter instructions for the single retry request.
pub fn build_forced_retry_plan(params: &ForcedRetryParams<'_>) -> ForcedRetryPlan {
    let for_web = params.force_web_research && !params.has_web_research_call;
    let for_time = params.force_current_time && !params.has_current_time_call;
    let for_profile = params.force_assistant_profile && !params.has_assistant_profile_call;

    let mut lines = vec![params.base_instructions.to_string()];
    if for_web {
        lines.push("IMPORTANT: Do not answer directly before calling web_research_digest.".to_string());
    }
    if for_time {
        lines.push("IMPORTANT: Do not answer directly before calling current_time.".to_string());
    }
    if for_profile {
        lines.push("IMPORTANT: Do not answer directly before calling assistant_profile.".to_string());
    }

    ForcedRetryPlan {
        must_retry: for_web || for_time || for_profile,
        must_retry_for_web_research: for_web,
        must_retry_for_current_time: for_time,
        must_retry_for_assistant_profile: for_profile,
        strict_instructions: lines.join("\n"),
    }
}
