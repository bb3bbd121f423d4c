use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::cache::{ClockMs, FileCache};
use crate::web::extract::normalize_whitespace;
use crate::web::fetch::{FetchError, PageSource};
use crate::web::search::{SearchBackend, SearchResult};

pub const DEFAULT_MAX_RESULTS: usize = 5;
pub const DEFAULT_MAX_PAGES: usize = 3;
const MAX_BULLETS: usize = 8;
const MAX_CITATIONS: usize = 8;
const MAX_ERRORS: usize = 8;
const MAX_BULLET_CHARS: usize = 240;
const MAX_SNIPPET_CHARS: usize = 280;
const MAX_TITLE_CHARS: usize = 120;
const MAX_QUERY_CHARS: usize = 300;
const MAX_FOCUS_CHARS: usize = 200;
const MAX_ERROR_MESSAGE_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebResearchDigestParams {
    pub query: String,
    pub max_results: usize,
    pub max_pages: usize,
    pub focus: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebResearchErrorCode {
    BraveError,
    FetchTimeout,
    FetchTooLarge,
    InvalidUrl,
    SsrfBlocked,
    UnsupportedContentType,
    ExtractFailed,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebResearchError {
    pub code: WebResearchErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebResearchCitation {
    pub id: String,
    pub title: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebResearchMeta {
    pub cache_hit_search: bool,
    pub cache_hit_pages: u32,
    pub elapsed_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebResearchDigestOutput {
    pub query: String,
    pub bullets: Vec<String>,
    pub citations: Vec<WebResearchCitation>,
    pub errors: Vec<WebResearchError>,
    pub meta: WebResearchMeta,
}

impl WebResearchDigestOutput {
    pub fn citation_urls(&self) -> Vec<String> {
        self.citations.iter().map(|c| c.url.clone()).collect()
    }
}

/// Truncate to a character budget, marking the cut with an ellipsis.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    cut.push('…');
    cut
}

/// Parse tool-call input into clamped digest parameters. Unparseable
/// input degrades to the defaults with an empty query; the caller
/// decides whether a fallback query applies.
pub fn parse_web_research_params(input: Option<&str>) -> WebResearchDigestParams {
    let fallback = WebResearchDigestParams {
        query: String::new(),
        max_results: DEFAULT_MAX_RESULTS,
        max_pages: DEFAULT_MAX_PAGES,
        focus: String::new(),
    };
    let Some(input) = input else {
        return fallback;
    };
    let Ok(parsed) = serde_json::from_str::<Value>(input) else {
        return fallback;
    };

    let query = parsed
        .get("query")
        .and_then(Value::as_str)
        .map(normalize_whitespace)
        .unwrap_or_default();
    let focus = parsed
        .get("focus")
        .and_then(Value::as_str)
        .map(|f| truncate_chars(&normalize_whitespace(f), MAX_FOCUS_CHARS))
        .unwrap_or_default();
    let max_results = parsed
        .get("max_results")
        .and_then(Value::as_f64)
        .map(|n| (n.floor() as i64).clamp(1, 8) as usize)
        .unwrap_or(DEFAULT_MAX_RESULTS);
    let max_pages = parsed
        .get("max_pages")
        .and_then(Value::as_f64)
        .map(|n| (n.floor() as i64).clamp(1, 5) as usize)
        .unwrap_or(DEFAULT_MAX_PAGES);

    WebResearchDigestParams {
        query: truncate_chars(&query, MAX_QUERY_CHARS),
        max_results,
        max_pages,
        focus,
    }
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '。' | '.' | '!' | '?') {
            if chars.peek().is_some_and(|next| next.is_whitespace()) {
                sentences.push(current.trim().to_string());
                current.clear();
            }
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }
    sentences.retain(|s| !s.is_empty());
    sentences
}

/// Pick the sentence most relevant to the query, scored by how many
/// distinct query/focus terms (length ≥2) it contains. Ties keep the
/// earliest sentence. Intentionally simple and replaceable.
pub fn pick_summary_sentence(text: &str, query: &str, focus: &str) -> String {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return String::new();
    }

    let mut seen = HashSet::new();
    let terms: Vec<String> = normalize_whitespace(&format!("{query} {focus}"))
        .to_lowercase()
        .split_whitespace()
        .filter(|term| term.chars().count() >= 2)
        .filter(|term| seen.insert(term.to_string()))
        .map(str::to_string)
        .collect();

    let candidates = split_sentences(&normalized);
    let mut best = candidates.first().cloned().unwrap_or(normalized);
    let mut best_score = -1i64;
    for row in &candidates {
        let lower = row.to_lowercase();
        let score = terms.iter().filter(|term| lower.contains(term.as_str())).count() as i64;
        if score > best_score {
            best = row.clone();
            best_score = score;
        }
    }
    truncate_chars(&normalize_whitespace(&best), MAX_BULLET_CHARS)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedPage {
    title: String,
    text: String,
}

fn fetch_error_code(err: &FetchError) -> WebResearchErrorCode {
    match err {
        FetchError::InvalidUrl => WebResearchErrorCode::InvalidUrl,
        FetchError::SsrfBlocked => WebResearchErrorCode::SsrfBlocked,
        FetchError::FetchTimeout => WebResearchErrorCode::FetchTimeout,
        FetchError::FetchTooLarge => WebResearchErrorCode::FetchTooLarge,
        FetchError::UnsupportedContentType => WebResearchErrorCode::UnsupportedContentType,
        FetchError::ExtractFailed => WebResearchErrorCode::ExtractFailed,
        // Residual fetch failures (HTTP status, redirect trouble,
        // transport) share the provider-generic bucket.
        _ => WebResearchErrorCode::BraveError,
    }
}

/// The cached, partially-fault-tolerant research pipeline: one search,
/// up to `max_pages` page fetches, a bounded digest out. A failing page
/// never aborts the digest; it becomes an error entry instead.
pub struct WebResearch {
    search: Arc<dyn SearchBackend>,
    pages: Arc<dyn PageSource>,
    cache: FileCache,
    search_ttl_seconds: u64,
    page_ttl_seconds: u64,
    now_ms: ClockMs,
}

impl WebResearch {
    pub fn new(
        search: Arc<dyn SearchBackend>,
        pages: Arc<dyn PageSource>,
        cache: FileCache,
        search_ttl_seconds: u64,
        page_ttl_seconds: u64,
        now_ms: ClockMs,
    ) -> Self {
        Self {
            search,
            pages,
            cache,
            search_ttl_seconds,
            page_ttl_seconds,
            now_ms,
        }
    }

    async fn search_results(
        &self,
        params: &WebResearchDigestParams,
    ) -> Result<(Vec<SearchResult>, bool), String> {
        let key = json!({"query": params.query, "max_results": params.max_results}).to_string();
        if let Some(rows) = self.cache.get::<Vec<SearchResult>>("search", &key).await {
            return Ok((rows, true));
        }
        let rows = self
            .search
            .search(&params.query, params.max_results)
            .await
            .map_err(|e| e.to_string())?;
        if let Err(e) = self
            .cache
            .set("search", &key, &rows, self.search_ttl_seconds)
            .await
        {
            debug!(error = %e, "failed to store search cache entry");
        }
        Ok((rows, false))
    }

    async fn page_text(&self, url: &str) -> Result<(CachedPage, bool), FetchError> {
        if let Some(page) = self.cache.get::<CachedPage>("pages", url).await {
            return Ok((page, true));
        }
        let fetched = self.pages.fetch_text(url).await?;
        debug!(
            final_url = %fetched.final_url,
            content_type = %fetched.content_type,
            chars = fetched.text.chars().count(),
            "fetched page text"
        );
        let page = CachedPage {
            title: fetched.title,
            text: fetched.text,
        };
        if let Err(e) = self.cache.set("pages", url, &page, self.page_ttl_seconds).await {
            debug!(error = %e, "failed to store page cache entry");
        }
        Ok((page, false))
    }

    pub async fn digest(&self, params: &WebResearchDigestParams) -> WebResearchDigestOutput {
        let started = (self.now_ms)();
        let mut bullets: Vec<String> = Vec::new();
        let mut citations: Vec<WebResearchCitation> = Vec::new();
        let mut errors: Vec<WebResearchError> = Vec::new();
        let mut cache_hit_search = false;
        let mut cache_hit_pages = 0u32;

        if params.query.is_empty() {
            return WebResearchDigestOutput {
                query: String::new(),
                bullets,
                citations,
                errors: vec![WebResearchError {
                    code: WebResearchErrorCode::InvalidUrl,
                    message: "query is required".to_string(),
                    url: None,
                }],
                meta: WebResearchMeta {
                    cache_hit_search: false,
                    cache_hit_pages: 0,
                    elapsed_ms: ((self.now_ms)() - started).max(0),
                },
            };
        }

        let search_rows = match self.search_results(params).await {
            Ok((rows, hit)) => {
                cache_hit_search = hit;
                rows
            }
            Err(message) => {
                warn!(query = %params.query, error = %message, "web search failed");
                errors.push(WebResearchError {
                    code: WebResearchErrorCode::BraveError,
                    message: truncate_chars(&message, MAX_ERROR_MESSAGE_CHARS),
                    url: None,
                });
                Vec::new()
            }
        };

        for row in search_rows.iter().take(params.max_pages) {
            let (page, hit) = match self.page_text(&row.url).await {
                Ok(found) => found,
                Err(err) => {
                    errors.push(WebResearchError {
                        code: fetch_error_code(&err),
                        message: truncate_chars(&err.to_string(), MAX_ERROR_MESSAGE_CHARS),
                        url: Some(row.url.clone()),
                    });
                    continue;
                }
            };
            if hit {
                cache_hit_pages += 1;
            }

            let id = (citations.len() + 1).to_string();
            let title_source = if !page.title.is_empty() {
                page.title.clone()
            } else if !row.title.is_empty() {
                row.title.clone()
            } else {
                "untitled".to_string()
            };
            let snippet = if row.snippet.is_empty() {
                None
            } else {
                Some(truncate_chars(&normalize_whitespace(&row.snippet), MAX_SNIPPET_CHARS))
            };
            citations.push(WebResearchCitation {
                id: id.clone(),
                title: truncate_chars(&normalize_whitespace(&title_source), MAX_TITLE_CHARS),
                url: row.url.clone(),
                snippet,
            });

            let summary = pick_summary_sentence(&page.text, &params.query, &params.focus);
            if !summary.is_empty() {
                bullets.push(format!("{summary} [{id}]"));
            }
            if bullets.len() >= MAX_BULLETS || citations.len() >= MAX_CITATIONS {
                break;
            }
        }

        bullets.truncate(MAX_BULLETS);
        citations.truncate(MAX_CITATIONS);
        errors.truncate(MAX_ERRORS);

        WebResearchDigestOutput {
            query: params.query.clone(),
            bullets,
            citations,
            errors,
            meta: WebResearchMeta {
                cache_hit_search,
                cache_hit_pages,
                elapsed_ms: ((self.now_ms)() - started).max(0),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::web::fetch::FetchedPage;
    use crate::web::search::SearchError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

    fn params(query: &str) -> WebResearchDigestParams {
        WebResearchDigestParams {
            query: query.to_string(),
            max_results: 8,
            max_pages: 5,
            focus: String::new(),
        }
    }

    struct FakeSearch {
        rows: Vec<SearchResult>,
        calls: AtomicU32,
        fail: bool,
    }

    impl FakeSearch {
        fn with_rows(rows: Vec<SearchResult>) -> Self {
            Self { rows, calls: AtomicU32::new(0), fail: false }
        }

        fn failing() -> Self {
            Self { rows: vec![], calls: AtomicU32::new(0), fail: true }
        }
    }

    #[async_trait]
    impl SearchBackend for FakeSearch {
        async fn search(
            &self,
            _query: &str,
            max_results: usize,
        ) -> Result<Vec<SearchResult>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SearchError::Http { status: 429, body: "slow down".into() });
            }
            Ok(self.rows.iter().take(max_results).cloned().collect())
        }
    }

    struct FakePages {
        fail_urls: Vec<String>,
    }

    #[async_trait]
    impl PageSource for FakePages {
        async fn fetch_text(&self, url: &str) -> Result<FetchedPage, FetchError> {
            if self.fail_urls.iter().any(|u| u == url) {
                return Err(FetchError::SsrfBlocked);
            }
            Ok(FetchedPage {
                final_url: url.to_string(),
                content_type: "text/html".to_string(),
                title: format!("Title for {url}"),
                text: format!("Rust release notes for {url}. Unrelated filler sentence."),
            })
        }
    }

    fn rows(n: usize) -> Vec<SearchResult> {
        (0..n)
            .map(|i| SearchResult {
                title: format!("result {i}"),
                url: format!("https://site{i}.example/article"),
                snippet: format!("snippet {i}"),
            })
            .collect()
    }

    fn pipeline(search: FakeSearch, pages: FakePages) -> (WebResearch, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let clock: ClockMs = Arc::new(|| 1_000);
        let cache = FileCache::with_clock(dir.path(), clock.clone());
        let research = WebResearch::new(
            Arc::new(search),
            Arc::new(pages),
            cache,
            900,
            900,
            clock,
        );
        (research, dir)
    }

    #[test]
    fn parses_and_clamps_params() {
        let parsed = parse_web_research_params(Some(
            r#"{"query":"  tokyo   weather ","max_results":99,"max_pages":0.9,"focus":"tomorrow"}"#,
        ));
        assert_eq!(parsed.query, "tokyo weather");
        assert_eq!(parsed.max_results, 8);
        assert_eq!(parsed.max_pages, 1);
        assert_eq!(parsed.focus, "tomorrow");
    }

    #[test]
    fn unparseable_input_degrades_to_defaults() {
        let parsed = parse_web_research_params(Some("not json"));
        assert_eq!(parsed.query, "");
        assert_eq!(parsed.max_results, DEFAULT_MAX_RESULTS);
        assert_eq!(parsed.max_pages, DEFAULT_MAX_PAGES);
        assert_eq!(parse_web_research_params(None).query, "");
    }

    #[test]
    fn long_queries_are_cut_to_300_chars() {
        let long = "q".repeat(400);
        let parsed = parse_web_research_params(Some(&format!(r#"{{"query":"{long}"}}"#)));
        assert_eq!(parsed.query.chars().count(), 300);
        assert!(parsed.query.ends_with('…'));
    }

    #[test]
    fn picks_the_sentence_with_most_query_terms() {
        let text = "Cats sleep all day. The rust compiler added a new borrow checker pass. Weather is mild.";
        let picked = pick_summary_sentence(text, "rust compiler", "");
        assert_eq!(picked, "The rust compiler added a new borrow checker pass.");
    }

    #[test]
    fn tie_keeps_the_first_sentence() {
        let text = "First sentence here. Second sentence here.";
        let picked = pick_summary_sentence(text, "zzz", "");
        assert_eq!(picked, "First sentence here.");
    }

    #[test]
    fn bullet_truncates_to_240() {
        let long_sentence = format!("{} end.", "word ".repeat(100));
        let picked = pick_summary_sentence(&long_sentence, "word", "");
        assert!(picked.chars().count() <= 240);
        assert!(picked.ends_with('…'));
    }

    #[tokio::test]
    async fn empty_query_is_rejected_with_an_error_entry() {
        let (research, _dir) = pipeline(FakeSearch::with_rows(rows(3)), FakePages { fail_urls: vec![] });
        let out = research.digest(&params("")).await;
        assert!(out.bullets.is_empty());
        assert!(out.citations.is_empty());
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].message, "query is required");
    }

    #[tokio::test]
    async fn caps_bullets_and_citations_at_eight_with_dense_ids() {
        let (research, _dir) = pipeline(FakeSearch::with_rows(rows(12)), FakePages { fail_urls: vec![] });
        let mut p = params("rust release notes");
        // Page budget wider than the digest caps: the caps must win.
        p.max_pages = 12;
        let out = research.digest(&p).await;
        assert_eq!(out.bullets.len(), 8);
        assert_eq!(out.citations.len(), 8);
        let ids: Vec<&str> = out.citations.iter().map(|c| c.id.as_str()).collect();
        for (i, id) in ids.iter().enumerate() {
            assert_eq!(*id, (i + 1).to_string());
        }
        assert!(out.bullets[0].ends_with("[1]"));
    }

    #[tokio::test]
    async fn page_failure_is_recorded_and_skipped() {
        let search = FakeSearch::with_rows(rows(3));
        let pages = FakePages {
            fail_urls: vec!["https://site1.example/article".to_string()],
        };
        let (research, _dir) = pipeline(search, pages);
        let out = research.digest(&params("rust")).await;
        assert_eq!(out.citations.len(), 2);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].code, WebResearchErrorCode::SsrfBlocked);
        assert_eq!(out.errors[0].url.as_deref(), Some("https://site1.example/article"));
        // Citation ids stay dense despite the failure in the middle.
        assert_eq!(out.citations[1].id, "2");
    }

    #[tokio::test]
    async fn search_failure_produces_single_error_and_empty_digest() {
        let (research, _dir) = pipeline(FakeSearch::failing(), FakePages { fail_urls: vec![] });
        let out = research.digest(&params("rust")).await;
        assert!(out.bullets.is_empty());
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].code, WebResearchErrorCode::BraveError);
    }

    #[tokio::test]
    async fn second_digest_hits_both_caches() {
        let dir = tempfile::tempdir().unwrap();
        let clock: ClockMs = Arc::new(|| 1_000);
        let cache = FileCache::with_clock(dir.path(), clock.clone());
        let search = Arc::new(FakeSearch::with_rows(rows(2)));
        let research = WebResearch::new(
            search.clone(),
            Arc::new(FakePages { fail_urls: vec![] }),
            cache,
            900,
            900,
            clock,
        );

        let p = params("rust");
        let first = research.digest(&p).await;
        assert!(!first.meta.cache_hit_search);
        assert_eq!(first.meta.cache_hit_pages, 0);

        let second = research.digest(&p).await;
        assert!(second.meta.cache_hit_search);
        assert_eq!(second.meta.cache_hit_pages, 2);
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);
    }
}
