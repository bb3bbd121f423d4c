use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// One normalized web search hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("brave timeout after {0}ms")]
    Timeout(u64),
    #[error("brave {status}: {body}")]
    Http { status: u16, body: String },
    #[error("brave request failed: {0}")]
    Network(String),
    #[error("brave response unreadable")]
    InvalidBody,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError>;
}

/// Brave Web Search API client.
pub struct BraveSearchClient {
    client: Client,
    base_url: String,
    api_key: String,
    timeout_ms: u64,
}

impl BraveSearchClient {
    pub fn new(base_url: &str, api_key: &str, timeout_ms: u64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            timeout_ms,
        }
    }
}

fn normalize_rows(data: &Value, count: usize) -> Vec<SearchResult> {
    let empty = vec![];
    let rows = data["web"]["results"].as_array().unwrap_or(&empty);
    rows.iter()
        .map(|row| SearchResult {
            title: row["title"].as_str().unwrap_or("").trim().to_string(),
            url: row["url"].as_str().unwrap_or("").trim().to_string(),
            snippet: row["description"].as_str().unwrap_or("").trim().to_string(),
        })
        .filter(|row| !row.url.is_empty())
        .take(count)
        .collect()
}

#[async_trait]
impl SearchBackend for BraveSearchClient {
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchResult>, SearchError> {
        let count = max_results.clamp(1, 20);
        let url = format!("{}/res/v1/web/search", self.base_url);
        debug!(query, count, "brave search request");

        let request = self
            .client
            .get(&url)
            .query(&[("q", query), ("count", &count.to_string()), ("safesearch", "moderate")])
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .send();

        let response = match tokio::time::timeout(Duration::from_millis(self.timeout_ms), request).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                if e.is_timeout() {
                    return Err(SearchError::Timeout(self.timeout_ms));
                }
                return Err(SearchError::Network(e.to_string()));
            }
            Err(_) => return Err(SearchError::Timeout(self.timeout_ms)),
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let body: String = body.chars().take(500).collect();
            return Err(SearchError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let data: Value = response.json().await.map_err(|_| SearchError::InvalidBody)?;
        let normalized = normalize_rows(&data, count);
        debug!(result_count = normalized.len(), "brave search response");
        Ok(normalized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_and_drops_rows_without_urls() {
        let data = json!({
            "web": {
                "results": [
                    {"title": " A ", "url": " https://a.example ", "description": " first "},
                    {"title": "no url", "description": "dropped"},
                    {"title": "B", "url": "https://b.example", "description": ""},
                ]
            }
        });
        let rows = normalize_rows(&data, 5);
        assert_eq!(
            rows,
            vec![
                SearchResult {
                    title: "A".into(),
                    url: "https://a.example".into(),
                    snippet: "first".into()
                },
                SearchResult {
                    title: "B".into(),
                    url: "https://b.example".into(),
                    snippet: "".into()
                },
            ]
        );
    }

    #[test]
    fn caps_rows_at_requested_count() {
        let results: Vec<Value> = (0..10)
            .map(|i| json!({"title": format!("t{i}"), "url": format!("https://{i}.example")}))
            .collect();
        let data = json!({"web": {"results": results}});
        assert_eq!(normalize_rows(&data, 3).len(), 3);
    }

    #[test]
    fn missing_results_shape_is_empty() {
        assert!(normalize_rows(&json!({}), 5).is_empty());
        assert!(normalize_rows(&json!({"web": {}}), 5).is_empty());
    }
}
