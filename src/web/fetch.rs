use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::{redirect, Client};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::security::{validate_public_http_url, HostResolver, UrlBlockReason};
use crate::web::extract::{extract_readable_document, normalize_whitespace};

const USER_AGENT: &str = concat!("agentd/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid_url")]
    InvalidUrl,
    #[error("ssrf_blocked")]
    SsrfBlocked,
    #[error("fetch_timeout")]
    FetchTimeout,
    #[error("fetch_too_large")]
    FetchTooLarge,
    #[error("unsupported_content_type")]
    UnsupportedContentType,
    #[error("extract_failed")]
    ExtractFailed,
    #[error("fetch_http_{0}")]
    Http(u16),
    #[error("redirect_without_location")]
    RedirectWithoutLocation,
    #[error("too_many_redirects")]
    TooManyRedirects,
    #[error("fetch_failed:{0}")]
    Network(String),
}

#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub final_url: String,
    pub content_type: String,
    pub title: String,
    pub text: String,
}

/// Seam over page fetching so the research pipeline can be exercised
/// with scripted pages.
#[async_trait::async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<FetchedPage, FetchError>;
}

fn is_supported_content_type(content_type: &str) -> bool {
    content_type.contains("text/html") || content_type.contains("text/plain")
}

fn resolve_redirect(base: &Url, location: &str) -> Result<String, FetchError> {
    base.join(location)
        .map(|u| u.to_string())
        .map_err(|_| FetchError::InvalidUrl)
}

/// Fetches a page as readable text.
///
/// Every hop — the initial URL and each redirect target — goes through
/// the public-URL validator before any connection is made, so a
/// redirect cannot steer the fetch into a private network. The body is
/// streamed against a byte ceiling rather than buffered blindly, and
/// the whole operation runs under one timeout.
pub struct PageFetcher {
    client: Client,
    resolver: Arc<dyn HostResolver>,
    timeout: Duration,
    max_bytes: usize,
    max_redirects: usize,
}

impl PageFetcher {
    pub fn new(
        resolver: Arc<dyn HostResolver>,
        timeout_ms: u64,
        max_bytes: usize,
        max_redirects: usize,
    ) -> Self {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to build fetch HTTP client");
        Self {
            client,
            resolver,
            timeout: Duration::from_millis(timeout_ms),
            max_bytes,
            max_redirects,
        }
    }

    pub async fn fetch_text(&self, url: &str) -> Result<FetchedPage, FetchError> {
        match tokio::time::timeout(self.timeout, self.fetch_text_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::FetchTimeout),
        }
    }
}

#[async_trait::async_trait]
impl PageSource for PageFetcher {
    async fn fetch_text(&self, url: &str) -> Result<FetchedPage, FetchError> {
        PageFetcher::fetch_text(self, url).await
    }
}

impl PageFetcher {
    async fn fetch_text_inner(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let mut current = url.to_string();

        for hop in 0..=self.max_redirects {
            let validated = validate_public_http_url(&current, self.resolver.as_ref())
                .await
                .map_err(|reason| match reason {
                    UrlBlockReason::InvalidUrl | UrlBlockReason::InvalidProtocol => {
                        FetchError::InvalidUrl
                    }
                    _ => FetchError::SsrfBlocked,
                })?;
            debug!(url = %validated, hop, "fetching page");

            let response = self
                .client
                .get(validated.clone())
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        FetchError::FetchTimeout
                    } else {
                        FetchError::Network(e.to_string())
                    }
                })?;

            let status = response.status();
            if status.is_redirection() {
                let location = response
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or(FetchError::RedirectWithoutLocation)?;
                current = resolve_redirect(&validated, location)?;
                continue;
            }
            if !status.is_success() {
                return Err(FetchError::Http(status.as_u16()));
            }

            let content_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_ascii_lowercase();
            if !is_supported_content_type(&content_type) {
                return Err(FetchError::UnsupportedContentType);
            }

            let body = self.read_body_capped(response).await?;
            if content_type.contains("text/html") {
                let doc = extract_readable_document(&body, &validated)
                    .map_err(|_| FetchError::ExtractFailed)?;
                return Ok(FetchedPage {
                    final_url: validated.to_string(),
                    content_type,
                    title: doc.title,
                    text: doc.text,
                });
            }

            return Ok(FetchedPage {
                final_url: validated.to_string(),
                content_type,
                title: "untitled".to_string(),
                text: normalize_whitespace(&body),
            });
        }

        Err(FetchError::TooManyRedirects)
    }

    async fn read_body_capped(&self, response: reqwest::Response) -> Result<String, FetchError> {
        let mut stream = response.bytes_stream();
        let mut buf: Vec<u8> = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                if e.is_timeout() {
                    FetchError::FetchTimeout
                } else {
                    FetchError::Network(e.to_string())
                }
            })?;
            if buf.len() + chunk.len() > self.max_bytes {
                return Err(FetchError::FetchTooLarge);
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::net::IpAddr;

    struct NoDns;

    #[async_trait]
    impl HostResolver for NoDns {
        async fn resolve(&self, _hostname: &str) -> anyhow::Result<Vec<IpAddr>> {
            anyhow::bail!("no dns in tests")
        }
    }

    fn fetcher() -> PageFetcher {
        PageFetcher::new(Arc::new(NoDns), 2000, 1_000_000, 5)
    }

    #[tokio::test]
    async fn blocks_private_targets_before_any_network_io() {
        let err = fetcher().fetch_text("http://10.0.0.1/internal").await.unwrap_err();
        assert!(matches!(err, FetchError::SsrfBlocked));
        let err = fetcher().fetch_text("http://localhost:8080/").await.unwrap_err();
        assert!(matches!(err, FetchError::SsrfBlocked));
    }

    #[tokio::test]
    async fn rejects_non_http_schemes_as_invalid() {
        let err = fetcher().fetch_text("ftp://example.com/x").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl));
        let err = fetcher().fetch_text("not a url at all").await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl));
    }

    #[test]
    fn content_type_whitelist() {
        assert!(is_supported_content_type("text/html; charset=utf-8"));
        assert!(is_supported_content_type("text/plain"));
        assert!(!is_supported_content_type("application/json"));
        assert!(!is_supported_content_type("image/png"));
        assert!(!is_supported_content_type(""));
    }

    #[test]
    fn redirects_resolve_relative_locations() {
        let base = Url::parse("https://example.com/a/b").unwrap();
        assert_eq!(
            resolve_redirect(&base, "/next").unwrap(),
            "https://example.com/next"
        );
        assert_eq!(
            resolve_redirect(&base, "https://other.example/x").unwrap(),
            "https://other.example/x"
        );
    }

    #[test]
    fn error_codes_are_stable_strings() {
        assert_eq!(FetchError::SsrfBlocked.to_string(), "ssrf_blocked");
        assert_eq!(FetchError::FetchTooLarge.to_string(), "fetch_too_large");
        assert_eq!(FetchError::Http(404).to_string(), "fetch_http_404");
    }
}
