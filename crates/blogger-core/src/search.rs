//! Optional web search feeding the research agent.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::debug;

use crate::BloggerError;

const DUCKDUCKGO_HTML_URL: &str = "https://duckduckgo.com/html/";
const MAX_RESULTS: usize = 10;

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Return result headlines for `query`, best first.
    async fn search(&self, query: &str) -> Result<Vec<String>, BloggerError>;
}

/// Scrapes the DuckDuckGo HTML endpoint for result titles.
#[derive(Debug, Clone)]
pub struct DuckDuckGoSearch {
    client: Client,
    base_url: String,
}

impl DuckDuckGoSearch {
    pub fn new(timeout: Duration) -> Result<Self, BloggerError> {
        Self::with_base_url(DUCKDUCKGO_HTML_URL, timeout)
    }

    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BloggerError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("agentic-blogger/0.1")
            .build()
            .map_err(|err| {
                BloggerError::InvalidConfiguration(format!("failed to create HTTP client: {err}"))
            })?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str) -> Result<Vec<String>, BloggerError> {
        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|err| BloggerError::Other(err.into()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BloggerError::Other(anyhow::anyhow!(
                "search endpoint returned {status}"
            )));
        }

        let html = response
            .text()
            .await
            .map_err(|err| BloggerError::Other(err.into()))?;
        let titles = parse_result_titles(&html);
        debug!(query, hits = titles.len(), "web search completed");
        Ok(titles)
    }
}

/// Extract the first result titles from a DuckDuckGo HTML page.
pub fn parse_result_titles(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(".result__title") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .map(|element| {
            element
                .text()
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .filter(|title| !title.is_empty())
        .take(MAX_RESULTS)
        .collect()
}
