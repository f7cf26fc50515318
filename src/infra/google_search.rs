use crate::app::ports::SearchPort;
use crate::constants::{GOOGLE_SEARCH_ENDPOINT, MAX_RESULTS_PER_QUERY};
use crate::domain::SearchHit;
use crate::error::{Result, ScraperError};
use crate::infra::http_client::{build_client, with_timeout};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
    title: Option<String>,
    snippet: Option<String>,
    pagemap: Option<PageMap>,
}

#[derive(Debug, Deserialize)]
struct PageMap {
    #[serde(default)]
    cse_image: Vec<CseImage>,
}

#[derive(Debug, Deserialize)]
struct CseImage {
    src: Option<String>,
}

/// Hits from a Custom Search JSON body. A body without `items` has no hits.
pub fn parse_search_response(body: &str) -> Result<Vec<SearchHit>> {
    let resp: SearchResponse = serde_json::from_str(body)?;
    Ok(resp
        .items
        .into_iter()
        .map(|item| SearchHit {
            image_url: item
                .pagemap
                .and_then(|p| p.cse_image.into_iter().find_map(|i| i.src)),
            url: item.link,
            title: item.title,
            snippet: item.snippet,
        })
        .collect())
}

/// Google Programmable Search (Custom Search JSON API).
pub struct GoogleSearch {
    client: reqwest::Client,
    api_key: String,
    cx: String,
    timeout: Duration,
}

impl GoogleSearch {
    pub fn new(api_key: impl Into<String>, cx: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            api_key: api_key.into(),
            cx: cx.into(),
            timeout,
        })
    }
}

#[async_trait]
impl SearchPort for GoogleSearch {
    #[instrument(skip(self))]
    async fn search(&self, query: &str, num: u32) -> Result<Vec<SearchHit>> {
        let num = num.clamp(1, MAX_RESULTS_PER_QUERY).to_string();
        with_timeout("search", self.timeout, async {
            let resp = self
                .client
                .get(GOOGLE_SEARCH_ENDPOINT)
                .query(&[
                    ("key", self.api_key.as_str()),
                    ("cx", self.cx.as_str()),
                    ("q", query),
                    ("num", num.as_str()),
                ])
                .send()
                .await?;
            let status = resp.status();
            if status.as_u16() == 429 {
                return Err(ScraperError::RateLimited { provider: "google-search".to_string() });
            }
            if !status.is_success() {
                return Err(ScraperError::HttpStatus { status: status.as_u16(), url: GOOGLE_SEARCH_ENDPOINT.to_string() });
            }
            let hits = parse_search_response(&resp.text().await?)?;
            debug!("{} hits", hits.len());
            Ok(hits)
        })
        .await
    }
}
