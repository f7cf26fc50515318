use crate::app::ports::PageFetcherPort;
use crate::constants::USER_AGENT;
use crate::error::{Result, ScraperError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Shared client settings for every outbound call.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .gzip(true)
        .build()?;
    Ok(client)
}

/// Run `fut` under `timeout`, mapping expiry to `ScraperError::Timeout`.
pub async fn with_timeout<T>(
    what: &str,
    timeout: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(ScraperError::Timeout { what: what.to_string(), secs: timeout.as_secs() }),
    }
}

pub struct ReqwestFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self { client: build_client(timeout)?, timeout })
    }
}

#[async_trait]
impl PageFetcherPort for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        with_timeout(url, self.timeout, async {
            let resp = self.client.get(url).send().await.map_err(|e| {
                if e.is_timeout() {
                    ScraperError::Timeout { what: url.to_string(), secs: self.timeout.as_secs() }
                } else {
                    ScraperError::Http(e)
                }
            })?;
            let status = resp.status();
            if !status.is_success() {
                return Err(ScraperError::HttpStatus { status: status.as_u16(), url: url.to_string() });
            }
            let body = resp.text().await?;
            debug!("Fetched {} bytes from {}", body.len(), url);
            Ok(body)
        })
        .await
    }
}
