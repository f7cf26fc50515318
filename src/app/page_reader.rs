use crate::app::ports::PageFetcherPort;
use crate::constants::MIN_PAGE_TEXT_CHARS;
use crate::error::Result;
use crate::infra::html::InterpreterRegistry;
use crate::infra::http_client::with_timeout;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Fetch a page and turn it into extraction-ready text.
#[derive(Clone)]
pub struct PageReader {
    fetcher: Arc<dyn PageFetcherPort>,
    interpreters: Arc<InterpreterRegistry>,
    timeout: Duration,
}

impl PageReader {
    pub fn new(fetcher: Arc<dyn PageFetcherPort>, interpreters: Arc<InterpreterRegistry>, timeout: Duration) -> Self {
        Self { fetcher, interpreters, timeout }
    }

    /// `Ok(None)` when the page has too little text to be worth extracting.
    pub async fn read(&self, url: &str) -> Result<Option<String>> {
        let html = with_timeout(url, self.timeout, self.fetcher.fetch(url)).await?;
        let text = self.interpreters.interpret(url, &html);
        if text.chars().count() < MIN_PAGE_TEXT_CHARS {
            debug!("Skipping {}: only {} chars of text", url, text.chars().count());
            return Ok(None);
        }
        Ok(Some(text))
    }
}
