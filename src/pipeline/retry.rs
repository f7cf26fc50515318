use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry for rate-limited provider calls.
///
/// `max_retries` counts extra attempts after the first one. Only errors for
/// which `ScraperError::is_rate_limited` holds are retried; the last error
/// is returned once the budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn none() -> Self {
        Self { max_retries: 0, delay: Duration::ZERO }
    }

    pub async fn run<T, F, Fut>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match op().await {
                Err(e) if e.is_rate_limited() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} rate limited, retry {}/{} in {:?}",
                        what, attempt, self.max_retries, self.delay
                    );
                    tokio::time::sleep(self.delay).await;
                }
                other => return other,
            }
        }
    }
}
