use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::error::{Result, ScraperError};

/// One page to interpret for one artist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrlTask {
    /// Position in the run; results are re-ordered by it before ingestion.
    pub seq: u64,
    pub artist_id: Uuid,
    pub artist_name: String,
    pub url: String,
    pub image_url: Option<String>,
}

/// Hand-off between producers and workers, independent of the transport.
#[async_trait]
pub trait TaskQueue<T: Send + 'static>: Send + Sync {
    async fn enqueue(&self, item: T) -> Result<()>;
    /// Wait up to `timeout` for an item. `None` when the queue stays empty,
    /// or at once when it is closed and drained.
    async fn dequeue(&self, timeout: Duration) -> Result<Option<T>>;
    /// No more items will be enqueued.
    async fn close(&self);
}

/// Process-local queue over an unbounded tokio channel. Build one per run;
/// dropping it discards whatever was never dequeued.
pub struct InMemoryTaskQueue<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
}

impl<T> InMemoryTaskQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx: Mutex::new(Some(tx)), rx: Mutex::new(rx) }
    }
}

impl<T> Default for InMemoryTaskQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> TaskQueue<T> for InMemoryTaskQueue<T> {
    async fn enqueue(&self, item: T) -> Result<()> {
        let tx = self.tx.lock().await;
        let Some(tx) = tx.as_ref() else {
            return Err(ScraperError::Api { message: "task queue is closed".to_string() });
        };
        tx.send(item).map_err(|_| ScraperError::Api {
            message: "task queue receiver dropped".to_string(),
        })
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<T>> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(item) => Ok(item),
            Err(_) => Ok(None),
        }
    }

    async fn close(&self) {
        self.tx.lock().await.take();
    }
}
