use crate::app::ports::Store;
use crate::domain::{Artist, ArtistStatus};
use crate::error::Result;
use chrono::{DateTime, Utc};
use metrics::counter;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Picks the stalest artists for each run and records that they were tried.
///
/// Selection is read-only; only `mark_processed` writes, and it never moves
/// an artist's `last_processed_at` backwards. There is no lock state, so two
/// overlapping runs may select the same artists.
#[derive(Clone)]
pub struct RotationScheduler {
    store: Arc<dyn Store>,
    batch_size: usize,
    status_filter: Option<ArtistStatus>,
}

impl RotationScheduler {
    pub fn new(store: Arc<dyn Store>, batch_size: usize, status_filter: Option<ArtistStatus>) -> Self {
        Self { store, batch_size, status_filter }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// The configured batch.
    pub async fn next_batch(&self) -> Result<Vec<Artist>> {
        self.select_batch(self.batch_size).await
    }

    #[instrument(skip(self), fields(status = ?self.status_filter))]
    pub async fn select_batch(&self, n: usize) -> Result<Vec<Artist>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let batch = self.store.stale_artists(n, self.status_filter.as_ref()).await?;
        debug!("Selected {} of up to {} artists", batch.len(), n);
        counter!("duende_artists_selected_total").increment(batch.len() as u64);
        Ok(batch)
    }

    /// Stamp every id in one bulk update. Call it for the whole batch, even
    /// for artists whose searches or extractions failed.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub async fn mark_processed(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let changed = self.store.stamp_artists(ids, at).await?;
        info!("Marked {} artists processed at {}", changed, at);
        Ok(changed)
    }
}
