use crate::domain::{Artist, ArtistCandidate, ArtistStatus, EventCandidate, EventKey, PersistedEvent, SearchHit};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

#[async_trait]
pub trait SearchPort: Send + Sync {
    async fn search(&self, query: &str, num: u32) -> Result<Vec<SearchHit>>;
}

#[async_trait]
pub trait PageFetcherPort: Send + Sync {
    /// Raw body of the page at `url`.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// Raw text-in, text-out model call. Must map quota responses to
/// `ScraperError::RateLimited`.
#[async_trait]
pub trait LlmPort: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
pub trait ExtractionPort: Send + Sync {
    async fn extract_events(&self, artist_name: &str, url: &str, text: &str) -> Result<Vec<EventCandidate>>;
    async fn extract_artists(&self, url: &str, text: &str) -> Result<Vec<ArtistCandidate>>;
}

/// Outcome of a bulk event write as the store reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkInsertReport {
    pub inserted: usize,
    /// Rows the store refused because the key already existed.
    pub conflicts: usize,
}

/// Artist and event collections.
#[async_trait]
pub trait Store: Send + Sync {
    /// Up to `limit` artists ordered by `last_processed_at` ascending,
    /// never-processed first, ties by insertion order.
    async fn stale_artists(&self, limit: usize, status: Option<&ArtistStatus>) -> Result<Vec<Artist>>;
    /// Set `last_processed_at = at` on exactly `ids`, skipping rows already
    /// stamped later. Returns the number of rows changed.
    async fn stamp_artists(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<usize>;
    /// Existing artists whose names match any of `names`, case-insensitively.
    async fn artists_named(&self, names: &[String]) -> Result<Vec<Artist>>;
    async fn insert_artists(&self, artists: &[Artist]) -> Result<usize>;

    /// The subset of `keys` already persisted, in one query.
    async fn existing_event_keys(&self, keys: &[EventKey]) -> Result<HashSet<EventKey>>;
    async fn insert_events(&self, events: &[PersistedEvent]) -> Result<BulkInsertReport>;
}
