#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use duende_scraper::app::ports::{BulkInsertReport, ExtractionPort, PageFetcherPort, SearchPort, Store};
use duende_scraper::app::services::{Adapters, Services};
use duende_scraper::config::{Config, FileConfig};
use duende_scraper::domain::{
    Artist, ArtistCandidate, ArtistStatus, EventCandidate, EventKey, PersistedEvent, SearchHit,
};
use duende_scraper::error::{Result, ScraperError};
use duende_scraper::infra::html::InterpreterRegistry;
use duende_scraper::infra::memory_store::InMemoryStore;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub fn test_config() -> Config {
    let env: HashMap<String, String> = [
        ("STORE_URL", "memory:"),
        ("GOOGLE_API_KEY", "test-key"),
        ("GOOGLE_CX", "test-cx"),
        ("LLM_API_KEY", "test-llm-key"),
        ("ARTIST_BATCH_SIZE", "3"),
        ("WORKER_CONCURRENCY", "2"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    let file = FileConfig {
        queue_idle_timeout_ms: Some(50),
        search_templates: Some(vec!["{artist} concierto {year}".to_string()]),
        discovery_queries: Some(vec!["cartel flamenco {year}".to_string()]),
        ..Default::default()
    };
    Config::from_sources(file, &env).expect("test config")
}

/// Long enough to clear the minimum page text length.
pub fn page(body: &str) -> String {
    format!(
        "<html><body><nav>menu</nav><main><p>{body}</p><p>{}</p></main></body></html>",
        "Programación de flamenco en directo con cante, baile y toque. ".repeat(4)
    )
}

pub fn candidate(artist: &str, date: &str, venue: &str) -> EventCandidate {
    EventCandidate {
        artist_name: Some(artist.to_string()),
        name: Some(format!("{artist} en {venue}")),
        date: Some(date.to_string()),
        venue: Some(venue.to_string()),
        city: Some("Sevilla".to_string()),
        ..Default::default()
    }
}

/// Returns hits for every query that mentions a known artist.
#[derive(Default)]
pub struct FakeSearch {
    pub hits: HashMap<String, Vec<String>>,
    pub failing: HashSet<String>,
    pub calls: AtomicUsize,
}

impl FakeSearch {
    pub fn with(mut self, needle: &str, urls: &[&str]) -> Self {
        self.hits.insert(needle.to_string(), urls.iter().map(|u| u.to_string()).collect());
        self
    }

    pub fn failing_for(mut self, needle: &str) -> Self {
        self.failing.insert(needle.to_string());
        self
    }
}

#[async_trait]
impl SearchPort for FakeSearch {
    async fn search(&self, query: &str, _num: u32) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.iter().any(|n| query.contains(n.as_str())) {
            return Err(ScraperError::RateLimited { provider: "fake search".to_string() });
        }
        Ok(self
            .hits
            .iter()
            .filter(|(needle, _)| query.contains(needle.as_str()))
            .flat_map(|(_, urls)| urls.iter())
            .map(|url| SearchHit { url: url.clone(), title: None, snippet: None, image_url: None })
            .collect())
    }
}

/// Serves canned pages; unknown URLs time out.
#[derive(Default)]
pub struct FakeFetcher {
    pub pages: HashMap<String, String>,
}

impl FakeFetcher {
    pub fn with(mut self, url: &str, html: String) -> Self {
        self.pages.insert(url.to_string(), html);
        self
    }
}

#[async_trait]
impl PageFetcherPort for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        self.pages
            .get(url)
            .cloned()
            .ok_or_else(|| ScraperError::Timeout { what: url.to_string(), secs: 15 })
    }
}

/// Canned extraction results keyed by URL.
#[derive(Default)]
pub struct FakeExtractor {
    pub events: HashMap<String, Vec<EventCandidate>>,
    pub artists: HashMap<String, Vec<ArtistCandidate>>,
    pub malformed: HashSet<String>,
    /// Simulated model latency per call.
    pub delay_ms: AtomicU64,
}

impl FakeExtractor {
    pub fn events(mut self, url: &str, events: Vec<EventCandidate>) -> Self {
        self.events.insert(url.to_string(), events);
        self
    }

    pub fn artists(mut self, url: &str, names: &[&str]) -> Self {
        let found = names
            .iter()
            .map(|n| ArtistCandidate { name: Some(n.to_string()), main_role: Some("cantaor".to_string()) })
            .collect();
        self.artists.insert(url.to_string(), found);
        self
    }

    pub fn malformed(mut self, url: &str) -> Self {
        self.malformed.insert(url.to_string());
        self
    }

    pub fn slow(self, ms: u64) -> Self {
        self.delay_ms.store(ms, Ordering::SeqCst);
        self
    }

    pub fn set_delay(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExtractionPort for FakeExtractor {
    async fn extract_events(&self, _artist: &str, url: &str, _text: &str) -> Result<Vec<EventCandidate>> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.malformed.contains(url) {
            return Err(ScraperError::MalformedOutput(format!("not JSON for {url}")));
        }
        Ok(self.events.get(url).cloned().unwrap_or_default())
    }

    async fn extract_artists(&self, url: &str, _text: &str) -> Result<Vec<ArtistCandidate>> {
        Ok(self.artists.get(url).cloned().unwrap_or_default())
    }
}

/// In-memory store whose event writes can be switched to fail, recording
/// every stamp request.
#[derive(Default)]
pub struct FlakyStore {
    pub inner: InMemoryStore,
    pub fail_event_writes: AtomicBool,
    pub stamped: Mutex<Vec<Uuid>>,
}

#[async_trait]
impl Store for FlakyStore {
    async fn stale_artists(&self, limit: usize, status: Option<&ArtistStatus>) -> Result<Vec<Artist>> {
        self.inner.stale_artists(limit, status).await
    }

    async fn stamp_artists(&self, ids: &[Uuid], at: DateTime<Utc>) -> Result<usize> {
        self.stamped.lock().unwrap().extend_from_slice(ids);
        self.inner.stamp_artists(ids, at).await
    }

    async fn artists_named(&self, names: &[String]) -> Result<Vec<Artist>> {
        self.inner.artists_named(names).await
    }

    async fn insert_artists(&self, artists: &[Artist]) -> Result<usize> {
        self.inner.insert_artists(artists).await
    }

    async fn existing_event_keys(&self, keys: &[EventKey]) -> Result<HashSet<EventKey>> {
        if self.fail_event_writes.load(Ordering::SeqCst) {
            return Err(ScraperError::Store("events collection unavailable".to_string()));
        }
        self.inner.existing_event_keys(keys).await
    }

    async fn insert_events(&self, events: &[PersistedEvent]) -> Result<BulkInsertReport> {
        if self.fail_event_writes.load(Ordering::SeqCst) {
            return Err(ScraperError::Store("events collection unavailable".to_string()));
        }
        self.inner.insert_events(events).await
    }
}

pub fn adapters(
    store: Arc<dyn Store>,
    search: FakeSearch,
    fetcher: FakeFetcher,
    extractor: Arc<dyn ExtractionPort>,
) -> Adapters {
    Adapters {
        store,
        search: Arc::new(search),
        fetcher: Arc::new(fetcher),
        extractor,
        interpreters: Arc::new(InterpreterRegistry::new()),
    }
}

pub fn services(
    store: Arc<dyn Store>,
    search: FakeSearch,
    fetcher: FakeFetcher,
    extractor: FakeExtractor,
) -> Services {
    Services::with_adapters(&test_config(), adapters(store, search, fetcher, Arc::new(extractor)))
}

pub async fn seed(store: &dyn Store, names: &[&str]) -> Vec<Artist> {
    let artists: Vec<Artist> = names
        .iter()
        .map(|n| Artist::new(*n).with_status(ArtistStatus::Approved))
        .collect();
    store.insert_artists(&artists).await.expect("seed artists");
    artists
}
