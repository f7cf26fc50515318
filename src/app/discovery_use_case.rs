use crate::app::page_reader::PageReader;
use crate::app::ports::{ExtractionPort, SearchPort};
use crate::app::roster::ArtistRoster;
use crate::constants::render_query;
use crate::domain::ArtistCandidate;
use crate::error::Result;
use chrono::{Datelike, Local};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, instrument, warn};

/// Results per discovery query.
const DISCOVERY_RESULTS_PER_QUERY: u32 = 5;

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoverySummary {
    pub queries: usize,
    pub pages: usize,
    pub pages_failed: usize,
    pub candidates: usize,
    pub already_known: usize,
    pub inserted: usize,
}

impl DiscoverySummary {
    pub fn message(&self) -> String {
        format!(
            "{} pages read, {} artist names found, {} new artists queued for review",
            self.pages, self.candidates, self.inserted
        )
    }
}

/// Finds artist names on discovery pages and adds the unknown ones as
/// `pending_review`, never-processed artists.
pub struct DiscoveryUseCase {
    roster: ArtistRoster,
    search: Arc<dyn SearchPort>,
    reader: PageReader,
    extractor: Arc<dyn ExtractionPort>,
    queries: Vec<String>,
    concurrency: usize,
}

impl DiscoveryUseCase {
    pub fn new(
        roster: ArtistRoster,
        search: Arc<dyn SearchPort>,
        reader: PageReader,
        extractor: Arc<dyn ExtractionPort>,
        queries: Vec<String>,
        concurrency: usize,
    ) -> Self {
        Self { roster, search, reader, extractor, queries, concurrency }
    }

    #[instrument(skip(self), fields(queries = self.queries.len()))]
    pub async fn run(&self) -> Result<DiscoverySummary> {
        let year = Local::now().year();
        let mut summary = DiscoverySummary { queries: self.queries.len(), ..Default::default() };

        let mut seen = HashSet::new();
        let mut urls = Vec::new();
        for template in &self.queries {
            let query = render_query(template, "", year);
            match self.search.search(&query, DISCOVERY_RESULTS_PER_QUERY).await {
                Ok(hits) => urls.extend(hits.into_iter().map(|h| h.url).filter(|u| seen.insert(u.clone()))),
                Err(e) => warn!("Discovery search failed for '{}': {}", query, e),
            }
        }
        summary.pages = urls.len();

        let found = self.read_pages(urls, &mut summary).await;
        summary.candidates = found.len();

        let enrolled = self.roster.enroll(found).await?;
        summary.already_known = enrolled.already_known;
        summary.inserted = enrolled.inserted;
        info!("Discovery finished: {}", summary.message());
        Ok(summary)
    }

    /// Artist candidates from every page, in URL order.
    async fn read_pages(&self, urls: Vec<String>, summary: &mut DiscoverySummary) -> Vec<ArtistCandidate> {
        let permits = Arc::new(Semaphore::new(self.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        for (idx, url) in urls.into_iter().enumerate() {
            let permits = Arc::clone(&permits);
            let reader = self.reader.clone();
            let extractor = Arc::clone(&self.extractor);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let out = match reader.read(&url).await {
                    Ok(Some(text)) => extractor.extract_artists(&url, &text).await,
                    Ok(None) => Ok(Vec::new()),
                    Err(e) => Err(e),
                };
                (idx, url, out)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, _, Ok(found))) => results.push((idx, found)),
                Ok((_, url, Err(e))) => {
                    warn!("Discovery dropped {}: {}", url, e);
                    summary.pages_failed += 1;
                }
                Err(e) => {
                    error!("Discovery task panicked: {}", e);
                    summary.pages_failed += 1;
                }
            }
        }
        results.sort_by_key(|(idx, _)| *idx);
        results.into_iter().flat_map(|(_, found)| found).collect()
    }
}
