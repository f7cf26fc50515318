use crate::app::page_reader::PageReader;
use crate::app::ports::{ExtractionPort, SearchPort};
use crate::app::roster::ArtistRoster;
use crate::constants::render_query;
use crate::domain::{normalize_text, Artist, ArtistCandidate, EventCandidate, SearchHit};
use crate::error::Result;
use crate::pipeline::dedup::{EventDeduplicator, IngestReport};
use crate::pipeline::queue::{InMemoryTaskQueue, TaskQueue, UrlTask};
use crate::pipeline::rotation::RotationScheduler;
use chrono::{Datelike, Local, NaiveDate, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Knobs for one refresh run.
#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub search_templates: Vec<String>,
    pub results_per_query: u32,
    pub concurrency: usize,
    pub queue_idle_timeout: Duration,
}

/// What a run did, reported even when parts of it failed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub artists_processed: usize,
    pub artists_marked: usize,
    pub search_errors: usize,
    pub urls_found: usize,
    pub urls_failed: usize,
    pub candidates: usize,
    pub ingest: IngestReport,
    /// Other artists named on the pages, added for review.
    pub artists_added: usize,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn message(&self) -> String {
        format!(
            "{} artists processed, {} URLs read ({} failed), {} new events inserted",
            self.artists_processed, self.urls_found, self.urls_failed, self.ingest.inserted
        )
    }
}

struct UrlOutcome {
    seq: u64,
    candidates: Vec<EventCandidate>,
    mentioned: Vec<String>,
    failed: bool,
}

/// Stamps the selected artists even if the run is dropped before it gets
/// there. `complete` stamps in line; otherwise the drop hands the stamp to
/// the runtime.
struct PendingStamp {
    scheduler: RotationScheduler,
    ids: Vec<Uuid>,
    done: bool,
}

impl PendingStamp {
    fn new(scheduler: RotationScheduler, ids: Vec<Uuid>) -> Self {
        Self { scheduler, ids, done: false }
    }

    async fn complete(mut self) -> Result<usize> {
        let marked = self.scheduler.mark_processed(&self.ids, Utc::now()).await;
        self.done = true;
        marked
    }
}

impl Drop for PendingStamp {
    fn drop(&mut self) {
        if self.done || self.ids.is_empty() {
            return;
        }
        let ids = std::mem::take(&mut self.ids);
        let scheduler = self.scheduler.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Run cancelled, stamping {} artists in the background", ids.len());
                handle.spawn(async move {
                    if let Err(e) = scheduler.mark_processed(&ids, Utc::now()).await {
                        error!("Stamping after cancelled run failed: {}", e);
                    }
                });
            }
            Err(_) => error!("Run cancelled outside a runtime, {} artists left unstamped", ids.len()),
        }
    }
}

/// One scheduler invocation: rotate, search, extract, deduplicate, stamp.
pub struct RefreshUseCase {
    scheduler: RotationScheduler,
    dedup: EventDeduplicator,
    roster: ArtistRoster,
    search: Arc<dyn SearchPort>,
    reader: PageReader,
    extractor: Arc<dyn ExtractionPort>,
    settings: RefreshSettings,
    /// Runs in one process take turns.
    running: Mutex<()>,
}

impl RefreshUseCase {
    pub fn new(
        scheduler: RotationScheduler,
        dedup: EventDeduplicator,
        roster: ArtistRoster,
        search: Arc<dyn SearchPort>,
        reader: PageReader,
        extractor: Arc<dyn ExtractionPort>,
        settings: RefreshSettings,
    ) -> Self {
        Self { scheduler, dedup, roster, search, reader, extractor, settings, running: Mutex::new(()) }
    }

    pub async fn run(&self) -> Result<RunSummary> {
        self.run_as_of(Local::now().date_naive()).await
    }

    /// Only store failures abort the run. Every artist in the batch is
    /// stamped, including when ingestion failed or the run is dropped.
    #[instrument(skip(self), fields(batch_size = self.scheduler.batch_size()))]
    pub async fn run_as_of(&self, today: NaiveDate) -> Result<RunSummary> {
        let _running = self.running.lock().await;
        let started = Instant::now();
        counter!("duende_runs_total").increment(1);

        let batch = self.scheduler.next_batch().await?;
        if batch.is_empty() {
            info!("No artists eligible for processing");
            return Ok(RunSummary::default());
        }
        info!("Processing batch of {} artists", batch.len());
        let stamp = PendingStamp::new(self.scheduler.clone(), batch.iter().map(|a| a.id).collect());

        let mut summary = RunSummary { artists_processed: batch.len(), ..Default::default() };

        let (hits, search_errors) = self.search_batch(&batch, today.year()).await;
        summary.search_errors = search_errors;

        // Per run, so a dropped run cannot leave tasks behind for the next one.
        let queue: Arc<dyn TaskQueue<UrlTask>> = Arc::new(InMemoryTaskQueue::new());
        let mut seq = 0u64;
        for (artist, artist_hits) in batch.iter().zip(hits) {
            for hit in artist_hits {
                let task = UrlTask {
                    seq,
                    artist_id: artist.id,
                    artist_name: artist.name.clone(),
                    url: hit.url,
                    image_url: hit.image_url,
                };
                seq += 1;
                if let Err(e) = queue.enqueue(task).await {
                    warn!("Could not enqueue URL for {}: {}", artist.name, e);
                    summary.urls_failed += 1;
                }
            }
        }
        queue.close().await;
        summary.urls_found = seq as usize;

        let mut outcomes = self.drain_queue(queue).await;
        outcomes.sort_by_key(|o| o.seq);
        summary.urls_failed += outcomes.iter().filter(|o| o.failed).count();
        let mut candidates = Vec::new();
        let mut mentioned = Vec::new();
        for outcome in outcomes {
            candidates.extend(outcome.candidates);
            mentioned.extend(outcome.mentioned);
        }
        summary.candidates = candidates.len();

        let ingested = self.dedup.ingest_as_of(&candidates, today).await;
        let marked = stamp.complete().await;

        summary.ingest = ingested.map_err(|e| {
            error!("Ingestion failed: {}", e);
            e
        })?;
        summary.artists_marked = marked?;

        let names = mentioned
            .into_iter()
            .map(|name| ArtistCandidate { name: Some(name), main_role: None })
            .collect();
        summary.artists_added = self.roster.enroll(names).await?.inserted;
        summary.duration_ms = started.elapsed().as_millis() as u64;

        histogram!("duende_run_duration_seconds").record(started.elapsed().as_secs_f64());
        counter!("duende_url_errors_total").increment(summary.urls_failed as u64);
        info!("Run finished: {}", summary.message());
        Ok(summary)
    }

    /// Unique result URLs per artist, in batch order. Failed queries are
    /// logged and counted; they never fail the run.
    async fn search_batch(&self, batch: &[Artist], year: i32) -> (Vec<Vec<SearchHit>>, usize) {
        let permits = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (idx, artist) in batch.iter().enumerate() {
            let search = Arc::clone(&self.search);
            let permits = Arc::clone(&permits);
            let queries: Vec<String> = self
                .settings
                .search_templates
                .iter()
                .map(|t| render_query(t, &artist.name, year))
                .collect();
            let num = self.settings.results_per_query;
            let name = artist.name.clone();

            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                let mut seen = HashSet::new();
                let mut hits = Vec::new();
                let mut errors = 0usize;
                for query in &queries {
                    match search.search(query, num).await {
                        Ok(found) => hits.extend(found.into_iter().filter(|h| seen.insert(h.url.clone()))),
                        Err(e) => {
                            warn!("Search failed for {} ({}): {}", name, query, e);
                            errors += 1;
                        }
                    }
                }
                debug!("{} unique URLs for {}", hits.len(), name);
                (idx, hits, errors)
            });
        }

        let mut per_artist = vec![Vec::new(); batch.len()];
        let mut errors = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, hits, errs)) => {
                    per_artist[idx] = hits;
                    errors += errs;
                }
                Err(e) => {
                    error!("Search task panicked: {}", e);
                    errors += 1;
                }
            }
        }
        (per_artist, errors)
    }

    /// Run the worker pool until the queue is drained. Dropping the returned
    /// future aborts the workers.
    async fn drain_queue(&self, queue: Arc<dyn TaskQueue<UrlTask>>) -> Vec<UrlOutcome> {
        let mut workers = JoinSet::new();
        for worker in 0..self.settings.concurrency.max(1) {
            let queue = Arc::clone(&queue);
            let reader = self.reader.clone();
            let extractor = Arc::clone(&self.extractor);
            let idle = self.settings.queue_idle_timeout;

            workers.spawn(async move {
                let mut outcomes = Vec::new();
                loop {
                    let task = match queue.dequeue(idle).await {
                        Ok(Some(task)) => task,
                        Ok(None) => break,
                        Err(e) => {
                            warn!("Worker {} stopping, queue error: {}", worker, e);
                            break;
                        }
                    };
                    let seq = task.seq;
                    match process_url(&task, &reader, extractor.as_ref()).await {
                        Ok((candidates, mentioned)) => {
                            outcomes.push(UrlOutcome { seq, candidates, mentioned, failed: false })
                        }
                        Err(e) => {
                            warn!("Dropping {} for {}: {}", task.url, task.artist_name, e);
                            outcomes.push(UrlOutcome {
                                seq,
                                candidates: Vec::new(),
                                mentioned: Vec::new(),
                                failed: true,
                            });
                        }
                    }
                }
                outcomes
            });
        }

        let mut all = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(outcomes) => all.extend(outcomes),
                Err(e) => error!("URL worker panicked: {}", e),
            }
        }
        all
    }
}

/// Read one page and extract its candidates, stamped with the artist that
/// was searched for and the page they came from. Other artists the page
/// credits are returned alongside.
async fn process_url(
    task: &UrlTask,
    reader: &PageReader,
    extractor: &dyn ExtractionPort,
) -> Result<(Vec<EventCandidate>, Vec<String>)> {
    let Some(text) = reader.read(&task.url).await? else {
        return Ok((Vec::new(), Vec::new()));
    };
    let mut candidates = extractor.extract_events(&task.artist_name, &task.url, &text).await?;
    let searched = normalize_text(&task.artist_name);
    let mut mentioned = Vec::new();
    for c in &mut candidates {
        if let Some(credited) = c.artist_name.take() {
            if normalize_text(&credited) != searched {
                mentioned.push(credited);
            }
        }
        c.artist_name = Some(task.artist_name.clone());
        c.source_url = Some(task.url.clone());
        if c.image_url.is_none() {
            c.image_url = task.image_url.clone();
        }
    }
    debug!("{} candidates from {}", candidates.len(), task.url);
    counter!("duende_urls_processed_total").increment(1);
    Ok((candidates, mentioned))
}
