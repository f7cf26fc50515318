use crate::app::discovery_use_case::DiscoveryUseCase;
use crate::app::page_reader::PageReader;
use crate::app::ports::{ExtractionPort, PageFetcherPort, SearchPort, Store};
use crate::app::refresh_use_case::{RefreshSettings, RefreshUseCase};
use crate::app::roster::ArtistRoster;
use crate::config::{Config, StoreLocation};
use crate::error::Result;
use crate::infra::google_search::GoogleSearch;
use crate::infra::html::InterpreterRegistry;
use crate::infra::http_client::ReqwestFetcher;
use crate::infra::llm_client::ChatCompletionsClient;
use crate::infra::memory_store::InMemoryStore;
use crate::infra::sqlite_store::SqliteStore;
use crate::pipeline::dedup::EventDeduplicator;
use crate::pipeline::extraction::LlmExtractor;
use crate::pipeline::retry::RetryPolicy;
use crate::pipeline::rotation::RotationScheduler;
use std::sync::Arc;

/// The collaborators a run talks to, behind their ports.
#[derive(Clone)]
pub struct Adapters {
    pub store: Arc<dyn Store>,
    pub search: Arc<dyn SearchPort>,
    pub fetcher: Arc<dyn PageFetcherPort>,
    pub extractor: Arc<dyn ExtractionPort>,
    pub interpreters: Arc<InterpreterRegistry>,
}

impl Adapters {
    /// Production adapters for `config`. Opening the store is the only step
    /// that touches the outside world.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store: Arc<dyn Store> = match &config.store {
            StoreLocation::Memory => Arc::new(InMemoryStore::new()),
            StoreLocation::Sqlite(dir) => Arc::new(SqliteStore::open_in_dir(dir, &config.db_name)?),
        };
        let search = GoogleSearch::new(&config.search.api_key, &config.search.cx, config.request_timeout)?;
        let llm = ChatCompletionsClient::new(
            &config.llm.base_url,
            &config.llm.api_key,
            &config.llm.model,
            config.request_timeout,
        )?;
        let retry = RetryPolicy::new(config.rate_limit_retries, config.rate_limit_delay);

        Ok(Self {
            store,
            search: Arc::new(search),
            fetcher: Arc::new(ReqwestFetcher::new(config.request_timeout)?),
            extractor: Arc::new(LlmExtractor::new(Arc::new(llm), retry)),
            interpreters: Arc::new(InterpreterRegistry::new()),
        })
    }
}

/// Use cases wired from one configuration.
pub struct Services {
    pub store: Arc<dyn Store>,
    pub refresh: RefreshUseCase,
    pub discovery: DiscoveryUseCase,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::with_adapters(config, Adapters::from_config(config)?))
    }

    pub fn with_adapters(config: &Config, adapters: Adapters) -> Self {
        let reader = PageReader::new(
            Arc::clone(&adapters.fetcher),
            Arc::clone(&adapters.interpreters),
            config.request_timeout,
        );
        let roster = ArtistRoster::new(Arc::clone(&adapters.store));
        let refresh = RefreshUseCase::new(
            RotationScheduler::new(
                Arc::clone(&adapters.store),
                config.batch_size,
                config.status_filter.clone(),
            ),
            EventDeduplicator::new(Arc::clone(&adapters.store)),
            roster.clone(),
            Arc::clone(&adapters.search),
            reader.clone(),
            Arc::clone(&adapters.extractor),
            RefreshSettings {
                search_templates: config.search_templates.clone(),
                results_per_query: config.results_per_query,
                concurrency: config.worker_concurrency,
                queue_idle_timeout: config.queue_idle_timeout,
            },
        );
        let discovery = DiscoveryUseCase::new(
            roster,
            adapters.search,
            reader,
            adapters.extractor,
            config.discovery_queries.clone(),
            config.worker_concurrency,
        );
        Self { store: adapters.store, refresh, discovery }
    }
}
