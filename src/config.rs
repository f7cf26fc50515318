use crate::constants::*;
use crate::domain::ArtistStatus;
use crate::error::{Result, ScraperError};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Where artists and events live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLocation {
    Memory,
    /// Directory holding `<db_name>.sqlite3`.
    Sqlite(PathBuf),
}

impl StoreLocation {
    pub fn parse(url: &str) -> Result<Self> {
        let url = url.trim();
        if url == "memory:" || url == "memory" {
            return Ok(StoreLocation::Memory);
        }
        match url.strip_prefix("sqlite:") {
            Some(path) => {
                let path = path.trim_start_matches("//");
                if path.is_empty() {
                    Err(ScraperError::Config("STORE_URL sqlite: needs a directory".to_string()))
                } else {
                    Ok(StoreLocation::Sqlite(PathBuf::from(path)))
                }
            }
            None => Err(ScraperError::Config(format!(
                "unsupported STORE_URL '{url}', expected 'memory:' or 'sqlite:<dir>'"
            ))),
        }
    }
}

/// Optional `config.toml` overlay. Every field may be omitted.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub store_url: Option<String>,
    pub db_name: Option<String>,
    pub batch_size: Option<usize>,
    pub status_filter: Option<String>,
    pub request_timeout_secs: Option<u64>,
    pub worker_concurrency: Option<usize>,
    pub results_per_query: Option<u32>,
    pub rate_limit_retries: Option<u32>,
    pub rate_limit_delay_secs: Option<u64>,
    pub queue_idle_timeout_ms: Option<u64>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub port: Option<u16>,
    pub metrics_addr: Option<String>,
    pub search_templates: Option<Vec<String>>,
    pub discovery_queries: Option<Vec<String>>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ScraperError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Ok(toml::from_str(&content)?)
    }
}

#[derive(Debug, Clone)]
pub struct SearchCredentials {
    pub api_key: String,
    pub cx: String,
}

#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// Everything a run needs, built once at process entry.
#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreLocation,
    pub db_name: String,
    pub batch_size: usize,
    pub status_filter: Option<ArtistStatus>,
    pub request_timeout: Duration,
    pub worker_concurrency: usize,
    pub results_per_query: u32,
    pub rate_limit_retries: u32,
    pub rate_limit_delay: Duration,
    pub queue_idle_timeout: Duration,
    pub search: SearchCredentials,
    pub llm: LlmSettings,
    pub port: u16,
    /// Prometheus listener; metrics stay in-process when unset.
    pub metrics_addr: Option<SocketAddr>,
    pub search_templates: Vec<String>,
    pub discovery_queries: Vec<String>,
}

fn parse_num<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ScraperError::Config(format!("{key} must be a number, got '{raw}'")))
}

impl Config {
    /// Load `.env`, the optional TOML file (`DUENDE_CONFIG` or `./config.toml`)
    /// and the process environment, in increasing precedence.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();
        let file = match std::env::var("DUENDE_CONFIG") {
            Ok(path) => Some(FileConfig::load(Path::new(&path))?),
            Err(_) if Path::new("config.toml").exists() => Some(FileConfig::load(Path::new("config.toml"))?),
            Err(_) => None,
        };
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::from_sources(file.unwrap_or_default(), &env)
    }

    /// Merge file values with environment overrides and validate.
    pub fn from_sources(file: FileConfig, env: &HashMap<String, String>) -> Result<Self> {
        let get = |key: &str| env.get(key).map(|v| v.trim()).filter(|v| !v.is_empty());
        let require = |key: &str| {
            get(key)
                .map(str::to_string)
                .ok_or_else(|| ScraperError::Config(format!("missing required setting {key}")))
        };

        let store_url = match get("STORE_URL") {
            Some(v) => v.to_string(),
            None => file
                .store_url
                .clone()
                .ok_or_else(|| ScraperError::Config("missing required setting STORE_URL".to_string()))?,
        };

        let batch_size = match get("ARTIST_BATCH_SIZE") {
            Some(v) => parse_num("ARTIST_BATCH_SIZE", v)?,
            None => file.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        };
        let request_timeout_secs: u64 = match get("REQUEST_TIMEOUT_SECS") {
            Some(v) => parse_num("REQUEST_TIMEOUT_SECS", v)?,
            None => file.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        };
        let worker_concurrency: usize = match get("WORKER_CONCURRENCY") {
            Some(v) => parse_num("WORKER_CONCURRENCY", v)?,
            None => file.worker_concurrency.unwrap_or(DEFAULT_WORKER_CONCURRENCY),
        };
        let results_per_query: u32 = match get("RESULTS_PER_QUERY") {
            Some(v) => parse_num("RESULTS_PER_QUERY", v)?,
            None => file.results_per_query.unwrap_or(DEFAULT_RESULTS_PER_QUERY),
        };
        let rate_limit_retries = match get("RATE_LIMIT_RETRIES") {
            Some(v) => parse_num("RATE_LIMIT_RETRIES", v)?,
            None => file.rate_limit_retries.unwrap_or(DEFAULT_RATE_LIMIT_RETRIES),
        };
        let rate_limit_delay_secs: u64 = match get("RATE_LIMIT_DELAY_SECS") {
            Some(v) => parse_num("RATE_LIMIT_DELAY_SECS", v)?,
            None => file.rate_limit_delay_secs.unwrap_or(DEFAULT_RATE_LIMIT_DELAY_SECS),
        };
        let port = match get("PORT") {
            Some(v) => parse_num("PORT", v)?,
            None => file.port.unwrap_or(DEFAULT_PORT),
        };

        let metrics_addr = match get("METRICS_ADDR").map(str::to_string).or(file.metrics_addr) {
            Some(raw) => Some(raw.trim().parse::<SocketAddr>().map_err(|e| {
                ScraperError::Config(format!("METRICS_ADDR must be host:port, got '{raw}': {e}"))
            })?),
            None => None,
        };

        if request_timeout_secs == 0 {
            return Err(ScraperError::Config("REQUEST_TIMEOUT_SECS must be positive".to_string()));
        }

        Ok(Self {
            store: StoreLocation::parse(&store_url)?,
            db_name: get("DB_NAME")
                .map(str::to_string)
                .or(file.db_name)
                .unwrap_or_else(|| DEFAULT_DB_NAME.to_string()),
            batch_size,
            status_filter: get("ARTIST_STATUS")
                .map(str::to_string)
                .or(file.status_filter)
                .map(ArtistStatus::from),
            request_timeout: Duration::from_secs(request_timeout_secs),
            worker_concurrency: worker_concurrency.max(1),
            results_per_query: results_per_query.clamp(1, MAX_RESULTS_PER_QUERY),
            rate_limit_retries,
            rate_limit_delay: Duration::from_secs(rate_limit_delay_secs),
            queue_idle_timeout: Duration::from_millis(
                file.queue_idle_timeout_ms.unwrap_or(DEFAULT_QUEUE_IDLE_TIMEOUT_MS),
            ),
            search: SearchCredentials {
                api_key: require("GOOGLE_API_KEY")?,
                cx: require("GOOGLE_CX")?,
            },
            llm: LlmSettings {
                api_key: require("LLM_API_KEY")?,
                base_url: get("LLM_BASE_URL")
                    .map(str::to_string)
                    .or(file.llm_base_url)
                    .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
                model: get("LLM_MODEL")
                    .map(str::to_string)
                    .or(file.llm_model)
                    .unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            },
            port,
            metrics_addr,
            search_templates: file
                .search_templates
                .filter(|t| !t.is_empty())
                .unwrap_or_else(default_search_templates),
            discovery_queries: file
                .discovery_queries
                .filter(|q| !q.is_empty())
                .unwrap_or_else(default_discovery_queries),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn minimal() -> HashMap<String, String> {
        env(&[
            ("STORE_URL", "sqlite:/tmp/duende"),
            ("GOOGLE_API_KEY", "g-key"),
            ("GOOGLE_CX", "g-cx"),
            ("LLM_API_KEY", "sk-test"),
        ])
    }

    #[test]
    fn defaults_fill_everything_optional() {
        let cfg = Config::from_sources(FileConfig::default(), &minimal()).unwrap();
        assert_eq!(cfg.store, StoreLocation::Sqlite(PathBuf::from("/tmp/duende")));
        assert_eq!(cfg.db_name, DEFAULT_DB_NAME);
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.request_timeout, Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS));
        assert_eq!(cfg.status_filter, None);
        assert_eq!(cfg.llm.model, DEFAULT_LLM_MODEL);
        assert_eq!(cfg.search_templates, default_search_templates());
    }

    #[test]
    fn missing_credentials_are_config_errors() {
        let mut vars = minimal();
        vars.remove("LLM_API_KEY");
        let err = Config::from_sources(FileConfig::default(), &vars).unwrap_err();
        assert!(matches!(err, ScraperError::Config(ref m) if m.contains("LLM_API_KEY")));
        assert!(err.is_fatal());

        let mut vars = minimal();
        vars.insert("GOOGLE_CX".to_string(), "   ".to_string());
        assert!(Config::from_sources(FileConfig::default(), &vars).is_err());
    }

    #[test]
    fn missing_store_url_is_a_config_error() {
        let mut vars = minimal();
        vars.remove("STORE_URL");
        let err = Config::from_sources(FileConfig::default(), &vars).unwrap_err();
        assert!(matches!(err, ScraperError::Config(_)));
    }

    #[test]
    fn environment_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            batch_size = 25
            db_name = "FromFile"
            status_filter = "approved"
            search_templates = ["{artist} gira {year}"]
            "#,
        )
        .unwrap();
        let mut vars = minimal();
        vars.insert("ARTIST_BATCH_SIZE".to_string(), "5".to_string());
        let cfg = Config::from_sources(file, &vars).unwrap();
        assert_eq!(cfg.batch_size, 5);
        assert_eq!(cfg.db_name, "FromFile");
        assert_eq!(cfg.status_filter, Some(ArtistStatus::Approved));
        assert_eq!(cfg.search_templates, vec!["{artist} gira {year}".to_string()]);
    }

    #[test]
    fn metrics_address_comes_from_env_or_file() {
        let cfg = Config::from_sources(FileConfig::default(), &minimal()).unwrap();
        assert_eq!(cfg.metrics_addr, None);

        let file = FileConfig { metrics_addr: Some("127.0.0.1:9000".to_string()), ..Default::default() };
        let cfg = Config::from_sources(file, &minimal()).unwrap();
        assert_eq!(cfg.metrics_addr, Some("127.0.0.1:9000".parse().unwrap()));

        let mut vars = minimal();
        vars.insert("METRICS_ADDR".to_string(), "0.0.0.0:9100".to_string());
        let cfg = Config::from_sources(FileConfig::default(), &vars).unwrap();
        assert_eq!(cfg.metrics_addr, Some("0.0.0.0:9100".parse().unwrap()));

        vars.insert("METRICS_ADDR".to_string(), "not-an-address".to_string());
        let err = Config::from_sources(FileConfig::default(), &vars).unwrap_err();
        assert!(matches!(err, ScraperError::Config(ref m) if m.contains("METRICS_ADDR")));
    }

    #[test]
    fn bad_numbers_are_rejected() {
        let mut vars = minimal();
        vars.insert("ARTIST_BATCH_SIZE".to_string(), "ten".to_string());
        assert!(Config::from_sources(FileConfig::default(), &vars).is_err());
    }

    #[test]
    fn store_urls() {
        assert_eq!(StoreLocation::parse("memory:").unwrap(), StoreLocation::Memory);
        assert_eq!(
            StoreLocation::parse("sqlite://data").unwrap(),
            StoreLocation::Sqlite(PathBuf::from("data"))
        );
        assert!(StoreLocation::parse("mongodb://localhost").is_err());
        assert!(StoreLocation::parse("sqlite:").is_err());
    }
}
