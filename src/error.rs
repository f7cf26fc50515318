use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Timed out after {secs}s: {what}")]
    Timeout { what: String, secs: u64 },

    #[error("Rate limited by {provider}")]
    RateLimited { provider: String },

    #[error("Malformed extraction output: {0}")]
    MalformedOutput(String),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("API error: {message}")]
    Api { message: String },
}

impl ScraperError {
    /// Configuration and store failures abort a run; everything else only
    /// costs the URL or artist it happened on.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ScraperError::Config(_) | ScraperError::Store(_) | ScraperError::Sqlite(_)
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ScraperError::RateLimited { .. })
    }
}

pub type Result<T> = std::result::Result<T, ScraperError>;
