/// Defaults shared by configuration and the pipeline.
/// Values can be overridden through `config.toml` or the environment.

pub const DEFAULT_DB_NAME: &str = "DuendeDB";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_WORKER_CONCURRENCY: usize = 4;
pub const DEFAULT_RESULTS_PER_QUERY: u32 = 3;
pub const DEFAULT_RATE_LIMIT_RETRIES: u32 = 1;
pub const DEFAULT_RATE_LIMIT_DELAY_SECS: u64 = 60;
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_QUEUE_IDLE_TIMEOUT_MS: u64 = 250;

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const GOOGLE_SEARCH_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) duende_scraper/0.1";

/// Cleaned page text is cut to this many characters before extraction.
pub const MAX_PAGE_TEXT_CHARS: usize = 15_000;
/// Pages with less text than this are not worth an extraction call.
pub const MIN_PAGE_TEXT_CHARS: usize = 100;

/// Google Custom Search rejects `num` above 10.
pub const MAX_RESULTS_PER_QUERY: u32 = 10;

/// Placeholders understood by search query templates.
pub const ARTIST_PLACEHOLDER: &str = "{artist}";
pub const YEAR_PLACEHOLDER: &str = "{year}";

pub fn default_search_templates() -> Vec<String> {
    vec![
        "\"{artist}\" agenda conciertos".to_string(),
        "\"{artist}\" próximos eventos".to_string(),
        "concierto flamenco \"{artist}\" {year}".to_string(),
    ]
}

pub fn default_discovery_queries() -> Vec<String> {
    vec![
        "artistas cartel festival flamenco Jerez {year}".to_string(),
        "nuevos talentos del cante jondo".to_string(),
        "programación bienal de flamenco sevilla".to_string(),
        "guitarristas flamencos gira {year}".to_string(),
        "bailaoras de flamenco revelación".to_string(),
    ]
}

/// Expand `{artist}` and `{year}` in a query template.
pub fn render_query(template: &str, artist: &str, year: i32) -> String {
    template
        .replace(ARTIST_PLACEHOLDER, artist)
        .replace(YEAR_PLACEHOLDER, &year.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_query_fills_placeholders() {
        let q = render_query("concierto flamenco \"{artist}\" {year}", "Antonio Reyes", 2026);
        assert_eq!(q, "concierto flamenco \"Antonio Reyes\" 2026");
    }

    #[test]
    fn render_query_without_placeholders_is_unchanged() {
        assert_eq!(render_query("cante jondo", "X", 2026), "cante jondo");
    }
}
