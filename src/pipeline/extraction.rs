use crate::app::ports::{ExtractionPort, LlmPort};
use crate::domain::{ArtistCandidate, EventCandidate};
use crate::error::{Result, ScraperError};
use crate::pipeline::retry::RetryPolicy;
use async_trait::async_trait;
use chrono::{Datelike, Local};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

fn events_prompt(artist_name: &str, url: &str, text: &str, year: i32) -> String {
    format!(
        "Extract upcoming flamenco events by the artist \"{artist_name}\" from the text of {url}. \
         Only events in {year} or later with a full date. \
         Reply with JSON only: {{\"events\": [{{\"name\", \"description\", \"date\": \"YYYY-MM-DD\", \
         \"time\": \"HH:MM\", \"venue\", \"city\", \"province\", \"country\"}}]}}. \
         Reply {{\"events\": []}} if there are none.\n\nText:\n{text}"
    )
}

fn artists_prompt(url: &str, text: &str) -> String {
    format!(
        "List the flamenco artists named in the text of {url}. \
         Reply with JSON only: {{\"artists\": [{{\"name\", \"mainRole\"}}]}} where mainRole is one of \
         Cantaor, Bailaor, Guitarrista, Percusionista, Grupo, Otro.\n\nText:\n{text}"
    )
}

fn correction_prompt(broken: &str, error: &str) -> String {
    format!(
        "The following is not valid JSON ({error}). Return only the corrected JSON, nothing else.\n\n{broken}"
    )
}

/// Strip a Markdown code fence if the model wrapped its reply in one.
fn strip_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a model reply into items. Accepts a bare array, an object wrapping
/// the array under `wrapper`, or a single object. Items that do not fit `T`
/// are skipped.
pub fn parse_items<T: DeserializeOwned>(reply: &str, wrapper: &str) -> Result<Vec<T>> {
    let value: Value = serde_json::from_str(strip_fence(reply))
        .map_err(|e| ScraperError::MalformedOutput(e.to_string()))?;
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove(wrapper) {
            Some(Value::Array(items)) => items,
            Some(other) => vec![other],
            None => vec![Value::Object(map)],
        },
        Value::Null => Vec::new(),
        other => {
            return Err(ScraperError::MalformedOutput(format!(
                "expected array or object, got {other}"
            )))
        }
    };
    Ok(items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect())
}

/// Extraction provider backed by a language model.
pub struct LlmExtractor {
    llm: Arc<dyn LlmPort>,
    retry: RetryPolicy,
}

impl LlmExtractor {
    pub fn new(llm: Arc<dyn LlmPort>, retry: RetryPolicy) -> Self {
        Self { llm, retry }
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.retry.run("llm completion", || self.llm.complete(prompt)).await
    }

    /// One completion, plus at most one correction round if the reply is not
    /// JSON we can read.
    async fn complete_items<T: DeserializeOwned + Send>(&self, prompt: &str, wrapper: &str) -> Result<Vec<T>> {
        let reply = self.complete(prompt).await?;
        match parse_items(&reply, wrapper) {
            Ok(items) => Ok(items),
            Err(first) => {
                warn!("Extraction reply is not valid JSON ({}), asking for a correction", first);
                let corrected = self.complete(&correction_prompt(&reply, &first.to_string())).await?;
                let items = parse_items(&corrected, wrapper)?;
                debug!("Correction produced {} items", items.len());
                Ok(items)
            }
        }
    }
}

#[async_trait]
impl ExtractionPort for LlmExtractor {
    async fn extract_events(&self, artist_name: &str, url: &str, text: &str) -> Result<Vec<EventCandidate>> {
        let year = Local::now().year();
        self.complete_items(&events_prompt(artist_name, url, text, year), "events")
            .await
    }

    async fn extract_artists(&self, url: &str, text: &str) -> Result<Vec<ArtistCandidate>> {
        self.complete_items(&artists_prompt(url, text), "artists").await
    }
}
