use crate::app::ports::LlmPort;
use crate::error::{Result, ScraperError};
use crate::infra::http_client::{build_client, with_timeout};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: Option<String>,
}

/// Text of the first choice in a chat-completions body.
pub fn parse_chat_response(body: &str) -> Result<String> {
    let resp: ChatResponse = serde_json::from_str(body)?;
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| ScraperError::MalformedOutput("completion has no content".to_string()))
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint in JSON mode.
pub struct ChatCompletionsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
}

impl ChatCompletionsClient {
    pub fn new(base_url: &str, api_key: &str, model: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            timeout,
        })
    }
}

#[async_trait]
impl LlmPort for ChatCompletionsClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "response_format": {"type": "json_object"},
            "temperature": 0
        });
        with_timeout("llm completion", self.timeout, async {
            let resp = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await?;
            let status = resp.status();
            if status.as_u16() == 429 {
                return Err(ScraperError::RateLimited { provider: self.model.clone() });
            }
            let text = resp.text().await?;
            if !status.is_success() {
                debug!("LLM error body: {}", text);
                return Err(ScraperError::HttpStatus { status: status.as_u16(), url });
            }
            parse_chat_response(&text)
        })
        .await
    }
}
