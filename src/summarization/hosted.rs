//! OpenAI-compatible hosted backend.

use super::{ensure_success, non_blank, Summarizer, SummarizerError};
use crate::config::HostedLlmConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

const SYSTEM_PROMPT: &str = "Summarize notes into concise bullet points with action items.";

pub struct HostedSummarizer {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HostedSummarizer {
    pub fn new(config: &HostedLlmConfig) -> Result<Self, SummarizerError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[async_trait]
impl Summarizer for HostedSummarizer {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn summarize(&self, text: &str) -> Result<Option<String>, SummarizerError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Ok(None);
        };

        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": text }
            ]
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?;
        let completion: ChatCompletion = ensure_success(response).await?.json().await?;

        Ok(non_blank(
            completion.choices.into_iter().next().and_then(|c| c.message.content),
        ))
    }
}
