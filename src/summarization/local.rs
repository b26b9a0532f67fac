//! Ollama-compatible local inference backend.

use super::{ensure_success, non_blank, Summarizer, SummarizerError};
use crate::config::LocalLlmConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

pub struct LocalSummarizer {
    client: Client,
    base_url: String,
    model: String,
    ping_timeout: Duration,
}

impl LocalSummarizer {
    pub fn new(config: &LocalLlmConfig) -> Result<Self, SummarizerError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            ping_timeout: config.ping_timeout(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Check that the server answers its model listing endpoint.
    pub async fn ping(&self) -> Result<(), SummarizerError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(self.ping_timeout)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

fn prompt(text: &str) -> String {
    format!(
        "You are an assistant that summarizes notes. Return short bullet points.\n\nNotes:\n{}",
        text
    )
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl Summarizer for LocalSummarizer {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn summarize(&self, text: &str) -> Result<Option<String>, SummarizerError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt(text) }],
            "stream": false
        });

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await?;
        let reply: ChatResponse = ensure_success(response).await?.json().await?;

        Ok(non_blank(reply.message.and_then(|m| m.content)))
    }
}
