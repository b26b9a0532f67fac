//! # Summarization Module
//!
//! Turns a transcript into short bullet-point notes using whichever backend
//! is available, in priority order:
//! 1. **Local**: an Ollama-compatible inference server
//! 2. **Hosted**: an OpenAI-compatible API, only when a credential is configured
//! 3. **Fallback**: deterministic truncation to the first 40 words
//!
//! Backend failures never reach the caller; they are logged and the next
//! candidate is tried.

pub mod chain; // Ordered fallback over summarizers
pub mod fallback; // Deterministic truncation
pub mod hosted; // OpenAI-compatible chat completions
pub mod local; // Ollama chat API

use async_trait::async_trait;

pub use chain::SummaryChain;
pub use hosted::HostedSummarizer;
pub use local::LocalSummarizer;

/// Why a summarization backend could not produce an answer.
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
}

/// One candidate in the summarization chain.
///
/// `Ok(None)` means the backend declined: not configured, or it answered
/// with nothing usable. `Err` means the attempt itself failed.
#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn summarize(&self, text: &str) -> Result<Option<String>, SummarizerError>;
}

/// Shared response check for backends: non-2xx becomes a `Status` error.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SummarizerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SummarizerError::Status { status, body })
}

/// The content as returned, or `None` when it is only whitespace.
fn non_blank(content: Option<String>) -> Option<String> {
    content.filter(|c| !c.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_blank_keeps_content_verbatim() {
        assert_eq!(non_blank(Some("  - a\n- b\n".to_string())).as_deref(), Some("  - a\n- b\n"));
        assert_eq!(non_blank(Some(" \n\t".to_string())), None);
        assert_eq!(non_blank(None), None);
    }
}
