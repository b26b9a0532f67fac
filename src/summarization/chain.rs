//! Ordered fallback over summarization backends.

use super::fallback::fallback_summary;
use super::Summarizer;
use std::sync::Arc;
use std::time::Instant;

pub const EMPTY_TEXT_SUMMARY: &str =
    "No transcript text was detected. Record a clearer voice sample and try again.";

pub struct SummaryChain {
    candidates: Vec<Arc<dyn Summarizer>>,
}

impl SummaryChain {
    /// Candidates are tried in the order given.
    pub fn new(candidates: Vec<Arc<dyn Summarizer>>) -> Self {
        Self { candidates }
    }

    /// Summarize `text`. Never fails and never returns an empty string.
    pub async fn summarize(&self, text: &str) -> String {
        if text.trim().is_empty() {
            return EMPTY_TEXT_SUMMARY.to_string();
        }

        for candidate in &self.candidates {
            let start_time = Instant::now();
            match candidate.summarize(text).await {
                Ok(Some(summary)) if !summary.trim().is_empty() => {
                    tracing::info!(
                        backend = candidate.name(),
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Summary produced"
                    );
                    return summary;
                }
                Ok(_) => {
                    tracing::debug!(backend = candidate.name(), "Backend returned no summary");
                }
                Err(e) => {
                    tracing::warn!(
                        backend = candidate.name(),
                        error = %e,
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Summarization backend failed, trying next"
                    );
                }
            }
        }

        tracing::info!(backend = "fallback", "Using truncation fallback summary");
        fallback_summary(text)
    }
}
