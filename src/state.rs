//! # Application State Management
//!
//! Shared state handed to every HTTP request handler through `web::Data`.
//!
//! ## What lives here:
//! - **Configuration**: read-only after start-up, so a plain `Arc<AppConfig>`
//! - **Services**: the transcriber (with its model cache) and the summary chain
//! - **Metrics**: request counters updated by middleware, behind `Arc<RwLock<_>>`
//!
//! ## Arc<RwLock<T>> Pattern
//! Metrics are written by every request but read rarely, so an `RwLock` lets
//! the health endpoints read a consistent snapshot without blocking each other.
//! Locks are held only for the duration of a counter update; a poisoned lock
//! still yields its data because counters cannot be left half-written.

use crate::audio::{SileroVad, SpeechDetector, VoiceActivityFilter};
use crate::config::AppConfig;
use crate::summarization::{HostedSummarizer, LocalSummarizer, Summarizer, SummaryChain};
use crate::transcription::{RecognizerLoader, SpeechModelCache, Transcriber, WhisperLoader};
use actix_web::http::StatusCode;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

/// The main application state that's shared across all HTTP request handlers.
///
/// Cloning is cheap: every field is reference counted or `Copy`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Performance metrics (constantly being updated by requests)
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,

    pub transcriber: Arc<Transcriber>,
    pub summaries: Arc<SummaryChain>,

    /// Kept separately from the chain for readiness checks
    pub local_llm: Arc<LocalSummarizer>,
}

/// Performance metrics collected across all HTTP requests.
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    /// Total number of HTTP requests processed since server start
    pub request_count: u64,

    /// Total number of 4xx/5xx responses since server start
    pub error_count: u64,

    /// Recognition passes currently running
    pub active_transcriptions: u32,

    /// Recognition passes finished since server start, successful or not
    pub completed_transcriptions: u64,

    /// Key: route pattern (e.g., "POST /api/transcribe")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    /// Slowest single request; transcription latency is dominated by outliers
    pub max_duration_ms: u64,
    pub error_count: u64,
    /// Sum of declared request body sizes (uploads, mostly)
    pub bytes_received: u64,
}

/// What the metrics middleware observed about one finished request.
#[derive(Debug, Clone)]
pub struct RequestSample {
    /// Method and route pattern, e.g. "POST /api/transcribe"
    pub endpoint: String,
    pub status: StatusCode,
    pub duration_ms: u64,
    pub bytes_in: u64,
}

/// Marks a transcription as in flight until dropped.
pub struct TranscriptionGuard {
    metrics: Arc<RwLock<AppMetrics>>,
}

impl Drop for TranscriptionGuard {
    fn drop(&mut self) {
        let mut metrics = write(&self.metrics);
        metrics.active_transcriptions = metrics.active_transcriptions.saturating_sub(1);
        metrics.completed_transcriptions += 1;
    }
}

fn read(metrics: &RwLock<AppMetrics>) -> RwLockReadGuard<'_, AppMetrics> {
    metrics.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(metrics: &RwLock<AppMetrics>) -> RwLockWriteGuard<'_, AppMetrics> {
    metrics.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AppState {
    /// Build the production state: Whisper models from the HuggingFace hub,
    /// the Silero speech detector and the configured summarization backends.
    ///
    /// A detector that fails to load is logged and skipped; transcription then
    /// runs on the whole recording.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let loader = WhisperLoader::new(config.models.compute_type, config.models.language.clone());
        let detector = if config.vad.enabled {
            match SileroVad::load(&config.vad).await {
                Ok(vad) => Some(Arc::new(vad) as Arc<dyn SpeechDetector>),
                Err(e) => {
                    tracing::warn!(error = %e, "Voice-activity model unavailable, silence will not be trimmed");
                    None
                }
            }
        } else {
            None
        };
        Self::with_loader(config, Arc::new(loader), detector)
    }

    /// Build the state around a specific recognizer loader and speech detector.
    pub fn with_loader(
        config: AppConfig,
        loader: Arc<dyn RecognizerLoader>,
        detector: Option<Arc<dyn SpeechDetector>>,
    ) -> Result<Self> {
        let local_llm = Arc::new(
            LocalSummarizer::new(&config.local_llm).context("Failed to build local LLM client")?,
        );
        let hosted_llm =
            Arc::new(HostedSummarizer::new(&config.hosted_llm).context("Failed to build hosted LLM client")?);
        let summaries = SummaryChain::new(vec![
            local_llm.clone() as Arc<dyn Summarizer>,
            hosted_llm as Arc<dyn Summarizer>,
        ]);

        let transcriber = Transcriber::new(
            Arc::new(SpeechModelCache::new(loader)),
            VoiceActivityFilter::new(&config.vad, detector),
        );

        Ok(Self {
            config: Arc::new(config),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
            transcriber: Arc::new(transcriber),
            summaries: Arc::new(summaries),
            local_llm,
        })
    }

    /// Fold one finished request into the counters under a single lock.
    pub fn record_request(&self, sample: &RequestSample) {
        let is_error = sample.status.is_client_error() || sample.status.is_server_error();
        let mut metrics = write(&self.metrics);
        metrics.request_count += 1;
        if is_error {
            metrics.error_count += 1;
        }

        let endpoint_metric = metrics.endpoint_metrics.entry(sample.endpoint.clone()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += sample.duration_ms;
        endpoint_metric.max_duration_ms = endpoint_metric.max_duration_ms.max(sample.duration_ms);
        endpoint_metric.bytes_received += sample.bytes_in;
        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Count a transcription as in flight for as long as the guard lives.
    pub fn begin_transcription(&self) -> TranscriptionGuard {
        write(&self.metrics).active_transcriptions += 1;
        TranscriptionGuard {
            metrics: self.metrics.clone(),
        }
    }

    /// Get a snapshot of current metrics without holding the lock afterwards.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        read(&self.metrics).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Error rate as a fraction (0.0 to 1.0).
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
