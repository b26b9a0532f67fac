//! # Transcription Engine
//!
//! Turns an audio file on disk into a single transcript string:
//! decode → voice-activity filter → recognition → segment joining.
//!
//! The engine is written against two small traits so the recognition backend
//! can be swapped (and faked in tests):
//! - [`SpeechRecognizer`]: a loaded model that turns 16 kHz mono samples into
//!   chronologically ordered text segments
//! - [`RecognizerLoader`]: constructs a recognizer for a given model name

use crate::audio::{decoder, AudioDecodeError, VoiceActivityFilter};
use crate::transcription::cache::SpeechModelCache;
use crate::transcription::model::SpeechModel;
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Errors produced while turning audio into text.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("audio decoding failed: {0}")]
    Decode(#[from] AudioDecodeError),
    #[error("model loading failed: {0}")]
    ModelLoad(String),
    #[error("inference failed: {0}")]
    Inference(#[from] candle_core::Error),
    #[error("model state is unavailable: {0}")]
    ModelUnavailable(String),
    #[error("transcription task failed: {0}")]
    Task(String),
}

/// A loaded speech recognition model.
///
/// `recognize` is blocking and CPU-bound; callers run it on the blocking pool.
pub trait SpeechRecognizer: Send + Sync {
    /// Recognize 16 kHz mono samples, returning decoded segments in order.
    fn recognize(&self, samples: &[f32]) -> Result<Vec<String>, TranscriptionError>;
}

/// Constructs recognizers on demand. Used by [`SpeechModelCache`] on a miss.
#[async_trait]
pub trait RecognizerLoader: Send + Sync {
    async fn load(&self, model: SpeechModel) -> Result<Arc<dyn SpeechRecognizer>, TranscriptionError>;
}

/// High-level transcription service shared by all request handlers.
pub struct Transcriber {
    models: Arc<SpeechModelCache>,
    vad: VoiceActivityFilter,
}

impl Transcriber {
    pub fn new(models: Arc<SpeechModelCache>, vad: VoiceActivityFilter) -> Self {
        Self { models, vad }
    }

    pub fn models(&self) -> &Arc<SpeechModelCache> {
        &self.models
    }

    /// Transcribe the audio file at `path` with the given model.
    ///
    /// ## Returns:
    /// - **Ok("")**: no speech was found; this is a valid result, not an error
    /// - **Ok(text)**: segments joined by single spaces, trimmed
    /// - **Err(..)**: the file could not be decoded or the model failed
    pub async fn transcribe(&self, path: &Path, model: SpeechModel) -> Result<String, TranscriptionError> {
        let start_time = Instant::now();
        let recognizer = self.models.get(model).await?;

        let path = path.to_path_buf();
        let vad = self.vad.clone();
        let segments = tokio::task::spawn_blocking(move || -> Result<Vec<String>, TranscriptionError> {
            let samples = decoder::decode_file(&path)?;
            let speech = vad.filter(&samples);
            if speech.is_empty() {
                tracing::debug!(
                    decoded_samples = samples.len(),
                    "No speech found by voice-activity filter"
                );
                return Ok(Vec::new());
            }
            recognizer.recognize(&speech)
        })
        .await
        .map_err(|e| TranscriptionError::Task(e.to_string()))??;

        let transcript = join_segments(&segments);

        tracing::info!(
            model = %model,
            segments = segments.len(),
            chars = transcript.len(),
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Transcription completed"
        );

        Ok(transcript)
    }
}

/// Join recognized segments with single spaces, dropping blank ones.
pub fn join_segments<S: AsRef<str>>(segments: &[S]) -> String {
    segments
        .iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VadConfig;
    use crate::test_support::{loud_tone, write_wav, FakeLoader, PeakDetector};

    fn vad() -> VoiceActivityFilter {
        VoiceActivityFilter::new(&VadConfig::default(), Some(Arc::new(PeakDetector)))
    }

    #[test]
    fn test_join_segments() {
        assert_eq!(join_segments(&[" Hello ", "", "world.  "]), "Hello world.");
        assert_eq!(join_segments::<&str>(&[]), "");
        assert_eq!(join_segments(&["   "]), "");
    }

    #[tokio::test]
    async fn test_silent_audio_yields_empty_transcript() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        write_wav(&path, &vec![0i16; 16_000 * 2]);

        let loader = Arc::new(FakeLoader::failing_recognizer());
        let transcriber = Transcriber::new(Arc::new(SpeechModelCache::new(loader.clone())), vad());

        let transcript = transcriber.transcribe(&path, SpeechModel::TinyEn).await.unwrap();
        assert_eq!(transcript, "");
        assert_eq!(loader.recognize_calls(), 0);
    }

    #[tokio::test]
    async fn test_speech_segments_are_joined() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        write_wav(&path, &loud_tone(16_000));

        let loader = Arc::new(FakeLoader::with_segments(&[" first part ", "second part"]));
        let transcriber = Transcriber::new(Arc::new(SpeechModelCache::new(loader.clone())), vad());

        let transcript = transcriber.transcribe(&path, SpeechModel::Base).await.unwrap();
        assert_eq!(transcript, "first part second part");
        assert_eq!(loader.recognize_calls(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.wav");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let loader = Arc::new(FakeLoader::with_segments(&["unused"]));
        let transcriber = Transcriber::new(Arc::new(SpeechModelCache::new(loader)), vad());

        let result = transcriber.transcribe(&path, SpeechModel::TinyEn).await;
        assert!(matches!(result, Err(TranscriptionError::Decode(_))));
    }
}
