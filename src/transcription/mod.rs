//! # Transcription Module
//!
//! Speech-to-text using Whisper models via the Candle-rs framework.
//!
//! ## Key Components:
//! - **Model Management**: supported model names, Candle Whisper loading and decoding
//! - **Speech Model Cache**: one loaded model per name, shared by all requests
//! - **Transcription Engine**: audio file → transcript
//! - **Confidence Heuristic**: canned quality note from the transcript's word count
//!
//! ## Supported Models:
//! - **tiny.en**: ~39MB, English only, the default
//! - **base**: ~74MB, multilingual, better accuracy

pub mod cache; // Lazily populated model cache
pub mod confidence; // Word-count quality notes
pub mod engine; // Decode → VAD → recognize pipeline
pub mod mel; // Mel filter bank
pub mod model; // Whisper model loading and inference

pub use cache::SpeechModelCache;
pub use engine::{RecognizerLoader, Transcriber, TranscriptionError};
pub use model::{ComputeType, SpeechModel, WhisperLoader};
