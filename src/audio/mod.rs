//! # Audio Processing Module
//!
//! Everything that happens to an uploaded recording before recognition.
//!
//! ## Key Components:
//! - **Scratch File**: the upload persisted to a temporary file for the decoders
//! - **Decoder**: any supported container/codec → 16 kHz mono PCM
//! - **Voice-Activity Filter**: drops silence so only speech reaches the model
//! - **Silero**: the ONNX speech detector scoring frames for the filter
//!
//! ## Recognizer Input Format:
//! - **Sample Rate**: 16kHz (16,000 Hz)
//! - **Channels**: Mono (1 channel)
//! - **Samples**: `f32` in [-1.0, 1.0]

pub mod decoder; // Symphonia decoding with ffmpeg fallback
pub mod scratch; // Temporary upload storage
pub mod silero; // Silero VAD via ONNX Runtime
pub mod vad; // Speech region selection

pub use decoder::AudioDecodeError;
pub use scratch::ScratchFile;
pub use silero::SileroVad;
pub use vad::{SpeechDetector, VoiceActivityFilter};
