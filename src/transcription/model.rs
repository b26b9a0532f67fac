//! # Whisper Model Management
//!
//! Names the supported recognition models and loads them with Candle-rs.
//!
//! ## Model Loading Process:
//! 1. Resolve the requested name against the supported set
//! 2. Download model files from HuggingFace if not cached locally
//! 3. Load config, tokenizer and weights on the blocking pool
//! 4. Precompute the mel filter bank, prompt tokens and suppression mask
//!
//! ## Precision:
//! - **int8**: quantized GGUF weights (only published for `tiny.en`)
//! - **float16 / float32**: safetensors weights at the given precision
//!
//! A model without int8 weights is loaded at float32 instead.

use crate::transcription::engine::{RecognizerLoader, SpeechRecognizer, TranscriptionError};
use crate::transcription::mel;
use async_trait::async_trait;
use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::whisper::{self as m, Config};
use hf_hub::{
    api::tokio::{ApiBuilder, ApiRepo},
    Repo, RepoType,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;

/// Supported speech recognition models.
///
/// Anything outside this set resolves to the configured default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeechModel {
    #[serde(rename = "tiny.en")]
    TinyEn,
    #[serde(rename = "base")]
    Base,
}

impl SpeechModel {
    pub const ALL: [SpeechModel; 2] = [SpeechModel::TinyEn, SpeechModel::Base];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpeechModel::TinyEn => "tiny.en",
            SpeechModel::Base => "base",
        }
    }

    /// Pick the model for a request: a supported requested name wins,
    /// anything else (absent, blank, unknown) falls back to `default`.
    pub fn resolve(requested: Option<&str>, default: SpeechModel) -> SpeechModel {
        match requested.map(str::parse::<SpeechModel>) {
            Some(Ok(model)) => model,
            Some(Err(_)) => {
                tracing::debug!(requested = ?requested, default = %default, "Unsupported model requested, using default");
                default
            }
            None => default,
        }
    }

    /// HuggingFace repository and revision holding the safetensors weights.
    fn safetensors_repo(&self) -> (&'static str, &'static str) {
        match self {
            SpeechModel::TinyEn => ("openai/whisper-tiny.en", "refs/pr/15"),
            SpeechModel::Base => ("openai/whisper-base", "refs/pr/22"),
        }
    }

    /// File tag of the quantized build in `lmz/candle-whisper`, if one exists.
    fn quantized_tag(&self) -> Option<&'static str> {
        match self {
            SpeechModel::TinyEn => Some("tiny-en"),
            SpeechModel::Base => None,
        }
    }
}

impl std::str::FromStr for SpeechModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "tiny.en" => Ok(SpeechModel::TinyEn),
            "base" => Ok(SpeechModel::Base),
            other => Err(format!(
                "unsupported model '{}' (expected one of: tiny.en, base)",
                other
            )),
        }
    }
}

impl std::fmt::Display for SpeechModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Numeric precision used when loading weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeType {
    Int8,
    Float16,
    Float32,
}

impl std::str::FromStr for ComputeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "int8" => Ok(ComputeType::Int8),
            "float16" => Ok(ComputeType::Float16),
            "float32" => Ok(ComputeType::Float32),
            other => Err(format!("unsupported compute type '{}'", other)),
        }
    }
}

impl std::fmt::Display for ComputeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeType::Int8 => f.write_str("int8"),
            ComputeType::Float16 => f.write_str("float16"),
            ComputeType::Float32 => f.write_str("float32"),
        }
    }
}

/// Either the full-precision or the quantized Candle Whisper model.
enum Weights {
    Full(m::model::Whisper),
    Quantized(m::quantized_model::Whisper),
}

impl Weights {
    fn encoder_forward(&mut self, x: &Tensor, flush: bool) -> candle_core::Result<Tensor> {
        match self {
            Weights::Full(w) => w.encoder.forward(x, flush),
            Weights::Quantized(w) => w.encoder.forward(x, flush),
        }
    }

    fn decoder_forward(&mut self, x: &Tensor, xa: &Tensor, flush: bool) -> candle_core::Result<Tensor> {
        match self {
            Weights::Full(w) => w.decoder.forward(x, xa, flush),
            Weights::Quantized(w) => w.decoder.forward(x, xa, flush),
        }
    }

    fn decoder_final_linear(&self, x: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Weights::Full(w) => w.decoder.final_linear(x),
            Weights::Quantized(w) => w.decoder.final_linear(x),
        }
    }

    fn reset_kv_cache(&mut self) {
        match self {
            Weights::Full(w) => w.reset_kv_cache(),
            Weights::Quantized(w) => w.reset_kv_cache(),
        }
    }
}

/// Probability of "no speech" above which a low-confidence window is dropped.
const NO_SPEECH_THRESHOLD: f64 = 0.6;
/// Average token log-probability below which a window counts as low confidence.
const LOGPROB_THRESHOLD: f64 = -1.0;
/// Token id boundary between English-only and multilingual vocabularies.
const MULTILINGUAL_VOCAB_SIZE: usize = 51865;

struct ModelFiles {
    config: PathBuf,
    tokenizer: PathBuf,
    weights: PathBuf,
}

async fn fetch(repo: &ApiRepo, repo_id: &str, file: &str) -> Result<PathBuf, TranscriptionError> {
    repo.get(file)
        .await
        .map_err(|e| TranscriptionError::ModelLoad(format!("failed to fetch {} from {}: {}", file, repo_id, e)))
}

/// Result of greedily decoding one 30 second window.
struct DecodedWindow {
    text: String,
    avg_logprob: f64,
    no_speech_prob: f64,
}

impl DecodedWindow {
    fn is_silence(&self) -> bool {
        self.no_speech_prob > NO_SPEECH_THRESHOLD && self.avg_logprob < LOGPROB_THRESHOLD
    }
}

/// A Whisper model loaded into memory and ready for inference.
///
/// Decoding mutates the model's key/value caches, so the weights sit behind
/// a mutex; concurrent requests on the same model take turns.
pub struct WhisperModel {
    name: SpeechModel,
    weights: Mutex<Weights>,
    tokenizer: Tokenizer,
    config: Config,
    device: Device,
    dtype: DType,
    mel_filters: Vec<f32>,
    prompt: Vec<u32>,
    eot_token: u32,
    no_speech_token: Option<u32>,
    suppress: Tensor,
}

impl WhisperModel {
    /// Download (if needed) and load a model.
    ///
    /// ## Parameters:
    /// - **name**: which supported model to load
    /// - **compute_type**: requested precision; int8 falls back to float32
    ///   for models without a quantized build
    /// - **language**: language hint, only used by multilingual models
    pub async fn load(
        name: SpeechModel,
        compute_type: ComputeType,
        language: Option<String>,
    ) -> Result<Self, TranscriptionError> {
        let start_time = std::time::Instant::now();
        tracing::info!(model = %name, compute_type = %compute_type, "Loading Whisper model");

        let quantized_tag = match (compute_type, name.quantized_tag()) {
            (ComputeType::Int8, Some(tag)) => Some(tag),
            (ComputeType::Int8, None) => {
                tracing::warn!(model = %name, "No int8 weights published for this model, loading float32");
                None
            }
            _ => None,
        };
        let dtype = match compute_type {
            ComputeType::Float16 => DType::F16,
            _ => DType::F32,
        };

        let files = Self::fetch_files(name, quantized_tag).await?;
        let quantized = quantized_tag.is_some();

        let model = tokio::task::spawn_blocking(move || {
            Self::from_files(name, &files, quantized, dtype, language.as_deref())
        })
        .await
        .map_err(|e| TranscriptionError::Task(e.to_string()))??;

        tracing::info!(
            model = %name,
            quantized,
            load_ms = start_time.elapsed().as_millis() as u64,
            "Whisper model loaded"
        );
        Ok(model)
    }

    async fn fetch_files(name: SpeechModel, quantized_tag: Option<&str>) -> Result<ModelFiles, TranscriptionError> {
        let mut builder = ApiBuilder::new().with_progress(false);
        if let Ok(token) = std::env::var("HF_TOKEN") {
            builder = builder.with_token(Some(token));
        }
        if let Ok(cache_dir) = std::env::var("HF_HUB_CACHE") {
            builder = builder.with_cache_dir(cache_dir.into());
        } else if let Ok(hf_home) = std::env::var("HF_HOME") {
            builder = builder.with_cache_dir(PathBuf::from(hf_home).join("hub"));
        }
        let api = builder
            .build()
            .map_err(|e| TranscriptionError::ModelLoad(format!("HuggingFace client: {}", e)))?;

        let (repo_id, revision, config, tokenizer, weights) = match quantized_tag {
            Some(tag) => (
                "lmz/candle-whisper",
                "main",
                format!("config-{}.json", tag),
                format!("tokenizer-{}.json", tag),
                format!("model-{}-q80.gguf", tag),
            ),
            None => {
                let (repo_id, revision) = name.safetensors_repo();
                (
                    repo_id,
                    revision,
                    "config.json".to_string(),
                    "tokenizer.json".to_string(),
                    "model.safetensors".to_string(),
                )
            }
        };

        let repo = api.repo(Repo::with_revision(
            repo_id.to_string(),
            RepoType::Model,
            revision.to_string(),
        ));
        Ok(ModelFiles {
            config: fetch(&repo, repo_id, &config).await?,
            tokenizer: fetch(&repo, repo_id, &tokenizer).await?,
            weights: fetch(&repo, repo_id, &weights).await?,
        })
    }

    fn from_files(
        name: SpeechModel,
        files: &ModelFiles,
        quantized: bool,
        dtype: DType,
        language: Option<&str>,
    ) -> Result<Self, TranscriptionError> {
        let load_err = |what: &str, e: &dyn std::fmt::Display| TranscriptionError::ModelLoad(format!("{}: {}", what, e));
        let device = Device::Cpu;

        let raw_config = std::fs::read_to_string(&files.config).map_err(|e| load_err("config", &e))?;
        let config: Config = serde_json::from_str(&raw_config).map_err(|e| load_err("config", &e))?;
        let tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| load_err("tokenizer", &e))?;

        let weights = if quantized {
            let vb = candle_transformers::quantized_var_builder::VarBuilder::from_gguf(&files.weights, &device)
                .map_err(|e| load_err("weights", &e))?;
            Weights::Quantized(
                m::quantized_model::Whisper::load(&vb, config.clone()).map_err(|e| load_err("weights", &e))?,
            )
        } else {
            // Safety: the weights file is owned by the HuggingFace cache and not modified while mapped
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[&files.weights], dtype, &device) }
                .map_err(|e| load_err("weights", &e))?;
            Weights::Full(m::model::Whisper::load(&vb, config.clone()).map_err(|e| load_err("weights", &e))?)
        };

        let token = |t: &str| {
            tokenizer
                .token_to_id(t)
                .ok_or_else(|| TranscriptionError::ModelLoad(format!("tokenizer has no {} token", t)))
        };
        let mut prompt = vec![token(m::SOT_TOKEN)?];
        if config.vocab_size >= MULTILINGUAL_VOCAB_SIZE {
            if let Some(lang) = language.filter(|l| !l.trim().is_empty()) {
                prompt.push(token(&format!("<|{}|>", lang.trim()))?);
            }
        }
        prompt.push(token(m::TRANSCRIBE_TOKEN)?);
        prompt.push(token(m::NO_TIMESTAMPS_TOKEN)?);
        let eot_token = token(m::EOT_TOKEN)?;
        let no_speech_token = m::NO_SPEECH_TOKENS.iter().find_map(|t| tokenizer.token_to_id(t));

        let suppress: Vec<f32> = (0..config.vocab_size as u32)
            .map(|i| {
                if config.suppress_tokens.contains(&i) {
                    f32::NEG_INFINITY
                } else {
                    0.0
                }
            })
            .collect();
        let suppress = Tensor::new(suppress.as_slice(), &device).map_err(|e| load_err("suppression mask", &e))?;

        let mel_filters = mel::filter_bank(config.num_mel_bins);

        Ok(Self {
            name,
            weights: Mutex::new(weights),
            tokenizer,
            config,
            device,
            dtype,
            mel_filters,
            prompt,
            eot_token,
            no_speech_token,
            suppress,
        })
    }

    /// Greedy decode of one mel window, without timestamps.
    fn decode_window(&self, weights: &mut Weights, mel: &Tensor) -> Result<DecodedWindow, TranscriptionError> {
        let audio_features = weights.encoder_forward(mel, true)?;
        let sample_len = self.config.max_target_positions / 2;

        let mut tokens = self.prompt.clone();
        let mut generated = Vec::new();
        let mut sum_logprob = 0f64;
        let mut no_speech_prob = 0f64;

        for i in 0..sample_len {
            let tokens_t = Tensor::new(tokens.as_slice(), &self.device)?.unsqueeze(0)?;
            let ys = weights.decoder_forward(&tokens_t, &audio_features, i == 0)?;

            if i == 0 {
                if let Some(no_speech_token) = self.no_speech_token {
                    let logits = weights
                        .decoder_final_linear(&ys.i(..1)?)?
                        .i(0)?
                        .i(0)?
                        .to_dtype(DType::F32)?;
                    no_speech_prob = candle_nn::ops::softmax(&logits, 0)?
                        .i(no_speech_token as usize)?
                        .to_scalar::<f32>()? as f64;
                }
            }

            let (_, seq_len, _) = ys.dims3()?;
            let logits = weights
                .decoder_final_linear(&ys.i((..1, seq_len - 1..))?)?
                .i(0)?
                .i(0)?
                .to_dtype(DType::F32)?
                .broadcast_add(&self.suppress)?;
            let next = logits.argmax(0)?.to_scalar::<u32>()?;
            if next == self.eot_token || tokens.len() > self.config.max_target_positions {
                break;
            }
            let logprob = candle_nn::ops::log_softmax(&logits, 0)?
                .i(next as usize)?
                .to_scalar::<f32>()? as f64;

            sum_logprob += logprob;
            tokens.push(next);
            generated.push(next);
        }
        weights.reset_kv_cache();

        let text = self
            .tokenizer
            .decode(&generated, true)
            .map_err(|e| TranscriptionError::Inference(candle_core::Error::Msg(format!("tokenizer decode: {}", e))))?;

        Ok(DecodedWindow {
            text,
            avg_logprob: sum_logprob / generated.len().max(1) as f64,
            no_speech_prob,
        })
    }
}

impl SpeechRecognizer for WhisperModel {
    /// Recognize speech in consecutive 30 second windows.
    fn recognize(&self, samples: &[f32]) -> Result<Vec<String>, TranscriptionError> {
        let mut weights = self
            .weights
            .lock()
            .map_err(|_| TranscriptionError::ModelUnavailable(format!("{} weights lock poisoned", self.name)))?;

        let n_mels = self.config.num_mel_bins;
        let mut segments = Vec::new();

        for (index, window) in samples.chunks(m::N_SAMPLES).enumerate() {
            let mut pcm = window.to_vec();
            pcm.resize(m::N_SAMPLES, 0.0);

            let mel = m::audio::pcm_to_mel(&self.config, &pcm, &self.mel_filters);
            let n_frames = mel.len() / n_mels;
            let mel = Tensor::from_vec(mel, (1, n_mels, n_frames), &self.device)?
                .narrow(2, 0, n_frames.min(m::N_FRAMES))?
                .to_dtype(self.dtype)?;

            let decoded = self.decode_window(&mut weights, &mel)?;
            if decoded.is_silence() {
                tracing::debug!(
                    window = index,
                    no_speech_prob = decoded.no_speech_prob,
                    avg_logprob = decoded.avg_logprob,
                    "Skipping window classified as silence"
                );
                continue;
            }
            segments.push(decoded.text);
        }

        Ok(segments)
    }
}

/// Loads Whisper models from the HuggingFace hub.
pub struct WhisperLoader {
    compute_type: ComputeType,
    language: Option<String>,
}

impl WhisperLoader {
    pub fn new(compute_type: ComputeType, language: Option<String>) -> Self {
        Self { compute_type, language }
    }
}

#[async_trait]
impl RecognizerLoader for WhisperLoader {
    async fn load(&self, model: SpeechModel) -> Result<Arc<dyn SpeechRecognizer>, TranscriptionError> {
        let model = WhisperModel::load(model, self.compute_type, self.language.clone()).await?;
        Ok(Arc::new(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_name_parsing() {
        assert_eq!("tiny.en".parse::<SpeechModel>().unwrap(), SpeechModel::TinyEn);
        assert_eq!("base".parse::<SpeechModel>().unwrap(), SpeechModel::Base);
        assert!("large-v3".parse::<SpeechModel>().is_err());
        assert!("TINY.EN".parse::<SpeechModel>().is_err());
        assert_eq!(SpeechModel::TinyEn.to_string(), "tiny.en");
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        assert_eq!(SpeechModel::resolve(Some("base"), SpeechModel::TinyEn), SpeechModel::Base);
        assert_eq!(SpeechModel::resolve(Some("large-v3"), SpeechModel::TinyEn), SpeechModel::TinyEn);
        assert_eq!(SpeechModel::resolve(Some(""), SpeechModel::Base), SpeechModel::Base);
        assert_eq!(SpeechModel::resolve(None, SpeechModel::TinyEn), SpeechModel::TinyEn);
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&SpeechModel::TinyEn).unwrap(), "\"tiny.en\"");
        assert_eq!(serde_json::from_str::<ComputeType>("\"float16\"").unwrap(), ComputeType::Float16);
        assert_eq!("INT8".parse::<ComputeType>().unwrap(), ComputeType::Int8);
    }

    #[test]
    fn test_only_tiny_has_quantized_build() {
        assert_eq!(SpeechModel::TinyEn.quantized_tag(), Some("tiny-en"));
        assert_eq!(SpeechModel::Base.quantized_tag(), None);
    }

    #[test]
    fn test_silence_classification() {
        let window = DecodedWindow { text: String::new(), avg_logprob: -1.5, no_speech_prob: 0.9 };
        assert!(window.is_silence());
        let window = DecodedWindow { text: "hi".into(), avg_logprob: -0.2, no_speech_prob: 0.9 };
        assert!(!window.is_silence());
    }
}
