//! # Configuration Management
//!
//! This module handles loading and managing application configuration from multiple sources:
//! - Default values (built into the code)
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix, `__` between nested keys)
//! - The well-known variables the voice notes tooling has always used
//!   (`WHISPER_MODEL`, `OLLAMA_URL`, `OPENAI_API_KEY`, ...)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Well-known variables (WHISPER_MODEL, OLLAMA_URL, HOST, PORT, ...)
//! 2. Environment variables (APP_SERVER__HOST, APP_LOCAL_LLM__MODEL, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! Every setting has a default, so the server starts with zero configuration
//! against a local Ollama instance.

use crate::transcription::{ComputeType, SpeechModel};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration that contains all settings.
///
/// Settings are grouped by the component that consumes them so each component
/// can be handed its own section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub models: ModelsConfig,
    pub vad: VadConfig,
    pub local_llm: LocalLlmConfig,
    pub hosted_llm: HostedLlmConfig,
    pub frontend: FrontendConfig,
}

/// Server-specific configuration settings.
///
/// ## Fields:
/// - `host`: IP address or hostname to bind the server to
/// - `port`: TCP port number to listen on
/// - `max_upload_bytes`: largest accepted audio upload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
}

/// Speech recognition model settings.
///
/// ## Fields:
/// - `whisper_model`: default recognition model, used whenever a request names
///   a model outside the supported set
/// - `compute_type`: numeric precision the weights are loaded with
/// - `language`: language hint for multilingual models (ignored by `.en` models)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    pub whisper_model: SpeechModel,
    pub compute_type: ComputeType,
    pub language: Option<String>,
}

/// Voice-activity filter tuning.
///
/// Defaults match the usual Silero settings for dictation: a 0.5 speech
/// probability, 250 ms minimum speech, 2 s minimum silence, 400 ms padding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    pub enabled: bool,
    /// Speech probability at or above which a frame counts as speech
    pub threshold: f32,
    /// Speech runs shorter than this are discarded
    pub min_speech_ms: u32,
    /// Silences shorter than this are bridged into the surrounding speech
    pub min_silence_ms: u32,
    /// Audio kept on each side of a speech region
    pub speech_pad_ms: u32,
    /// Silero ONNX model file
    pub model_path: PathBuf,
    /// Where to fetch the model from when `model_path` is missing
    pub model_url: Option<String>,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 0.5,
            min_speech_ms: 250,
            min_silence_ms: 2000,
            speech_pad_ms: 400,
            model_path: PathBuf::from("models/silero_vad.onnx"),
            model_url: Some(
                "https://github.com/snakers4/silero-vad/raw/master/src/silero_vad/data/silero_vad.onnx".to_string(),
            ),
        }
    }
}

/// Local inference backend (Ollama-compatible).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalLlmConfig {
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub ping_timeout_secs: u64,
}

/// Hosted backend (OpenAI-compatible). Skipped entirely without an `api_key`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostedLlmConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrontendConfig {
    pub dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                max_upload_bytes: 50 * 1024 * 1024,
            },
            models: ModelsConfig {
                whisper_model: SpeechModel::TinyEn,
                compute_type: ComputeType::Int8,
                language: Some("en".to_string()),
            },
            vad: VadConfig::default(),
            local_llm: LocalLlmConfig {
                base_url: "http://localhost:11434".to_string(),
                model: "llama3.2:3b".to_string(),
                timeout_secs: 60,
                ping_timeout_secs: 5,
            },
            hosted_llm: HostedLlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                api_key: None,
                timeout_secs: 600,
            },
            frontend: FrontendConfig {
                dir: PathBuf::from("frontend"),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_VAD__ENABLED=false`: Disable the voice-activity filter
    /// - `WHISPER_MODEL=base`: Pick the default recognition model
    /// - `OPENAI_API_KEY=sk-...`: Enable the hosted summarization backend
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        for (key, path) in [
            ("HOST", "server.host"),
            ("PORT", "server.port"),
            ("WHISPER_COMPUTE_TYPE", "models.compute_type"),
            ("OLLAMA_URL", "local_llm.base_url"),
            ("OLLAMA_MODEL", "local_llm.model"),
            ("OPENAI_MODEL", "hosted_llm.model"),
            ("OPENAI_BASE_URL", "hosted_llm.base_url"),
        ] {
            if let Ok(value) = env::var(key) {
                settings = settings.set_override(path, value)?;
            }
        }

        // Unsupported names are ignored rather than failing start-up
        if let Ok(model) = env::var("WHISPER_MODEL") {
            match model.parse::<SpeechModel>() {
                Ok(model) => settings = settings.set_override("models.whisper_model", model.to_string())?,
                Err(e) => tracing::warn!(requested = %model, "Ignoring WHISPER_MODEL: {}", e),
            }
        }

        if let Ok(key) = env::var("OPENAI_API_KEY") {
            if !key.trim().is_empty() {
                settings = settings.set_override("hosted_llm.api_key", key)?;
            }
        }

        let mut config: AppConfig = settings.build()?.try_deserialize()?;
        config.hosted_llm.api_key = config.hosted_llm.api_key.filter(|k| !k.trim().is_empty());
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if self.local_llm.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Local LLM base URL cannot be empty"));
        }

        if self.hosted_llm.base_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Hosted LLM base URL cannot be empty"));
        }

        if !(0.0..=1.0).contains(&self.vad.threshold) {
            return Err(anyhow::anyhow!("VAD threshold must be between 0.0 and 1.0"));
        }

        if self.local_llm.timeout_secs == 0
            || self.local_llm.ping_timeout_secs == 0
            || self.hosted_llm.timeout_secs == 0
        {
            return Err(anyhow::anyhow!("Backend timeouts must be greater than 0"));
        }

        Ok(())
    }
}

impl LocalLlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

impl HostedLlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
