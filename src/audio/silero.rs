//! Silero voice-activity model (v5/v6 ONNX export) run through ONNX Runtime.
//!
//! Model I/O:
//! - inputs: `input` float[1, 64 + 512] (context + frame), `state` float[2, 1, 128], `sr` int64[1]
//! - outputs: `output` float[1, 1] speech probability, `stateN` float[2, 1, 128]

use super::vad::{SpeechDetector, VadError, FRAME_SAMPLES};
use crate::audio::decoder::TARGET_SAMPLE_RATE;
use crate::config::VadConfig;
use ndarray::{Array1, Array2, ArrayD};
use ort::session::Session;
use ort::value::Value;
use std::mem::take;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Trailing samples of the previous frame fed in front of each frame.
const CONTEXT_SIZE: usize = 64;
const STATE_SHAPE: [usize; 3] = [2, 1, 128];

pub struct SileroVad {
    session: Mutex<Session>,
}

fn init_err(e: impl std::fmt::Display) -> VadError {
    VadError::Init(e.to_string())
}

fn compute_err(e: impl std::fmt::Display) -> VadError {
    VadError::Compute(e.to_string())
}

impl SileroVad {
    pub fn from_file(path: &Path) -> Result<Self, VadError> {
        let session = Session::builder()
            .map_err(init_err)?
            .commit_from_file(path)
            .map_err(init_err)?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Load the model from `model_path`, downloading it from `model_url` first
    /// if the file is missing.
    pub async fn load(config: &VadConfig) -> Result<Self, VadError> {
        let path = config.model_path.clone();
        if !path.is_file() {
            let url = config.model_url.as_deref().ok_or_else(|| {
                VadError::Init(format!("no model at {} and no download URL configured", path.display()))
            })?;
            download(url, &path).await?;
        }

        let model = tokio::task::spawn_blocking(move || Self::from_file(&path))
            .await
            .map_err(init_err)??;
        tracing::info!(path = %config.model_path.display(), "Voice-activity model loaded");
        Ok(model)
    }
}

async fn download(url: &str, path: &Path) -> Result<(), VadError> {
    tracing::info!(url, path = %path.display(), "Downloading voice-activity model");
    let bytes = reqwest::get(url).await?.error_for_status()?.bytes().await?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    // Write beside the target first so an interrupted download never looks complete
    let partial = PathBuf::from(format!("{}.part", path.display()));
    tokio::fs::write(&partial, &bytes).await?;
    tokio::fs::rename(&partial, path).await?;
    Ok(())
}

impl SpeechDetector for SileroVad {
    fn probabilities(&self, samples: &[f32]) -> Result<Vec<f32>, VadError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| VadError::Compute("session lock poisoned".to_string()))?;

        let mut state = ArrayD::<f32>::zeros(STATE_SHAPE.as_slice());
        let mut context = vec![0.0f32; CONTEXT_SIZE];
        let sample_rate = Array1::from_vec(vec![TARGET_SAMPLE_RATE as i64]);
        let mut probabilities = Vec::with_capacity(samples.len().div_ceil(FRAME_SAMPLES));

        for chunk in samples.chunks(FRAME_SAMPLES) {
            let mut input = Vec::with_capacity(CONTEXT_SIZE + FRAME_SAMPLES);
            input.extend_from_slice(&context);
            input.extend_from_slice(chunk);
            input.resize(CONTEXT_SIZE + FRAME_SAMPLES, 0.0);
            context = input[input.len() - CONTEXT_SIZE..].to_vec();

            let frame = Array2::<f32>::from_shape_vec([1, input.len()], input).map_err(compute_err)?;
            let frame_value = Value::from_array(frame).map_err(compute_err)?;
            let state_value = Value::from_array(take(&mut state)).map_err(compute_err)?;
            let sr_value = Value::from_array(sample_rate.clone()).map_err(compute_err)?;

            let outputs = session
                .run([
                    (&frame_value).into(),
                    (&state_value).into(),
                    (&sr_value).into(),
                ])
                .map_err(compute_err)?;

            let (shape, state_data) = outputs["stateN"]
                .try_extract_tensor::<f32>()
                .map_err(compute_err)?;
            let dims: Vec<usize> = shape.as_ref().iter().map(|&d| d as usize).collect();
            state = ArrayD::from_shape_vec(dims.as_slice(), state_data.to_vec()).map_err(compute_err)?;

            let probability = outputs["output"]
                .try_extract_tensor::<f32>()
                .map_err(compute_err)?
                .1
                .first()
                .copied()
                .ok_or_else(|| VadError::Compute("empty output tensor".to_string()))?;
            probabilities.push(probability);
        }

        Ok(probabilities)
    }
}
