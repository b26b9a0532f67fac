//! # Voice Note REST API Handlers
//!
//! ## Available Endpoints:
//! - `POST /api/transcribe` - audio upload → transcript + confidence note
//! - `POST /api/summarize` - text → bullet-point summary
//! - `POST /api/process` - audio upload → transcript + summary + confidence note
//!
//! Audio endpoints take multipart forms with an `audio` file field and an
//! optional `whisper_model` field. Unsupported model names silently fall back
//! to the configured default; the model actually used is echoed back.

use super::upload::{read_audio_form, read_text_field};
use crate::audio::ScratchFile;
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::transcription::{confidence, SpeechModel, TranscriptionError};
use actix_multipart::Multipart;
use actix_web::{web, Either, HttpResponse};
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};

const TRANSCRIBE_NO_SPEECH_WARNING: &str = "No speech detected in the recording. Try speaking closer to the mic.";
const PROCESS_NO_SPEECH_WARNING: &str = "No speech detected in the recording.";
const PROCESS_NO_SPEECH_SUMMARY: &str = "No transcript text was detected. Try a short direct microphone recording.";

#[derive(Debug, Serialize)]
pub struct TranscribeResponse {
    pub transcript: String,
    pub confidence_note: &'static str,
    pub whisper_model: SpeechModel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub transcript: String,
    pub summary: String,
    pub confidence_note: &'static str,
    pub whisper_model: SpeechModel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct SummarizeResponse {
    pub summary: String,
}

/// Urlencoded body for `POST /api/summarize`.
#[derive(Debug, Default, Deserialize)]
pub struct SummarizeForm {
    #[serde(default)]
    pub text: Option<String>,
}

/// Run a transcription over a stored upload, tracking it as in flight.
async fn transcribe_upload(
    state: &AppState,
    audio: &ScratchFile,
    model: SpeechModel,
) -> Result<String, TranscriptionError> {
    let _in_flight = state.begin_transcription();
    state.transcriber.transcribe(audio.path(), model).await
}

pub async fn transcribe(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    let form = read_audio_form(payload, state.config.server.max_upload_bytes).await?;
    let model = SpeechModel::resolve(form.whisper_model.as_deref(), state.config.models.whisper_model);

    let result = transcribe_upload(&state, &form.audio, model).await;
    form.audio.close();
    let transcript = result.map_err(|e| AppError::Internal(format!("Transcription failed: {}", e)))?;

    let warning = transcript.is_empty().then_some(TRANSCRIBE_NO_SPEECH_WARNING);
    Ok(HttpResponse::Ok().json(TranscribeResponse {
        confidence_note: confidence::classify(&transcript),
        transcript,
        whisper_model: model,
        warning,
    }))
}

pub async fn summarize(
    state: web::Data<AppState>,
    body: Either<web::Form<SummarizeForm>, Multipart>,
) -> AppResult<HttpResponse> {
    let text = match body {
        Either::Left(form) => form.into_inner().text,
        Either::Right(multipart) => read_text_from_multipart(multipart).await?,
    };

    let text = text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("Text is required".to_string()))?;

    let summary = state.summaries.summarize(&text).await;
    Ok(HttpResponse::Ok().json(SummarizeResponse { summary }))
}

async fn read_text_from_multipart(mut payload: Multipart) -> AppResult<Option<String>> {
    let mut text = None;
    while let Some(mut field) = payload.try_next().await? {
        if field.name() == Some("text") {
            text = Some(read_text_field(&mut field).await?);
        } else {
            while field.try_next().await?.is_some() {}
        }
    }
    Ok(text)
}

pub async fn process(state: web::Data<AppState>, payload: Multipart) -> AppResult<HttpResponse> {
    let form = read_audio_form(payload, state.config.server.max_upload_bytes).await?;
    let model = SpeechModel::resolve(form.whisper_model.as_deref(), state.config.models.whisper_model);

    let result = transcribe_upload(&state, &form.audio, model).await;
    form.audio.close();
    let transcript = result.map_err(|e| AppError::Internal(format!("Processing failed: {}", e)))?;

    if transcript.is_empty() {
        return Ok(HttpResponse::Ok().json(ProcessResponse {
            transcript,
            summary: PROCESS_NO_SPEECH_SUMMARY.to_string(),
            confidence_note: confidence::NO_SPEECH,
            whisper_model: model,
            warning: Some(PROCESS_NO_SPEECH_WARNING),
        }));
    }

    let summary = state.summaries.summarize(&transcript).await;
    Ok(HttpResponse::Ok().json(ProcessResponse {
        confidence_note: confidence::classify(&transcript),
        transcript,
        summary,
        whisper_model: model,
        warning: None,
    }))
}
