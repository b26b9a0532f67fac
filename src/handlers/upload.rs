//! Multipart parsing for audio uploads.

use crate::audio::ScratchFile;
use crate::error::{AppError, AppResult};
use actix_multipart::{Field, Multipart};
use futures_util::TryStreamExt;

pub const MAX_TEXT_FIELD_BYTES: usize = 1024 * 1024;

/// The fields of an audio upload form.
pub struct AudioForm {
    pub audio: ScratchFile,
    pub whisper_model: Option<String>,
}

/// Stream an upload into a scratch file.
///
/// Expects an `audio` file field and an optional `whisper_model` text field;
/// anything else is drained and ignored. The scratch file is deleted if the
/// upload fails part-way.
pub async fn read_audio_form(mut payload: Multipart, max_upload_bytes: usize) -> AppResult<AudioForm> {
    let mut audio: Option<ScratchFile> = None;
    let mut whisper_model: Option<String> = None;

    while let Some(mut field) = payload.try_next().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("audio") => {
                let filename = field
                    .content_disposition()
                    .and_then(|cd| cd.get_filename())
                    .map(str::to_string);
                let mut scratch = ScratchFile::create(filename.as_deref())?;

                while let Some(chunk) = field.try_next().await? {
                    if scratch.bytes_written() + chunk.len() > max_upload_bytes {
                        return Err(AppError::PayloadTooLarge(format!(
                            "Audio upload exceeds {} bytes",
                            max_upload_bytes
                        )));
                    }
                    scratch.write_chunk(&chunk).await?;
                }
                scratch.finish().await?;

                tracing::debug!(
                    filename = filename.as_deref().unwrap_or("<none>"),
                    bytes = scratch.bytes_written(),
                    "Audio upload stored"
                );
                audio = Some(scratch);
            }
            Some("whisper_model") => {
                whisper_model = Some(read_text_field(&mut field).await?);
            }
            _ => while field.try_next().await?.is_some() {},
        }
    }

    let audio = audio.ok_or_else(|| AppError::BadRequest("Audio file is required".to_string()))?;
    Ok(AudioForm { audio, whisper_model })
}

/// Read a small text field, rejecting oversized or non UTF-8 values.
pub async fn read_text_field(field: &mut Field) -> AppResult<String> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
        if bytes.len() + chunk.len() > MAX_TEXT_FIELD_BYTES {
            return Err(AppError::PayloadTooLarge("Form field is too large".to_string()));
        }
        bytes.extend_from_slice(&chunk);
    }
    String::from_utf8(bytes).map_err(|_| AppError::BadRequest("Form field is not valid UTF-8".to_string()))
}
