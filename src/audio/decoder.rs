//! # Audio Decoding
//!
//! Decodes an uploaded recording into 16 kHz mono `f32` PCM, the input format
//! the recognizer expects.
//!
//! ## Decoders:
//! 1. **Symphonia**: pure Rust, covers WAV, MP3, AAC/M4A, FLAC, Ogg Vorbis
//! 2. **ffmpeg**: external process, used when Symphonia cannot handle the
//!    file (browser recordings are usually WebM/Opus, which Symphonia lacks)

use byteorder::{ByteOrder, LittleEndian};
use std::fs::File;
use std::path::Path;
use std::process::{Command, Stdio};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

pub const TARGET_SAMPLE_RATE: u32 = 16_000;

#[derive(Debug, thiserror::Error)]
pub enum AudioDecodeError {
    #[error("failed to read audio file: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported or corrupt audio: {0}")]
    Unsupported(String),
    #[error("resampling failed: {0}")]
    Resample(String),
}

/// Decode the file at `path`, trying Symphonia first and ffmpeg second.
pub fn decode_file(path: &Path) -> Result<Vec<f32>, AudioDecodeError> {
    match decode_with_symphonia(path) {
        Ok(samples) => Ok(samples),
        Err(AudioDecodeError::Io(e)) => Err(AudioDecodeError::Io(e)),
        Err(native_err) => {
            tracing::debug!(path = %path.display(), error = %native_err, "Native decode failed, trying ffmpeg");
            decode_with_ffmpeg(path).map_err(|ffmpeg_err| {
                AudioDecodeError::Unsupported(format!("{}; ffmpeg: {}", native_err, ffmpeg_err))
            })
        }
    }
}

fn decode_with_symphonia(path: &Path) -> Result<Vec<f32>, AudioDecodeError> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let detected = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioDecodeError::Unsupported(format!("format detection: {}", e)))?;
    let mut format = detected.format;

    let track = format
        .default_track()
        .ok_or_else(|| AudioDecodeError::Unsupported("no audio track found".to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let source_rate = codec_params
        .sample_rate
        .ok_or_else(|| AudioDecodeError::Unsupported("unknown sample rate".to_string()))?;
    let channels = codec_params.channels.map(|c| c.count()).unwrap_or(1);

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| AudioDecodeError::Unsupported(format!("codec: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(AudioDecodeError::Unsupported(format!("packet: {}", e))),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!(error = %e, "Skipping corrupt audio frame");
                continue;
            }
            Err(e) => return Err(AudioDecodeError::Unsupported(format!("decode: {}", e))),
        };

        let spec = *decoded.spec();
        let frames = decoded.frames();
        if frames == 0 {
            continue;
        }
        let mut buffer = SampleBuffer::<f32>::new(frames as u64, spec);
        buffer.copy_interleaved_ref(decoded);

        if channels > 1 {
            samples.extend(
                buffer
                    .samples()
                    .chunks(channels)
                    .map(|frame| frame.iter().sum::<f32>() / channels as f32),
            );
        } else {
            samples.extend_from_slice(buffer.samples());
        }
    }

    if source_rate != TARGET_SAMPLE_RATE && !samples.is_empty() {
        samples = resample(&samples, source_rate, TARGET_SAMPLE_RATE)?;
    }

    tracing::debug!(
        samples = samples.len(),
        duration_secs = samples.len() as f32 / TARGET_SAMPLE_RATE as f32,
        source_rate,
        channels,
        "Audio decoded to 16kHz mono PCM"
    );
    Ok(samples)
}

fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, AudioDecodeError> {
    use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let ratio = to_rate as f64 / from_rate as f64;
    let chunk_size = 1024;

    let mut resampler = SincFixedIn::<f32>::new(ratio, 2.0, params, chunk_size, 1)
        .map_err(|e| AudioDecodeError::Resample(e.to_string()))?;

    let mut output = Vec::with_capacity((samples.len() as f64 * ratio) as usize + chunk_size);
    for chunk in samples.chunks(chunk_size) {
        let mut input = chunk.to_vec();
        input.resize(chunk_size, 0.0);
        let result = resampler
            .process(&[input], None)
            .map_err(|e| AudioDecodeError::Resample(e.to_string()))?;
        if let Some(channel) = result.first() {
            output.extend_from_slice(channel);
        }
    }

    output.truncate((samples.len() as f64 * ratio) as usize);
    Ok(output)
}

/// Let an ffmpeg binary on PATH do the decoding and resampling.
fn decode_with_ffmpeg(path: &Path) -> Result<Vec<f32>, String> {
    let output = Command::new("ffmpeg")
        .args(["-nostdin", "-hide_banner", "-loglevel", "error", "-i"])
        .arg(path)
        .args(["-f", "f32le", "-ac", "1", "-ar"])
        .arg(TARGET_SAMPLE_RATE.to_string())
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| format!("could not run ffmpeg: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("ffmpeg exited with {}: {}", output.status, stderr.trim()));
    }

    Ok(pcm_from_f32le(&output.stdout))
}

fn pcm_from_f32le(bytes: &[u8]) -> Vec<f32> {
    let usable = bytes.len() - bytes.len() % 4;
    let mut samples = vec![0f32; usable / 4];
    LittleEndian::read_f32_into(&bytes[..usable], &mut samples);
    samples
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::write_wav;

    #[test]
    fn test_decode_16k_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.wav");
        write_wav(&path, &[0, 16384, -16384, 0]);

        let samples = decode_file(&path).unwrap();
        assert_eq!(samples.len(), 4);
        assert!((samples[1] - 0.5).abs() < 1e-3);
        assert!((samples[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = decode_file(Path::new("/nonexistent/voice-note.wav"));
        assert!(matches!(result, Err(AudioDecodeError::Io(_))));
    }

    #[test]
    fn test_pcm_from_f32le_ignores_trailing_bytes() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0.25f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        bytes.push(0xff);
        assert_eq!(pcm_from_f32le(&bytes), vec![0.25, -1.0]);
    }

    #[test]
    fn test_resample_length() {
        let samples = vec![0.1f32; 48_000];
        let resampled = resample(&samples, 48_000, TARGET_SAMPLE_RATE).unwrap();
        assert!(resampled.len() <= 16_000 && resampled.len() > 15_000);
    }
}
