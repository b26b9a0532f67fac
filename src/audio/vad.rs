//! # Voice-Activity Filter
//!
//! Frames of 512 samples (32 ms at 16 kHz) are scored by a [`SpeechDetector`]
//! (the Silero model in production). Frames at or above the probability
//! threshold count as speech; short speech blips are dropped, short pauses are
//! bridged, and each kept region is padded.
//!
//! The recognizer only ever sees the kept regions, which keeps long silences
//! from producing hallucinated text. Without a working detector the filter
//! keeps everything and leaves silence handling to the recognizer.

use crate::audio::decoder::TARGET_SAMPLE_RATE;
use crate::config::VadConfig;
use std::ops::Range;
use std::sync::Arc;

/// Samples per scored frame.
pub const FRAME_SAMPLES: usize = 512;

#[derive(Debug, thiserror::Error)]
pub enum VadError {
    #[error("failed to load voice-activity model: {0}")]
    Init(String),
    #[error("voice-activity inference failed: {0}")]
    Compute(String),
    #[error("failed to download voice-activity model: {0}")]
    Download(#[from] reqwest::Error),
    #[error("voice-activity model I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Scores audio for speech.
///
/// `probabilities` returns one speech probability per [`FRAME_SAMPLES`] frame
/// of `samples`, the last frame zero-padded. Each call starts from fresh
/// detector state. Blocking; callers run it off the async executor.
pub trait SpeechDetector: Send + Sync {
    fn probabilities(&self, samples: &[f32]) -> Result<Vec<f32>, VadError>;
}

#[derive(Clone)]
pub struct VoiceActivityFilter {
    enabled: bool,
    threshold: f32,
    min_speech_frames: usize,
    min_silence_frames: usize,
    pad_samples: usize,
    detector: Option<Arc<dyn SpeechDetector>>,
}

impl VoiceActivityFilter {
    pub fn new(config: &VadConfig, detector: Option<Arc<dyn SpeechDetector>>) -> Self {
        let samples_per_ms = TARGET_SAMPLE_RATE as usize / 1000;
        let frames = |ms: u32| (ms as usize * samples_per_ms).div_ceil(FRAME_SAMPLES);
        Self {
            enabled: config.enabled,
            threshold: config.threshold,
            min_speech_frames: frames(config.min_speech_ms),
            min_silence_frames: frames(config.min_silence_ms),
            pad_samples: config.speech_pad_ms as usize * samples_per_ms,
            detector,
        }
    }

    /// Keep only the speech regions of `samples`, concatenated in order.
    ///
    /// Returns the input unchanged when the filter is disabled or the detector
    /// fails, and an empty buffer when no speech is found.
    pub fn filter(&self, samples: &[f32]) -> Vec<f32> {
        if !self.enabled {
            return samples.to_vec();
        }
        match self.speech_regions(samples) {
            Ok(regions) => regions
                .into_iter()
                .flat_map(|range| samples[range].iter().copied())
                .collect(),
            Err(e) => {
                tracing::warn!(error = %e, "Voice-activity detection failed, keeping all audio");
                samples.to_vec()
            }
        }
    }

    /// Sample ranges containing speech, padded and non-overlapping.
    pub fn speech_regions(&self, samples: &[f32]) -> Result<Vec<Range<usize>>, VadError> {
        if samples.is_empty() {
            return Ok(Vec::new());
        }
        let Some(detector) = &self.detector else {
            return Ok(vec![0..samples.len()]);
        };

        let probabilities = detector.probabilities(samples)?;

        // Runs of speech frames, as frame index ranges
        let mut runs: Vec<Range<usize>> = Vec::new();
        for (i, &p) in probabilities.iter().enumerate() {
            if p < self.threshold {
                continue;
            }
            match runs.last_mut() {
                Some(last) if i - last.end < self.min_silence_frames => last.end = i + 1,
                _ => runs.push(i..i + 1),
            }
        }

        let mut regions: Vec<Range<usize>> = Vec::new();
        for run in runs.into_iter().filter(|r| r.len() >= self.min_speech_frames) {
            let start = (run.start * FRAME_SAMPLES).saturating_sub(self.pad_samples);
            let end = (run.end * FRAME_SAMPLES + self.pad_samples).min(samples.len());
            match regions.last_mut() {
                Some(last) if start <= last.end => last.end = last.end.max(end),
                _ => regions.push(start..end),
            }
        }
        Ok(regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::PeakDetector;

    const SECOND: usize = TARGET_SAMPLE_RATE as usize;

    fn filter() -> VoiceActivityFilter {
        VoiceActivityFilter::new(&VadConfig::default(), Some(Arc::new(PeakDetector)))
    }

    fn tone(len: usize, amplitude: f32) -> Vec<f32> {
        (0..len).map(|i| amplitude * (i as f32 * 0.2).sin()).collect()
    }

    fn silence(len: usize) -> Vec<f32> {
        vec![0.0; len]
    }

    struct BrokenDetector;

    impl SpeechDetector for BrokenDetector {
        fn probabilities(&self, _samples: &[f32]) -> Result<Vec<f32>, VadError> {
            Err(VadError::Compute("session is gone".to_string()))
        }
    }

    #[test]
    fn test_silence_has_no_speech() {
        assert!(filter().filter(&silence(3 * SECOND)).is_empty());
        assert!(filter().filter(&[]).is_empty());
    }

    #[test]
    fn test_continuous_tone_is_kept() {
        let audio = tone(SECOND, 0.5);
        assert_eq!(filter().filter(&audio).len(), audio.len());
    }

    #[test]
    fn test_quiet_continuous_speech_is_kept() {
        // Around -36 dBFS with no pauses at all
        let audio = tone(3 * SECOND, 0.0224);
        assert_eq!(filter().speech_regions(&audio).unwrap(), vec![0..audio.len()]);
        assert_eq!(filter().filter(&audio).len(), audio.len());
    }

    #[test]
    fn test_short_blip_is_dropped() {
        let mut audio = silence(SECOND);
        audio.extend(tone(SECOND / 10, 0.5));
        audio.extend(silence(SECOND));
        assert!(filter().speech_regions(&audio).unwrap().is_empty());
    }

    #[test]
    fn test_short_pause_is_bridged() {
        let mut audio = tone(SECOND, 0.5);
        audio.extend(silence(SECOND));
        audio.extend(tone(SECOND, 0.5));
        let regions = filter().speech_regions(&audio).unwrap();
        assert_eq!(regions, vec![0..audio.len()]);
    }

    #[test]
    fn test_long_pause_splits_and_pads() {
        let mut audio = silence(SECOND);
        audio.extend(tone(SECOND, 0.5));
        audio.extend(silence(4 * SECOND));
        audio.extend(tone(SECOND, 0.5));

        let regions = filter().speech_regions(&audio).unwrap();
        assert_eq!(regions.len(), 2);

        let pad = 400 * SECOND / 1000;
        assert!(regions[0].start <= SECOND - pad && regions[0].start >= SECOND - pad - FRAME_SAMPLES);
        assert!(regions[0].end >= 2 * SECOND + pad - FRAME_SAMPLES);
        assert_eq!(regions[1].end, audio.len());

        let kept = filter().filter(&audio);
        assert!(kept.len() < audio.len());
    }

    #[test]
    fn test_missing_or_failing_detector_keeps_everything() {
        let audio = silence(SECOND);
        let config = VadConfig::default();

        let without = VoiceActivityFilter::new(&config, None);
        assert_eq!(without.filter(&audio).len(), SECOND);

        let broken = VoiceActivityFilter::new(&config, Some(Arc::new(BrokenDetector)));
        assert!(broken.speech_regions(&audio).is_err());
        assert_eq!(broken.filter(&audio).len(), SECOND);
    }

    #[test]
    fn test_disabled_filter_passes_everything() {
        let mut config = VadConfig {
            enabled: false,
            ..VadConfig::default()
        };
        let audio = silence(SECOND);
        let detector: Arc<dyn SpeechDetector> = Arc::new(PeakDetector);
        assert_eq!(
            VoiceActivityFilter::new(&config, Some(detector.clone())).filter(&audio).len(),
            SECOND
        );
        config.enabled = true;
        assert!(VoiceActivityFilter::new(&config, Some(detector)).filter(&audio).is_empty());
    }
}
