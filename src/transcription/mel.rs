//! Slaney-style mel filter bank matching the one Whisper was trained with.
//!
//! Laid out row-major as `[n_mels][N_FFT / 2 + 1]`, which is the layout
//! `whisper::audio::pcm_to_mel` expects.

use candle_transformers::models::whisper as m;

const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

fn hz_to_mel(hz: f64) -> f64 {
    let min_log_mel = MIN_LOG_HZ / F_SP;
    if hz >= MIN_LOG_HZ {
        min_log_mel + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

fn mel_to_hz(mel: f64) -> f64 {
    let min_log_mel = MIN_LOG_HZ / F_SP;
    if mel >= min_log_mel {
        MIN_LOG_HZ * (log_step() * (mel - min_log_mel)).exp()
    } else {
        mel * F_SP
    }
}

pub fn filter_bank(n_mels: usize) -> Vec<f32> {
    let n_freqs = m::N_FFT / 2 + 1;
    let sample_rate = m::SAMPLE_RATE as f64;

    let fft_freqs: Vec<f64> = (0..n_freqs)
        .map(|i| i as f64 * sample_rate / m::N_FFT as f64)
        .collect();

    let max_mel = hz_to_mel(sample_rate / 2.0);
    let edges: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filters = vec![0f32; n_mels * n_freqs];
    for mel in 0..n_mels {
        let (lower, center, upper) = (edges[mel], edges[mel + 1], edges[mel + 2]);
        // Area normalisation
        let enorm = 2.0 / (upper - lower);
        for (k, &freq) in fft_freqs.iter().enumerate() {
            let rising = (freq - lower) / (center - lower);
            let falling = (upper - freq) / (upper - center);
            let weight = rising.min(falling).max(0.0);
            filters[mel * n_freqs + k] = (weight * enorm) as f32;
        }
    }
    filters
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_bank_shape() {
        let n_freqs = m::N_FFT / 2 + 1;
        let filters = filter_bank(80);
        assert_eq!(filters.len(), 80 * n_freqs);
        assert!(filters.iter().all(|w| *w >= 0.0 && w.is_finite()));

        // every band picks up at least one FFT bin
        for row in filters.chunks(n_freqs) {
            assert!(row.iter().sum::<f32>() > 0.0);
        }
    }

    #[test]
    fn test_mel_scale_breakpoint() {
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
        assert!((mel_to_hz(hz_to_mel(4321.0)) - 4321.0).abs() < 1e-6);
    }
}
