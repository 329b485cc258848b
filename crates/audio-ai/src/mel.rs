//! Log-mel spectrogram front end for the token-stream recognizer.

use candle_transformers::models::whisper::{self as m, audio::pcm_to_mel, Config};
use voxsub_common::error::{VoxsubError, VoxsubResult};

pub const N_FFT: usize = m::N_FFT;
pub const HOP_LENGTH: usize = 160;
pub const N_MEL: usize = 80;
/// 30 seconds at 16 kHz.
pub const CHUNK_SAMPLES: usize = m::N_SAMPLES;
pub const CHUNK_SECS: f64 = 30.0;
pub const N_FRAMES: usize = CHUNK_SAMPLES / HOP_LENGTH;

/// Row-major mel filterbank, `n_mel` rows of `n_fft` weights.
#[derive(Debug, Clone, PartialEq)]
pub struct MelFilters {
    pub n_mel: usize,
    pub n_fft: usize,
    data: Vec<f32>,
}

impl MelFilters {
    pub fn new(n_mel: usize, n_fft: usize, data: Vec<f32>) -> VoxsubResult<Self> {
        if data.len() != n_mel * n_fft {
            return Err(VoxsubError::engine_init(format!(
                "Mel filterbank has {} weights, expected {n_mel} x {n_fft}",
                data.len()
            )));
        }
        Ok(Self { n_mel, n_fft, data })
    }
}

/// Mel-major spectrogram: `data[mel * n_frames + frame]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MelSpectrogram {
    pub n_mel: usize,
    pub n_frames: usize,
    pub data: Vec<f32>,
}

impl MelSpectrogram {
    pub fn get(&self, mel: usize, frame: usize) -> f32 {
        self.data[mel * self.n_frames + frame]
    }
}

/// Dimensions of the tiny multilingual model. Only `num_mel_bins` shapes
/// the spectrogram.
fn front_end_config(n_mel: usize) -> VoxsubResult<Config> {
    serde_json::from_value(serde_json::json!({
        "num_mel_bins": n_mel,
        "max_source_positions": 1500,
        "d_model": 384,
        "encoder_attention_heads": 6,
        "encoder_layers": 4,
        "vocab_size": 51865,
        "max_target_positions": 448,
        "decoder_attention_heads": 6,
        "decoder_layers": 4,
        "suppress_tokens": []
    }))
    .map_err(|e| VoxsubError::engine_init(format!("Whisper front end config: {e}")))
}

/// Compute the 80 x 3000 log-mel input for one 30 s window.
///
/// Input is zero-padded to 30 s; longer input must be split by the
/// caller. Values are clamped to 8 below the maximum and mapped through
/// `(x + 4) / 4`.
pub fn log_mel_spectrogram(samples: &[f32], filters: &MelFilters) -> VoxsubResult<MelSpectrogram> {
    let n_bins = 1 + N_FFT / 2;
    if filters.n_mel != N_MEL || filters.n_fft != n_bins {
        return Err(VoxsubError::engine_init(format!(
            "Mel filterbank {} x {} does not fit {N_MEL} x {n_bins}",
            filters.n_mel, filters.n_fft
        )));
    }
    if samples.len() > CHUNK_SAMPLES {
        return Err(VoxsubError::recognition(format!(
            "{} samples do not fit one {CHUNK_SECS} s window",
            samples.len()
        )));
    }

    let mut padded = samples.to_vec();
    padded.resize(CHUNK_SAMPLES, 0.0);

    let config = front_end_config(filters.n_mel)?;
    let mel = pcm_to_mel(&config, &padded, &filters.data);

    // The front end appends padding frames; keep the first 30 s.
    let n_len = mel.len() / N_MEL;
    if n_len < N_FRAMES {
        return Err(VoxsubError::recognition(format!(
            "Log-mel output has {n_len} frames, expected at least {N_FRAMES}"
        )));
    }
    let data = mel
        .chunks_exact(n_len)
        .flat_map(|row| row[..N_FRAMES].iter().copied())
        .collect();

    Ok(MelSpectrogram {
        n_mel: N_MEL,
        n_frames: N_FRAMES,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diagonal_filters() -> MelFilters {
        let n_bins = 1 + N_FFT / 2;
        let mut data = vec![0.0; N_MEL * n_bins];
        for mel in 0..N_MEL {
            data[mel * n_bins + mel * 2] = 1.0;
        }
        MelFilters::new(N_MEL, n_bins, data).unwrap()
    }

    fn tone(samples: usize) -> Vec<f32> {
        (0..samples)
            .map(|i| 0.3 * (i as f32 * 1000.0 * std::f32::consts::TAU / 16_000.0).sin())
            .collect()
    }

    #[test]
    fn test_spectrogram_shape_and_padding() {
        let mel = log_mel_spectrogram(&tone(16_000), &diagonal_filters()).unwrap();

        assert_eq!(mel.n_mel, N_MEL);
        assert_eq!(mel.n_frames, N_FRAMES);
        assert_eq!(mel.data.len(), N_MEL * N_FRAMES);

        let max = mel.data.iter().copied().fold(f32::MIN, f32::max);
        let min = mel.data.iter().copied().fold(f32::MAX, f32::min);
        assert!(max - min <= 2.0 + 1e-5);
        assert!(max > min);

        // 1 s of audio is 100 frames; everything after is clamped padding.
        assert_eq!(mel.get(0, 2999), min);
        assert_eq!(mel.get(N_MEL - 1, 150), min);
    }

    #[test]
    fn test_rejects_mismatched_filters() {
        let filters = MelFilters::new(40, 201, vec![0.0; 40 * 201]).unwrap();
        assert!(log_mel_spectrogram(&[0.0; 160], &filters).is_err());
        assert!(MelFilters::new(80, 201, vec![0.0; 10]).is_err());
    }

    #[test]
    fn test_rejects_input_longer_than_one_window() {
        let err = log_mel_spectrogram(&vec![0.0; CHUNK_SAMPLES + 1], &diagonal_filters()).unwrap_err();
        assert!(matches!(err, VoxsubError::Recognition { .. }));
    }

    #[test]
    fn test_silence_is_uniform() {
        let mel = log_mel_spectrogram(&[], &diagonal_filters()).unwrap();
        assert!(mel.data.iter().all(|&v| v == mel.data[0]));
    }

    #[test]
    fn test_late_speech_is_visible() {
        let mut samples = vec![0.0; 16_000 * 20];
        samples.extend(tone(16_000 * 5));
        let mel = log_mel_spectrogram(&samples, &diagonal_filters()).unwrap();
        let early = mel.get(12, 100);
        let late = mel.get(12, 2200);
        assert!(late > early);
    }
}
