//! PCM normalization: mono float32 at 16 kHz.

use crate::format::{AudioChunk, MediaInfo, PcmEncoding};

/// Sample rate expected by the VAD and recognizers.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Mono float32 samples at [`TARGET_SAMPLE_RATE`], each in [-1.0, 1.0].
pub type NormalizedSamples = Vec<f32>;

/// Normalize one decoded chunk.
pub fn normalize(chunk: &AudioChunk) -> NormalizedSamples {
    normalize_bytes(&chunk.bytes, &chunk.info)
}

/// Normalize raw interleaved PCM described by `info`.
///
/// Channels are averaged per frame, integer samples are rescaled to
/// [-1, 1), and the result is linearly resampled to 16 kHz. Float input
/// is not rescaled, only mixed and resampled.
pub fn normalize_bytes(bytes: &[u8], info: &MediaInfo) -> NormalizedSamples {
    let interleaved = decode_samples(bytes, info.encoding);
    let mono = downmix(&interleaved, usize::from(info.channel_count));
    let mut out = linear_resample(&mono, info.sample_rate, TARGET_SAMPLE_RATE);
    for sample in &mut out {
        *sample = if sample.is_finite() {
            sample.clamp(-1.0, 1.0)
        } else {
            0.0
        };
    }
    out
}

/// Decode little-endian PCM into floats; trailing partial samples are dropped.
fn decode_samples(bytes: &[u8], encoding: PcmEncoding) -> Vec<f32> {
    match encoding {
        PcmEncoding::U8 => bytes
            .iter()
            .map(|&b| (f32::from(b) - 128.0) / 128.0)
            .collect(),
        PcmEncoding::S16 => bytes
            .chunks_exact(2)
            .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32768.0)
            .collect(),
        PcmEncoding::F32 => bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
    }
}

/// Average interleaved frames down to one channel.
fn downmix(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Linear-interpolation resampler.
///
/// Output index `i` reads source position `i * src_rate / dst_rate`;
/// neighbours past the end of `input` count as silence. Equal rates
/// return the input unchanged.
pub fn linear_resample(input: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate {
        return input.to_vec();
    }
    if src_rate == 0 || dst_rate == 0 || input.is_empty() {
        return Vec::new();
    }

    let ratio = f64::from(dst_rate) / f64::from(src_rate);
    let out_len = (input.len() as f64 * ratio).round() as usize;
    let step = f64::from(src_rate) / f64::from(dst_rate);

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = input.get(idx).copied().unwrap_or(0.0);
            let b = input.get(idx + 1).copied().unwrap_or(0.0);
            a * (1.0 - frac) + b * frac
        })
        .collect()
}
