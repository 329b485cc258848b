//! 16-bit mono WAV capture and WAV input.
//!
//! Written files use the canonical 44-byte RIFF/WAVE header.

use std::path::Path;

use voxsub_common::error::{VoxsubError, VoxsubResult};

use crate::decoder::PcmSource;
use crate::format::{MediaInfo, PcmEncoding};

fn wav_error(path: &Path, e: hound::Error) -> VoxsubError {
    match e {
        hound::Error::IoError(io) => VoxsubError::Io(io),
        other => VoxsubError::media(format!("WAV error for {}: {other}", path.display())),
    }
}

/// Write normalized samples as 16-bit PCM mono.
///
/// Samples are clamped to [-1, 1] and scaled by 32767.
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> VoxsubResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| wav_error(path, e))?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
        writer.write_sample(value).map_err(|e| wav_error(path, e))?;
    }
    writer.finalize().map_err(|e| wav_error(path, e))?;

    tracing::debug!(path = %path.display(), samples = samples.len(), "Wrote WAV capture");
    Ok(())
}

/// Open a 16-bit integer or 32-bit float WAV file as an audio source.
pub fn open_wav(path: &Path, chunk_seconds: u32) -> VoxsubResult<PcmSource> {
    if !path.exists() {
        return Err(VoxsubError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut reader = hound::WavReader::open(path).map_err(|e| wav_error(path, e))?;
    let spec = reader.spec();

    let (encoding, bytes) = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, 16) => {
            let mut bytes = Vec::with_capacity(reader.len() as usize * 2);
            for sample in reader.samples::<i16>() {
                let sample = sample.map_err(|e| wav_error(path, e))?;
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
            (PcmEncoding::S16, bytes)
        }
        (hound::SampleFormat::Float, 32) => {
            let mut bytes = Vec::with_capacity(reader.len() as usize * 4);
            for sample in reader.samples::<f32>() {
                let sample = sample.map_err(|e| wav_error(path, e))?;
                bytes.extend_from_slice(&sample.to_le_bytes());
            }
            (PcmEncoding::F32, bytes)
        }
        (format, bits) => {
            return Err(VoxsubError::unsupported_encoding(format!(
                "{format:?} {bits}-bit WAV"
            )))
        }
    };

    let frames = reader.duration();
    let info = MediaInfo {
        sample_rate: spec.sample_rate,
        channel_count: spec.channels,
        encoding,
        duration_secs: if spec.sample_rate == 0 {
            0.0
        } else {
            f64::from(frames) / f64::from(spec.sample_rate)
        },
    };
    Ok(PcmSource::new(bytes, info, chunk_seconds))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::AudioSource;
    use crate::normalize::normalize;

    #[test]
    fn test_wav_header_is_44_bytes() {
        let dir = std::env::temp_dir().join("voxsub_test_wav_header");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("capture.wav");

        write_wav(&path, &[0.0, 0.5, -0.5, 1.0], 16_000).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 44 + 4 * 2);
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        // channels, sample rate, bits per sample
        assert_eq!(u16::from_le_bytes([bytes[22], bytes[23]]), 1);
        assert_eq!(
            u32::from_le_bytes([bytes[24], bytes[25], bytes[26], bytes[27]]),
            16_000
        );
        assert_eq!(u16::from_le_bytes([bytes[34], bytes[35]]), 16);
        assert_eq!(i16::from_le_bytes([bytes[46], bytes[47]]), 16383);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_wav_source_feeds_normalizer() {
        let dir = std::env::temp_dir().join("voxsub_test_wav_source");
        let _ = std::fs::remove_dir_all(&dir);
        let path = dir.join("input.wav");

        let samples: Vec<f32> = (0..16_000).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        write_wav(&path, &samples, 16_000).unwrap();

        let mut source = open_wav(&path, 30).unwrap();
        let info = source.media_info().unwrap();
        assert_eq!(info.encoding, PcmEncoding::S16);
        assert!((info.duration_secs - 1.0).abs() < 1e-9);

        let chunk = source.next_chunk().unwrap().unwrap();
        let out = normalize(&chunk);
        assert_eq!(out.len(), 16_000);
        assert!((out[0] - 0.5).abs() < 1e-3);
        assert!(source.next_chunk().unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
