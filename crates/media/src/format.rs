//! Decoded audio format descriptors.

use serde::{Deserialize, Serialize};

/// PCM sample encoding of decoder output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PcmEncoding {
    /// Unsigned 8-bit, offset by 128.
    U8,
    /// Signed 16-bit little-endian.
    S16,
    /// 32-bit float little-endian.
    F32,
}

impl PcmEncoding {
    /// Bytes per single-channel sample.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            PcmEncoding::U8 => 1,
            PcmEncoding::S16 => 2,
            PcmEncoding::F32 => 4,
        }
    }
}

/// Format of the decoded audio track.
///
/// Discovered from the first decoded buffer and fixed for the rest of
/// the stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Samples per second per channel.
    pub sample_rate: u32,

    /// Interleaved channel count.
    pub channel_count: u16,

    /// Sample encoding.
    pub encoding: PcmEncoding,

    /// Container duration in seconds, 0.0 when unknown.
    pub duration_secs: f64,
}

impl MediaInfo {
    /// Bytes in one interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        self.encoding.bytes_per_sample() * usize::from(self.channel_count.max(1))
    }

    /// Decoded bytes per second of audio.
    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.sample_rate) * self.frame_bytes() as u64
    }

    /// Bytes the decoder is expected to produce for the whole track.
    ///
    /// Returns 0 when the duration is unknown.
    pub fn expected_total_bytes(&self) -> u64 {
        if !self.duration_secs.is_finite() || self.duration_secs <= 0.0 {
            return 0;
        }
        (self.bytes_per_second() as f64 * self.duration_secs) as u64
    }

    /// Whether two infos describe the same sample layout.
    pub fn same_layout(&self, other: &MediaInfo) -> bool {
        self.sample_rate == other.sample_rate
            && self.channel_count == other.channel_count
            && self.encoding == other.encoding
    }
}

/// Raw PCM handed from the decoder to the normalizer.
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Interleaved little-endian PCM bytes, a whole number of frames.
    pub bytes: Vec<u8>,

    /// Format of `bytes`.
    pub info: MediaInfo,
}

impl AudioChunk {
    /// Seconds of audio in this chunk.
    pub fn duration_secs(&self) -> f64 {
        let per_second = self.info.bytes_per_second();
        if per_second == 0 {
            return 0.0;
        }
        self.bytes.len() as f64 / per_second as f64
    }
}
