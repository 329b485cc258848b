//! Voxsub Media
//!
//! Everything between a video file and mono 16 kHz float samples:
//! - **Decoding:** GStreamer demux/decode of the first audio track into
//!   fixed-size PCM chunks ([`decoder`])
//! - **Chunk arena:** reusable byte buffers that bound decoder output ([`arena`])
//! - **Normalization:** channel mixing, integer rescaling, and linear
//!   resampling to 16 kHz ([`normalize`])
//! - **WAV:** 16-bit mono capture for debugging and WAV input ([`wav`])

pub mod arena;
pub mod decoder;
pub mod format;
pub mod normalize;
pub mod wav;

pub use arena::ChunkArena;
pub use decoder::{AudioSource, DecoderConfig, GstAudioDecoder, PcmSource};
pub use format::{AudioChunk, MediaInfo, PcmEncoding};
pub use normalize::{linear_resample, normalize, NormalizedSamples, TARGET_SAMPLE_RATE};
pub use wav::{open_wav, write_wav};
