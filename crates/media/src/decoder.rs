//! Audio track decoding.
//!
//! [`GstAudioDecoder`] demuxes a container with `uridecodebin`, links the
//! first audio pad to an `appsink`, and pulls decoded PCM into a
//! [`ChunkArena`]. The audio format is only known once the first buffer
//! arrives, so [`AudioSource::media_info`] stays `None` until then.
//!
//! All waits are short timed polls so a cancelled job is noticed within
//! one poll interval.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use gst::prelude::*;
use gstreamer as gst;
use gstreamer_app as gst_app;
use gstreamer_audio as gst_audio;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use voxsub_common::error::{VoxsubError, VoxsubResult};

use crate::arena::ChunkArena;
use crate::format::{AudioChunk, MediaInfo, PcmEncoding};

/// A finite, pull-based stream of decoded PCM chunks.
pub trait AudioSource: Send {
    /// Next chunk, or `None` once the stream is exhausted.
    fn next_chunk(&mut self) -> VoxsubResult<Option<AudioChunk>>;

    /// Format of the stream, once known.
    fn media_info(&self) -> Option<MediaInfo>;

    /// Return a consumed chunk so its buffer can be reused.
    fn recycle(&mut self, _chunk: AudioChunk) {}
}

/// Decoder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Seconds of audio per emitted chunk.
    pub chunk_seconds: u32,

    /// Ask the decoder to downmix to mono.
    pub force_mono: bool,

    /// Poll interval for the appsink and bus, in milliseconds.
    pub poll_timeout_ms: u64,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: 30,
            force_mono: true,
            poll_timeout_ms: 20,
        }
    }
}

/// Turn a path or URI into something `uridecodebin` accepts.
pub fn to_uri(locator: &str) -> VoxsubResult<String> {
    if locator.contains("://") {
        return Ok(locator.to_string());
    }
    let path = Path::new(locator);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };
    if !absolute.exists() {
        return Err(VoxsubError::FileNotFound { path: absolute });
    }
    gst::glib::filename_to_uri(&absolute, None)
        .map(|uri| uri.to_string())
        .map_err(|e| VoxsubError::media(format!("Invalid media path {locator}: {e}")))
}

/// Formats the appsink accepts; `audioconvert` turns anything else into
/// one of these, so every decoded stream maps to a [`PcmEncoding`].
pub const SINK_FORMATS: [gst_audio::AudioFormat; 3] = [
    gst_audio::AudioFormat::S16le,
    gst_audio::AudioFormat::F32le,
    gst_audio::AudioFormat::U8,
];

fn sink_caps(force_mono: bool) -> gst::Caps {
    let builder = gst_audio::AudioCapsBuilder::new_interleaved().format_list(SINK_FORMATS);
    if force_mono {
        builder.channels(1).build()
    } else {
        builder.build()
    }
}

/// Map negotiated caps to a [`PcmEncoding`].
///
/// The GStreamer decoder only negotiates [`SINK_FORMATS`]; the error is
/// for sources that report their format some other way.
pub fn encoding_from_format(format: gst_audio::AudioFormat) -> VoxsubResult<PcmEncoding> {
    match format {
        gst_audio::AudioFormat::S16le => Ok(PcmEncoding::S16),
        gst_audio::AudioFormat::F32le => Ok(PcmEncoding::F32),
        gst_audio::AudioFormat::U8 => Ok(PcmEncoding::U8),
        other => Err(VoxsubError::unsupported_encoding(format!("{other:?}"))),
    }
}

/// GStreamer-backed [`AudioSource`].
///
/// Output is converted to one of [`SINK_FORMATS`], so this source never
/// reports `UnsupportedEncoding`.
pub struct GstAudioDecoder {
    locator: String,
    pipeline: gst::Pipeline,
    sink: gst_app::AppSink,
    config: DecoderConfig,
    cancel: CancellationToken,
    audio_linked: Arc<AtomicBool>,
    pads_done: Arc<AtomicBool>,
    info: Option<MediaInfo>,
    arena: Option<ChunkArena>,
    ready: VecDeque<AudioChunk>,
    finished: bool,
}

impl GstAudioDecoder {
    /// Build and start a decoding pipeline for `locator`.
    pub fn open(
        locator: &str,
        config: DecoderConfig,
        cancel: CancellationToken,
    ) -> VoxsubResult<Self> {
        init_gstreamer()?;
        let uri = to_uri(locator)?;

        let caps = sink_caps(config.force_mono);

        let source = gst::ElementFactory::make("uridecodebin")
            .name("source")
            .property("uri", &uri)
            .build()
            .map_err(|e| VoxsubError::media(format!("Failed to create uridecodebin: {e}")))?;
        let convert = gst::ElementFactory::make("audioconvert")
            .name("convert")
            .build()
            .map_err(|e| VoxsubError::media(format!("Failed to create audioconvert: {e}")))?;
        let sink = gst_app::AppSink::builder()
            .name("sink")
            .caps(&caps)
            .sync(false)
            .max_buffers(8)
            .build();

        let pipeline = gst::Pipeline::with_name("voxsub-decoder");
        pipeline
            .add_many([&source, &convert, sink.upcast_ref()])
            .map_err(|e| VoxsubError::media(format!("Failed to assemble pipeline: {e}")))?;
        convert
            .link(&sink)
            .map_err(|e| VoxsubError::media(format!("Failed to link audio sink: {e}")))?;

        let audio_linked = Arc::new(AtomicBool::new(false));
        let pads_done = Arc::new(AtomicBool::new(false));

        let convert_weak = convert.downgrade();
        let linked = audio_linked.clone();
        source.connect_pad_added(move |_, pad| {
            let Some(convert) = convert_weak.upgrade() else {
                return;
            };
            let is_audio = pad
                .current_caps()
                .and_then(|caps| {
                    caps.structure(0)
                        .map(|s| s.name().as_str().starts_with("audio/"))
                })
                .unwrap_or(false);
            if !is_audio || linked.load(Ordering::SeqCst) {
                return;
            }
            let Some(sink_pad) = convert.static_pad("sink") else {
                return;
            };
            match pad.link(&sink_pad) {
                Ok(_) => {
                    linked.store(true, Ordering::SeqCst);
                    tracing::debug!(pad = %pad.name(), "Linked audio pad");
                }
                Err(e) => tracing::warn!(error = ?e, "Failed to link audio pad"),
            }
        });
        let done = pads_done.clone();
        source.connect_no_more_pads(move |_| {
            done.store(true, Ordering::SeqCst);
        });

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            VoxsubError::media(format!("Failed to start decoding {locator}: {e:?}"))
        })?;

        tracing::info!(locator = %locator, uri = %uri, "Decoder started");

        Ok(Self {
            locator: locator.to_string(),
            pipeline,
            sink,
            config,
            cancel,
            audio_linked,
            pads_done,
            info: None,
            arena: None,
            ready: VecDeque::new(),
            finished: false,
        })
    }

    fn poll_timeout(&self) -> gst::ClockTime {
        gst::ClockTime::from_mseconds(self.config.poll_timeout_ms.max(1))
    }

    fn no_audio_track(&self) -> bool {
        self.pads_done.load(Ordering::SeqCst) && !self.audio_linked.load(Ordering::SeqCst)
    }

    fn check_bus(&self) -> VoxsubResult<()> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };
        while let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Warning])
        {
            match msg.view() {
                gst::MessageView::Error(e) => {
                    if self.no_audio_track() {
                        return Err(VoxsubError::no_audio_track(&self.locator));
                    }
                    return Err(VoxsubError::media(format!(
                        "Decoding {} failed: {}",
                        self.locator,
                        e.error()
                    )));
                }
                gst::MessageView::Warning(w) => {
                    tracing::warn!(locator = %self.locator, warning = %w.error(), "Decoder warning");
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn ingest(&mut self, sample: gst::Sample) -> VoxsubResult<()> {
        let caps = sample
            .caps()
            .ok_or_else(|| VoxsubError::media("Decoded sample carries no caps"))?;
        let audio_info = gst_audio::AudioInfo::from_caps(caps)
            .map_err(|e| VoxsubError::media(format!("Unreadable audio caps: {e}")))?;
        let encoding = encoding_from_format(audio_info.format())?;
        let channel_count = u16::try_from(audio_info.channels())
            .map_err(|_| VoxsubError::unsupported_encoding("channel count"))?;

        let info = MediaInfo {
            sample_rate: audio_info.rate(),
            channel_count,
            encoding,
            duration_secs: self.duration_secs(),
        };

        match self.info {
            Some(current) if current.same_layout(&info) => {}
            Some(current) => {
                tracing::warn!(?current, new = ?info, "Audio format changed mid-stream");
                self.flush_arena();
                self.start_arena(info);
            }
            None => {
                tracing::info!(
                    sample_rate = info.sample_rate,
                    channels = info.channel_count,
                    encoding = ?info.encoding,
                    duration_secs = info.duration_secs,
                    "Audio format resolved"
                );
                self.start_arena(info);
            }
        }

        let buffer = sample
            .buffer()
            .ok_or_else(|| VoxsubError::media("Decoded sample carries no buffer"))?;
        let map = buffer
            .map_readable()
            .map_err(|e| VoxsubError::media(format!("Failed to map decoded buffer: {e}")))?;

        let Some(info) = self.info else {
            return Ok(());
        };
        let Some(arena) = self.arena.as_mut() else {
            return Ok(());
        };
        let mut data = map.as_slice();
        while !data.is_empty() {
            let (full, rest) = arena.fill(data);
            if let Some(bytes) = full {
                self.ready.push_back(AudioChunk { bytes, info });
            }
            data = rest;
        }
        Ok(())
    }

    fn start_arena(&mut self, info: MediaInfo) {
        self.arena = Some(ChunkArena::for_media(&info, self.config.chunk_seconds));
        self.info = Some(info);
    }

    fn flush_arena(&mut self) {
        let (Some(arena), Some(info)) = (self.arena.as_mut(), self.info) else {
            return;
        };
        if let Some(bytes) = arena.finish() {
            self.ready.push_back(AudioChunk { bytes, info });
        }
    }

    fn duration_secs(&self) -> f64 {
        self.pipeline
            .query_duration::<gst::ClockTime>()
            .map(|d| d.mseconds() as f64 / 1000.0)
            .unwrap_or(0.0)
    }

    /// Stop the pipeline and release its resources.
    pub fn release(&mut self) {
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            tracing::warn!(locator = %self.locator, error = ?e, "Failed to stop decoder");
        }
    }
}

impl AudioSource for GstAudioDecoder {
    fn next_chunk(&mut self) -> VoxsubResult<Option<AudioChunk>> {
        loop {
            if let Some(chunk) = self.ready.pop_front() {
                return Ok(Some(chunk));
            }
            if self.finished {
                return Ok(None);
            }
            if self.cancel.is_cancelled() {
                return Err(VoxsubError::Cancelled);
            }

            self.check_bus()?;
            if self.no_audio_track() {
                return Err(VoxsubError::no_audio_track(&self.locator));
            }

            match self.sink.try_pull_sample(self.poll_timeout()) {
                Some(sample) => self.ingest(sample)?,
                None if self.sink.is_eos() => {
                    self.flush_arena();
                    self.finished = true;
                    tracing::info!(locator = %self.locator, "Decoder reached end of stream");
                }
                // Timed out; poll again.
                None => {}
            }
        }
    }

    fn media_info(&self) -> Option<MediaInfo> {
        self.info
    }

    fn recycle(&mut self, chunk: AudioChunk) {
        if let Some(arena) = self.arena.as_mut() {
            arena.recycle(chunk.bytes);
        }
    }
}

impl Drop for GstAudioDecoder {
    fn drop(&mut self) {
        self.release();
    }
}

/// In-memory [`AudioSource`] over already-decoded PCM.
///
/// Used for WAV input and for driving the pipeline without a container.
pub struct PcmSource {
    bytes: Vec<u8>,
    offset: usize,
    info: MediaInfo,
    arena: ChunkArena,
}

impl PcmSource {
    /// Serve `bytes` in chunks of `chunk_seconds` of audio.
    pub fn new(bytes: Vec<u8>, info: MediaInfo, chunk_seconds: u32) -> Self {
        Self {
            bytes,
            offset: 0,
            info,
            arena: ChunkArena::for_media(&info, chunk_seconds),
        }
    }

    /// Serve `bytes` in chunks of exactly `chunk_bytes`.
    pub fn with_chunk_bytes(bytes: Vec<u8>, info: MediaInfo, chunk_bytes: usize) -> Self {
        let frame = info.frame_bytes();
        let aligned = (chunk_bytes / frame).max(1) * frame;
        Self {
            bytes,
            offset: 0,
            info,
            arena: ChunkArena::new(aligned),
        }
    }
}

impl AudioSource for PcmSource {
    fn next_chunk(&mut self) -> VoxsubResult<Option<AudioChunk>> {
        while self.offset < self.bytes.len() {
            let (full, rest) = self.arena.fill(&self.bytes[self.offset..]);
            self.offset = self.bytes.len() - rest.len();
            if let Some(bytes) = full {
                return Ok(Some(AudioChunk {
                    bytes,
                    info: self.info,
                }));
            }
        }
        Ok(self.arena.finish().map(|bytes| AudioChunk {
            bytes,
            info: self.info,
        }))
    }

    fn media_info(&self) -> Option<MediaInfo> {
        Some(self.info)
    }

    fn recycle(&mut self, chunk: AudioChunk) {
        self.arena.recycle(chunk.bytes);
    }
}

fn init_gstreamer() -> VoxsubResult<()> {
    static GST_INIT: OnceLock<Result<(), String>> = OnceLock::new();
    let init_res = GST_INIT.get_or_init(|| gst::init().map_err(|e| e.to_string()));
    match init_res {
        Ok(()) => Ok(()),
        Err(e) => Err(VoxsubError::media(format!(
            "Failed to initialize GStreamer: {e}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_s16(rate: u32) -> MediaInfo {
        MediaInfo {
            sample_rate: rate,
            channel_count: 1,
            encoding: PcmEncoding::S16,
            duration_secs: 0.0,
        }
    }

    #[test]
    fn test_encoding_mapping() {
        assert_eq!(
            encoding_from_format(gst_audio::AudioFormat::S16le).unwrap(),
            PcmEncoding::S16
        );
        assert_eq!(
            encoding_from_format(gst_audio::AudioFormat::F32le).unwrap(),
            PcmEncoding::F32
        );
        let err = encoding_from_format(gst_audio::AudioFormat::S24le).unwrap_err();
        assert!(matches!(err, VoxsubError::UnsupportedEncoding { .. }));
    }

    #[test]
    fn test_sink_formats_all_map_to_an_encoding() {
        for format in SINK_FORMATS {
            assert!(encoding_from_format(format).is_ok(), "{format:?}");
        }
    }

    #[test]
    fn test_uri_passthrough_and_missing_file() {
        assert_eq!(
            to_uri("file:///tmp/clip.mp4").unwrap(),
            "file:///tmp/clip.mp4"
        );
        let err = to_uri("/definitely/not/here.mp4").unwrap_err();
        assert!(matches!(err, VoxsubError::FileNotFound { .. }));
    }

    #[test]
    fn test_pcm_source_chunks_and_short_tail() {
        // 2.5 seconds at 4 samples/s, 2 bytes per sample.
        let info = mono_s16(4);
        let bytes: Vec<u8> = (0..20).collect();
        let mut source = PcmSource::new(bytes, info, 1);

        let mut sizes = Vec::new();
        while let Some(chunk) = source.next_chunk().unwrap() {
            sizes.push(chunk.bytes.len());
            source.recycle(chunk);
        }
        assert_eq!(sizes, vec![8, 8, 4]);
    }

    #[test]
    fn test_pcm_source_aligns_chunk_bytes_to_frames() {
        let info = MediaInfo {
            channel_count: 2,
            ..mono_s16(16_000)
        };
        let mut source = PcmSource::with_chunk_bytes(vec![0; 30], info, 10);
        let first = source.next_chunk().unwrap().unwrap();
        assert_eq!(first.bytes.len(), 8);
    }
}
