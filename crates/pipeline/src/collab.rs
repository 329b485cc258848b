//! Interfaces to the world outside the pipeline.
//!
//! Video lookup, audio decoding, model files, subtitle storage and
//! language identification are all injected so a job can run against
//! real media or entirely in memory.

use std::path::{Path, PathBuf};

use tokio_util::sync::CancellationToken;
use voxsub_common::error::{VoxsubError, VoxsubResult};
use voxsub_common::language::LanguageCode;
use voxsub_media::{AudioSource, DecoderConfig, GstAudioDecoder};

/// Storage identifier of a subtitle file.
pub fn subtitle_file_name(video_id: &str, language: LanguageCode) -> String {
    format!("{video_id}_{}.srt", language.code())
}

/// Maps a video id to something the decoder can open.
#[async_trait::async_trait]
pub trait VideoSource: Send + Sync {
    /// Returns a URI or local path.
    async fn resolve(&self, video_id: &str) -> VoxsubResult<String>;
}

/// Video ids are file names under a directory.
#[derive(Debug, Clone)]
pub struct DirectoryVideoSource {
    root: PathBuf,
}

impl DirectoryVideoSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl VideoSource for DirectoryVideoSource {
    async fn resolve(&self, video_id: &str) -> VoxsubResult<String> {
        let path = self.root.join(video_id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(VoxsubError::FileNotFound { path });
        }
        Ok(path.to_string_lossy().into_owned())
    }
}

/// Opens an audio source for a resolved locator.
///
/// Called on a blocking thread; implementations may block.
pub trait AudioSourceFactory: Send + Sync {
    fn open(
        &self,
        locator: &str,
        config: &DecoderConfig,
        cancel: CancellationToken,
    ) -> VoxsubResult<Box<dyn AudioSource>>;
}

/// Decodes through GStreamer.
#[derive(Debug, Clone, Copy, Default)]
pub struct GstSourceFactory;

impl AudioSourceFactory for GstSourceFactory {
    fn open(
        &self,
        locator: &str,
        config: &DecoderConfig,
        cancel: CancellationToken,
    ) -> VoxsubResult<Box<dyn AudioSource>> {
        Ok(Box::new(GstAudioDecoder::open(locator, config.clone(), cancel)?))
    }
}

/// Locations of the model files a job needs.
pub trait ModelAssets: Send + Sync {
    fn recognizer_model(&self) -> PathBuf;

    /// Token vocabulary, needed by token-stream recognizers only.
    fn recognizer_vocab(&self) -> Option<PathBuf>;

    /// Weights for a model-backed speech scorer, if one is used.
    fn vad_model(&self) -> Option<PathBuf>;
}

/// Fixed model paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticModelAssets {
    pub recognizer_model: PathBuf,
    pub recognizer_vocab: Option<PathBuf>,
    pub vad_model: Option<PathBuf>,
}

impl StaticModelAssets {
    pub fn new(recognizer_model: impl Into<PathBuf>) -> Self {
        Self {
            recognizer_model: recognizer_model.into(),
            recognizer_vocab: None,
            vad_model: None,
        }
    }

    pub fn with_vocab(mut self, vocab: impl Into<PathBuf>) -> Self {
        self.recognizer_vocab = Some(vocab.into());
        self
    }
}

impl ModelAssets for StaticModelAssets {
    fn recognizer_model(&self) -> PathBuf {
        self.recognizer_model.clone()
    }

    fn recognizer_vocab(&self) -> Option<PathBuf> {
        self.recognizer_vocab.clone()
    }

    fn vad_model(&self) -> Option<PathBuf> {
        self.vad_model.clone()
    }
}

/// Subtitle file storage.
#[async_trait::async_trait]
pub trait SubtitleStore: Send + Sync {
    /// Store `content` under `file_id`. Returns whether the file is now present.
    async fn write(&self, file_id: &str, content: &str) -> bool;

    /// All lines of a stored file, `None` if it does not exist.
    async fn read_lines(&self, file_id: &str) -> Option<Vec<String>>;
}

/// Subtitles as files in a directory.
///
/// Existing files are never overwritten; writing to an id that already
/// exists succeeds without touching it.
#[derive(Debug, Clone)]
pub struct FsSubtitleStore {
    root: PathBuf,
}

impl FsSubtitleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_of(&self, file_id: &str) -> PathBuf {
        self.root.join(file_id)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait::async_trait]
impl SubtitleStore for FsSubtitleStore {
    async fn write(&self, file_id: &str, content: &str) -> bool {
        let path = self.path_of(file_id);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tracing::debug!(path = %path.display(), "Subtitle already exists; keeping it");
            return true;
        }
        if let Err(e) = tokio::fs::create_dir_all(&self.root).await {
            tracing::warn!(error = %e, dir = %self.root.display(), "Failed to create subtitle directory");
            return false;
        }
        match tokio::fs::write(&path, content).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, path = %path.display(), "Failed to write subtitle");
                false
            }
        }
    }

    async fn read_lines(&self, file_id: &str) -> Option<Vec<String>> {
        let content = tokio::fs::read_to_string(self.path_of(file_id)).await.ok()?;
        Some(content.split('\n').map(|l| l.trim_end_matches('\r').to_string()).collect())
    }
}

/// Identifies the language of recognized text.
#[async_trait::async_trait]
pub trait LanguageDetector: Send + Sync {
    async fn detect(&self, text: &str) -> VoxsubResult<LanguageCode>;
}

/// Always answers with one language.
#[derive(Debug, Clone, Copy)]
pub struct FixedLanguage(pub LanguageCode);

#[async_trait::async_trait]
impl LanguageDetector for FixedLanguage {
    async fn detect(&self, _text: &str) -> VoxsubResult<LanguageCode> {
        Ok(self.0)
    }
}
