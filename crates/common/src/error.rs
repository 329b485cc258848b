//! Error types shared across Voxsub crates.

use std::path::PathBuf;

/// Top-level error type for Voxsub operations.
#[derive(Debug, thiserror::Error)]
pub enum VoxsubError {
    #[error("Media error: {message}")]
    Media { message: String },

    #[error("No audio track found in {locator}")]
    NoAudioTrack { locator: String },

    #[error("Unsupported PCM encoding: {format}")]
    UnsupportedEncoding { format: String },

    #[error("Invalid VAD configuration: {message}")]
    VadConfig { message: String },

    #[error("Recognition error: {message}")]
    Recognition { message: String },

    #[error("Engine initialization failed: {message}")]
    EngineInit { message: String },

    #[error("Translation failed: {message}")]
    TranslationFailed { message: String },

    #[error("Unsupported language: {code}")]
    UnsupportedLanguage { code: String },

    #[error("Invalid subtitle: {message}")]
    Subtitle { message: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using VoxsubError.
pub type VoxsubResult<T> = Result<T, VoxsubError>;

impl VoxsubError {
    pub fn media(msg: impl Into<String>) -> Self {
        Self::Media {
            message: msg.into(),
        }
    }

    pub fn no_audio_track(locator: impl Into<String>) -> Self {
        Self::NoAudioTrack {
            locator: locator.into(),
        }
    }

    pub fn unsupported_encoding(format: impl Into<String>) -> Self {
        Self::UnsupportedEncoding {
            format: format.into(),
        }
    }

    pub fn vad_config(msg: impl Into<String>) -> Self {
        Self::VadConfig {
            message: msg.into(),
        }
    }

    pub fn recognition(msg: impl Into<String>) -> Self {
        Self::Recognition {
            message: msg.into(),
        }
    }

    pub fn engine_init(msg: impl Into<String>) -> Self {
        Self::EngineInit {
            message: msg.into(),
        }
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        Self::TranslationFailed {
            message: msg.into(),
        }
    }

    pub fn unsupported_language(code: impl Into<String>) -> Self {
        Self::UnsupportedLanguage { code: code.into() }
    }

    pub fn subtitle(msg: impl Into<String>) -> Self {
        Self::Subtitle {
            message: msg.into(),
        }
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether this error ends a transcription job.
    ///
    /// Recognition errors only cost the segment they occurred in and
    /// translation errors only cost the translated artifact.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::Recognition { .. } | Self::TranslationFailed { .. } | Self::UnsupportedLanguage { .. }
        )
    }
}
