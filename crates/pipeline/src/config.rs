//! Aggregate configuration for a transcription job.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use voxsub_audio_ai::{RecognizerConfig, TranslationConfig, VadConfig};
use voxsub_common::config::{config_file_path, load_json_or_default, save_json, LoggingConfig};
use voxsub_common::error::{VoxsubError, VoxsubResult};
use voxsub_media::{DecoderConfig, TARGET_SAMPLE_RATE};

/// Queueing and debugging knobs for the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Normalized sample batches buffered between decode and VAD.
    pub sample_queue_capacity: usize,

    /// Speech segments buffered between VAD and recognition.
    pub segment_queue_capacity: usize,

    /// When set, every recognized segment is also written here as WAV.
    pub debug_capture_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_queue_capacity: 8,
            segment_queue_capacity: 4,
            debug_capture_dir: None,
        }
    }
}

/// Top-level Voxsub configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxsubConfig {
    pub decoder: DecoderConfig,
    pub vad: VadConfig,
    pub recognizer: RecognizerConfig,
    pub translation: TranslationConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

impl VoxsubConfig {
    /// Load from the standard location, or defaults.
    pub fn load() -> Self {
        Self::load_from(&config_file_path())
    }

    pub fn load_from(path: &Path) -> Self {
        load_json_or_default(path)
    }

    /// Save to the standard location.
    pub fn save(&self) -> VoxsubResult<()> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> VoxsubResult<()> {
        save_json(path, self)?;
        tracing::debug!(path = %path.display(), "Saved configuration");
        Ok(())
    }

    /// Reject settings that would stall or break a job before it starts.
    pub fn validate(&self) -> VoxsubResult<()> {
        self.vad.validate()?;
        if self.pipeline.sample_queue_capacity == 0 || self.pipeline.segment_queue_capacity == 0 {
            return Err(VoxsubError::config("Queue capacities must be non-zero"));
        }
        if self.vad.sample_rate != TARGET_SAMPLE_RATE {
            return Err(VoxsubError::config(format!(
                "vad.sample_rate must be {TARGET_SAMPLE_RATE}, got {}",
                self.vad.sample_rate
            )));
        }
        if self.decoder.chunk_seconds == 0 {
            return Err(VoxsubError::config("decoder.chunk_seconds must be non-zero"));
        }
        Ok(())
    }
}
