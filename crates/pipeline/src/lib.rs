//! Voxsub Pipeline
//!
//! Turns a video id into stored SRT subtitles:
//! - **Orchestration:** concurrent decode, VAD and recognition stages
//!   with progress, cancellation and per-segment error recovery
//!   ([`orchestrator`])
//! - **Collaborators:** video lookup, audio sources, model files,
//!   subtitle storage and language detection ([`collab`])
//! - **Jobs:** state, progress and the final report ([`job`])
//! - **Configuration:** one JSON file for every stage ([`config`])

pub mod collab;
pub mod config;
pub mod job;
pub mod orchestrator;

pub use collab::{
    subtitle_file_name, AudioSourceFactory, DirectoryVideoSource, FixedLanguage, FsSubtitleStore,
    GstSourceFactory, LanguageDetector, ModelAssets, StaticModelAssets, SubtitleStore, VideoSource,
};
pub use config::{PipelineConfig, VoxsubConfig};
pub use job::{JobReport, JobState, JobStatus, PROGRESS_CAP};
pub use orchestrator::{Collaborators, ScorerLoader, TranscriptionOrchestrator};
