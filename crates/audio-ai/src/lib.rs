//! Voxsub Audio Intelligence
//!
//! Everything between normalized samples and subtitle text:
//! - **Windowing and VAD:** fixed windows in, speech segments out
//! - **Recognition:** pluggable engines that append numbered SRT blocks
//! - **Whisper front end:** vocabulary loading, log-mel input, token decoding
//! - **Translation:** line-preserving SRT translation

pub mod mel;
pub mod recognizer;
pub mod srt;
pub mod translator;
pub mod vad;
pub mod whisper;
pub mod window;

pub use recognizer::{
    ModelLoader, RecognizedSpan, RecognizerBackend, RecognizerConfig, RecognizerKind,
    SpeechRecognizer, TimestampedModel, TokenModel,
};
pub use srt::*;
pub use translator::{
    EngineFactory, LightModel, NmtModel, TranslationConfig, Translator, TranslatorBackend,
    TranslatorKind,
};
pub use vad::{EnergyScorer, SpeechScorer, SpeechSegment, VadConfig, VadState, VoiceActivityDetector};
pub use window::WindowBuffer;
