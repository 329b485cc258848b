//! Speech recognition into accumulated SRT text.
//!
//! Inference engines are opaque: a backend holds a loader that opens the
//! native session from a model path, and the loaded handle behind one of
//! two traits depending on what the engine emits.

use std::path::Path;

use serde::{Deserialize, Serialize};
use voxsub_common::error::{VoxsubError, VoxsubResult};
use voxsub_common::language::LanguageCode;

use crate::mel::{log_mel_spectrogram, MelSpectrogram, CHUNK_SAMPLES, CHUNK_SECS};
use crate::srt::{SrtAssembler, SrtCursor};
use crate::whisper::{decode_timestamped, prompt_tokens, WhisperVocab};

/// A span of recognized text, times relative to the samples passed in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognizedSpan {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// Engine that returns text spans with their own timestamps.
pub trait TimestampedModel: Send {
    fn recognize(&mut self, samples: &[f32], language: LanguageCode) -> VoxsubResult<Vec<RecognizedSpan>>;
}

/// Engine that returns a Whisper token stream for a log-mel input.
pub trait TokenModel: Send {
    fn generate(&mut self, mel: &MelSpectrogram, prompt: &[u32]) -> VoxsubResult<Vec<u32>>;
}

/// Opens an engine session from a model file.
pub type ModelLoader<M> = Box<dyn Fn(&Path) -> VoxsubResult<M> + Send + Sync>;

/// Which engine flavour a job uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecognizerKind {
    #[default]
    Timestamped,
    TokenStream,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub kind: RecognizerKind,
    /// Spoken language, `auto` to let the engine decide.
    pub language: LanguageCode,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            kind: RecognizerKind::Timestamped,
            language: LanguageCode::Auto,
        }
    }
}

pub enum RecognizerBackend {
    Timestamped {
        loader: ModelLoader<Box<dyn TimestampedModel>>,
        model: Option<Box<dyn TimestampedModel>>,
    },
    TokenStream {
        loader: ModelLoader<Box<dyn TokenModel>>,
        model: Option<Box<dyn TokenModel>>,
        vocab: Option<WhisperVocab>,
    },
}

impl RecognizerBackend {
    pub fn kind(&self) -> RecognizerKind {
        match self {
            Self::Timestamped { .. } => RecognizerKind::Timestamped,
            Self::TokenStream { .. } => RecognizerKind::TokenStream,
        }
    }
}

/// Turns speech segments into SRT text that accumulates across calls.
pub struct SpeechRecognizer {
    backend: RecognizerBackend,
    assembler: SrtAssembler,
    standard_time: f64,
}

impl SpeechRecognizer {
    pub fn new(backend: RecognizerBackend) -> Self {
        Self {
            backend,
            assembler: SrtAssembler::new(),
            standard_time: 0.0,
        }
    }

    pub fn timestamped(loader: ModelLoader<Box<dyn TimestampedModel>>) -> Self {
        Self::new(RecognizerBackend::Timestamped {
            loader,
            model: None,
        })
    }

    pub fn token_stream(loader: ModelLoader<Box<dyn TokenModel>>) -> Self {
        Self::new(RecognizerBackend::TokenStream {
            loader,
            model: None,
            vocab: None,
        })
    }

    pub fn kind(&self) -> RecognizerKind {
        self.backend.kind()
    }

    pub fn is_initialized(&self) -> bool {
        match &self.backend {
            RecognizerBackend::Timestamped { model, .. } => model.is_some(),
            RecognizerBackend::TokenStream { model, vocab, .. } => model.is_some() && vocab.is_some(),
        }
    }

    /// Load the engine. The token-stream backend also needs its vocabulary.
    pub fn initialize(&mut self, model_path: &Path, vocab_path: Option<&Path>) -> VoxsubResult<()> {
        tracing::info!(
            model = %model_path.display(),
            kind = ?self.kind(),
            "Initializing speech recognizer"
        );

        match &mut self.backend {
            RecognizerBackend::Timestamped { loader, model } => {
                *model = Some(loader(model_path).map_err(|e| init_error(model_path, e))?);
            }
            RecognizerBackend::TokenStream {
                loader,
                model,
                vocab,
            } => {
                let vocab_path = vocab_path.ok_or_else(|| {
                    VoxsubError::engine_init("Token-stream recognizer needs a vocabulary file")
                })?;
                let loaded_vocab = WhisperVocab::load(vocab_path).map_err(|e| init_error(vocab_path, e))?;
                *model = Some(loader(model_path).map_err(|e| init_error(model_path, e))?);
                *vocab = Some(loaded_vocab);
            }
        }
        Ok(())
    }

    /// Recognize one segment and append its blocks to the pending text.
    pub fn transcribe(&mut self, samples: &[f32], language: LanguageCode) -> VoxsubResult<()> {
        match &mut self.backend {
            RecognizerBackend::Timestamped { model, .. } => {
                let model = model.as_mut().ok_or_else(not_initialized)?;
                let spans = model
                    .recognize(samples, language)
                    .map_err(recognition_error)?;
                for span in spans {
                    if span.text.trim().is_empty() {
                        continue;
                    }
                    self.assembler.push(
                        self.standard_time + span.start_secs,
                        self.standard_time + span.end_secs,
                        &span.text,
                    );
                }
            }
            RecognizerBackend::TokenStream { model, vocab, .. } => {
                let (Some(model), Some(vocab)) = (model.as_mut(), vocab.as_ref()) else {
                    return Err(not_initialized());
                };
                let prompt = prompt_tokens(language);
                // The model sees at most 30 s; each chunk is decoded at its
                // own position in the source.
                for (i, chunk) in samples.chunks(CHUNK_SAMPLES).enumerate() {
                    let chunk_start = self.standard_time + i as f64 * CHUNK_SECS;
                    self.assembler.cursor_mut().seek(chunk_start);

                    let mel = log_mel_spectrogram(chunk, vocab.filters())?;
                    let tokens = model.generate(&mel, &prompt).map_err(recognition_error)?;

                    let mark = self.assembler.text().len();
                    for block in decode_timestamped(&tokens, vocab, chunk_start) {
                        self.assembler.push(block.start_secs, block.end_secs, &block.text);
                    }
                    let produced = self.assembler.text()[mark..].to_string();
                    self.assembler.cursor_mut().advance_from(&produced);
                    tracing::trace!(
                        chunk = i,
                        start_secs = chunk_start,
                        offset_secs = self.assembler.cursor().offset_secs,
                        "Decoded token-stream chunk"
                    );
                }
            }
        }
        Ok(())
    }

    /// Take the accumulated SRT text.
    ///
    /// The block index restarts; the time offset carries over.
    pub fn result(&mut self) -> String {
        self.assembler.take()
    }

    /// Position of the next segment in the source, in seconds.
    pub fn set_standard_time(&mut self, secs: f64) {
        self.standard_time = secs;
        if let RecognizerBackend::TokenStream { .. } = self.backend {
            self.assembler.cursor_mut().seek(secs);
        }
    }

    pub fn cursor(&self) -> SrtCursor {
        self.assembler.cursor()
    }

    /// Start a new timeline: pending text, block index and offset are cleared.
    pub fn reset(&mut self) {
        self.assembler = SrtAssembler::new();
        self.standard_time = 0.0;
    }

    /// Drop the engine session. The recognizer can be initialized again.
    pub fn release(&mut self) {
        match &mut self.backend {
            RecognizerBackend::Timestamped { model, .. } => *model = None,
            RecognizerBackend::TokenStream { model, vocab, .. } => {
                *model = None;
                *vocab = None;
            }
        }
        tracing::debug!("Speech recognizer released");
    }
}

fn not_initialized() -> VoxsubError {
    VoxsubError::engine_init("Speech recognizer is not initialized")
}

fn init_error(path: &Path, e: VoxsubError) -> VoxsubError {
    match e {
        e @ VoxsubError::EngineInit { .. } => e,
        other => VoxsubError::engine_init(format!("{}: {other}", path.display())),
    }
}

fn recognition_error(e: VoxsubError) -> VoxsubError {
    match e {
        e @ VoxsubError::Recognition { .. } => e,
        other => VoxsubError::recognition(other.to_string()),
    }
}
