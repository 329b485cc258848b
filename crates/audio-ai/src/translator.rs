//! Subtitle translation.
//!
//! Subtitles are handled as lines. In the layout the assembler writes
//! (index, timing, text, blank) the text is every line where
//! `(i + 1) % 4 == 3`; only those lines are translated and every other
//! line is copied through.

use serde::{Deserialize, Serialize};
use voxsub_common::error::{VoxsubError, VoxsubResult};
use voxsub_common::language::LanguageCode;

/// Default cap on generated tokens per text for the NMT backend.
pub const DEFAULT_MAX_OUTPUT_LENGTH: usize = 200;

/// Separator used when a whole subtitle goes through a single call.
const JOIN_SEPARATOR: char = '@';

/// Translation engine that takes a whole text at once.
pub trait LightModel: Send {
    /// `Ok(None)` means the engine produced nothing.
    fn translate(&mut self, text: &str, src: &str, tgt: &str) -> VoxsubResult<Option<String>>;
}

/// Local NMT engine with a native batch entry point.
pub trait NmtModel: Send {
    /// `batch` is encoded with [`encode_batch`].
    fn translate_batch(
        &mut self,
        batch: &[u8],
        src: &str,
        tgt: &str,
        max_output_length: usize,
    ) -> VoxsubResult<Option<Vec<String>>>;
}

/// Opens a translation engine.
pub type EngineFactory<M> = Box<dyn Fn() -> VoxsubResult<M> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranslatorKind {
    #[default]
    Light,
    Nmt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub backend: TranslatorKind,
    /// Language to translate subtitles into; `None` disables translation.
    pub target_language: Option<LanguageCode>,
    pub max_output_length: usize,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            backend: TranslatorKind::Light,
            target_language: None,
            max_output_length: DEFAULT_MAX_OUTPUT_LENGTH,
        }
    }
}

/// Engine tag for a language; `auto` has none.
pub fn language_tag(language: LanguageCode) -> Option<&'static str> {
    language.is_concrete().then(|| language.code())
}

fn tag_for(language: LanguageCode) -> VoxsubResult<&'static str> {
    language_tag(language).ok_or_else(|| VoxsubError::unsupported_language(language.code()))
}

/// Encode texts as a big-endian length-prefixed batch.
///
/// `i32 count | (i32 len, utf-8 bytes) x count`
pub fn encode_batch<S: AsRef<str>>(texts: &[S]) -> Vec<u8> {
    let total = 4 + texts.iter().map(|t| 4 + t.as_ref().len()).sum::<usize>();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(texts.len() as i32).to_be_bytes());
    for text in texts {
        let bytes = text.as_ref().as_bytes();
        out.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
        out.extend_from_slice(bytes);
    }
    out
}

/// Inverse of [`encode_batch`].
pub fn decode_batch(bytes: &[u8]) -> VoxsubResult<Vec<String>> {
    fn read_len(bytes: &[u8], pos: &mut usize) -> VoxsubResult<usize> {
        let raw = bytes
            .get(*pos..*pos + 4)
            .ok_or_else(|| VoxsubError::translation("Batch buffer truncated"))?;
        *pos += 4;
        let value = i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        usize::try_from(value)
            .map_err(|_| VoxsubError::translation(format!("Negative length {value} in batch")))
    }

    let mut pos = 0;
    let count = read_len(bytes, &mut pos)?;
    let mut texts = Vec::with_capacity(count.min(bytes.len() / 4));
    for _ in 0..count {
        let len = read_len(bytes, &mut pos)?;
        let raw = bytes
            .get(pos..pos + len)
            .ok_or_else(|| VoxsubError::translation("Batch buffer truncated"))?;
        pos += len;
        let text = std::str::from_utf8(raw)
            .map_err(|e| VoxsubError::translation(format!("Batch text is not UTF-8: {e}")))?;
        texts.push(text.to_string());
    }
    Ok(texts)
}

fn is_text_line(index: usize) -> bool {
    (index + 1) % 4 == 3
}

pub enum TranslatorBackend {
    Light {
        factory: EngineFactory<Box<dyn LightModel>>,
        model: Option<Box<dyn LightModel>>,
    },
    Nmt {
        factory: EngineFactory<Box<dyn NmtModel>>,
        model: Option<Box<dyn NmtModel>>,
        max_output_length: usize,
    },
}

pub struct Translator {
    backend: TranslatorBackend,
}

impl Translator {
    pub fn light(factory: EngineFactory<Box<dyn LightModel>>) -> Self {
        Self {
            backend: TranslatorBackend::Light {
                factory,
                model: None,
            },
        }
    }

    pub fn nmt(factory: EngineFactory<Box<dyn NmtModel>>, max_output_length: usize) -> Self {
        Self {
            backend: TranslatorBackend::Nmt {
                factory,
                model: None,
                max_output_length,
            },
        }
    }

    pub fn kind(&self) -> TranslatorKind {
        match self.backend {
            TranslatorBackend::Light { .. } => TranslatorKind::Light,
            TranslatorBackend::Nmt { .. } => TranslatorKind::Nmt,
        }
    }

    pub fn is_initialized(&self) -> bool {
        match &self.backend {
            TranslatorBackend::Light { model, .. } => model.is_some(),
            TranslatorBackend::Nmt { model, .. } => model.is_some(),
        }
    }

    /// Open the engine; a no-op when it is already open.
    pub fn initialize(&mut self) -> VoxsubResult<()> {
        match &mut self.backend {
            TranslatorBackend::Light { factory, model } => {
                if model.is_none() {
                    *model = Some(factory().map_err(translation_error)?);
                }
            }
            TranslatorBackend::Nmt { factory, model, .. } => {
                if model.is_none() {
                    *model = Some(factory().map_err(translation_error)?);
                    tracing::info!("NMT translator initialized");
                }
            }
        }
        Ok(())
    }

    pub fn release(&mut self) {
        match &mut self.backend {
            TranslatorBackend::Light { model, .. } => *model = None,
            TranslatorBackend::Nmt { model, .. } => *model = None,
        }
    }

    pub fn translate(&mut self, text: &str, src: LanguageCode, tgt: LanguageCode) -> VoxsubResult<String> {
        let (src, tgt) = (tag_for(src)?, tag_for(tgt)?);
        self.initialize()?;
        if let TranslatorBackend::Light { model, .. } = &mut self.backend {
            let model = model.as_mut().ok_or_else(not_initialized)?;
            return model
                .translate(text, src, tgt)
                .map_err(translation_error)?
                .ok_or_else(|| VoxsubError::translation("Engine returned no translation"));
        }
        let mut out = self.batch(&[text], src, tgt)?;
        Ok(out.pop().unwrap_or_default())
    }

    /// Translate several texts, preserving order and count.
    pub fn translate_batch<S: AsRef<str>>(
        &mut self,
        texts: &[S],
        src: LanguageCode,
        tgt: LanguageCode,
    ) -> VoxsubResult<Vec<String>> {
        let (src_tag, tgt_tag) = (tag_for(src)?, tag_for(tgt)?);
        match self.kind() {
            TranslatorKind::Light => texts
                .iter()
                .map(|t| self.translate(t.as_ref(), src, tgt))
                .collect(),
            TranslatorKind::Nmt => {
                self.initialize()?;
                self.batch(texts, src_tag, tgt_tag)
            }
        }
    }

    /// Translate the text lines of an SRT file given as lines.
    ///
    /// The output has exactly as many lines as the input, and every
    /// non-text line is unchanged.
    pub fn translate_subtitle<S: AsRef<str>>(
        &mut self,
        lines: &[S],
        src: LanguageCode,
        tgt: LanguageCode,
    ) -> VoxsubResult<Vec<String>> {
        let texts: Vec<&str> = lines
            .iter()
            .enumerate()
            .filter(|(i, _)| is_text_line(*i))
            .map(|(_, line)| line.as_ref())
            .collect();

        let translated = match self.kind() {
            TranslatorKind::Light => self.translate_joined(&texts, src, tgt)?,
            TranslatorKind::Nmt => self.translate_batch(&texts, src, tgt)?,
        };
        tracing::debug!(
            lines = lines.len(),
            texts = texts.len(),
            backend = ?self.kind(),
            "Translated subtitle"
        );

        let mut translated = translated.into_iter();
        Ok(lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                if is_text_line(i) {
                    translated.next().unwrap_or_default()
                } else {
                    line.as_ref().to_string()
                }
            })
            .collect())
    }

    /// One call for the whole subtitle; pieces missing from the result come back empty.
    fn translate_joined(&mut self, texts: &[&str], src: LanguageCode, tgt: LanguageCode) -> VoxsubResult<Vec<String>> {
        if texts.is_empty() {
            tag_for(src)?;
            tag_for(tgt)?;
            return Ok(Vec::new());
        }
        let joined = texts
            .iter()
            .map(|t| t.replace(JOIN_SEPARATOR, " "))
            .collect::<Vec<_>>()
            .join(&JOIN_SEPARATOR.to_string());

        let result = self.translate(&joined, src, tgt)?;
        let mut pieces: Vec<String> = result
            .split(JOIN_SEPARATOR)
            .map(|p| p.trim().to_string())
            .collect();
        if pieces.len() != texts.len() {
            tracing::warn!(
                expected = texts.len(),
                got = pieces.len(),
                "Joined translation split into a different number of pieces"
            );
        }
        pieces.resize(texts.len(), String::new());
        Ok(pieces)
    }

    fn batch<S: AsRef<str>>(&mut self, texts: &[S], src: &str, tgt: &str) -> VoxsubResult<Vec<String>> {
        let TranslatorBackend::Nmt {
            model,
            max_output_length,
            ..
        } = &mut self.backend
        else {
            return Err(VoxsubError::translation("Batch call on a non-NMT backend"));
        };
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let model = model.as_mut().ok_or_else(not_initialized)?;

        let buffer = encode_batch(texts);
        let out = model
            .translate_batch(&buffer, src, tgt, *max_output_length)
            .map_err(translation_error)?
            .ok_or_else(|| VoxsubError::translation("Batch translation failed"))?;
        if out.len() != texts.len() {
            return Err(VoxsubError::translation(format!(
                "Batch translation returned {} texts for {}",
                out.len(),
                texts.len()
            )));
        }
        Ok(out)
    }
}

fn not_initialized() -> VoxsubError {
    VoxsubError::translation("Translator is not initialized")
}

fn translation_error(e: VoxsubError) -> VoxsubError {
    match e {
        e @ VoxsubError::TranslationFailed { .. } => e,
        other => VoxsubError::translation(other.to_string()),
    }
}
