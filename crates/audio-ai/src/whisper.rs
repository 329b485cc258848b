//! Whisper token vocabulary and timestamp-token decoding.
//!
//! The vocabulary file bundles the mel filterbank with the byte strings of
//! every text token:
//!
//! ```text
//! i32 magic | i32 n_mel | i32 n_fft | f32 x (n_mel * n_fft) | i32 n_vocab | (i32 len, u8 x len) x n_vocab
//! ```
//!
//! All integers and floats are little-endian.

use std::path::Path;

use voxsub_common::error::{VoxsubError, VoxsubResult};
use voxsub_common::language::LanguageCode;

use crate::mel::MelFilters;

pub const EOT: u32 = 50257;
pub const SOT: u32 = 50258;
pub const TRANSLATE: u32 = 50358;
pub const TRANSCRIBE: u32 = 50359;
pub const PREV: u32 = 50361;
pub const SOLM: u32 = 50362;
pub const NO_TIMESTAMPS: u32 = 50363;
/// First timestamp token, `0.00` seconds.
pub const BEGIN: u32 = 50364;
/// Last timestamp token, `30.00` seconds.
pub const END: u32 = 51864;
/// Vocabulary size of the multilingual models.
pub const MULTILINGUAL_VOCAB: u32 = 51865;

/// Seconds per timestamp token.
pub const TS_STEP: f64 = 0.02;

/// Seconds added to trailing text that never saw a closing timestamp.
pub const OPEN_SEGMENT_SECS: f64 = 30.0;

const MAGIC_GGML: u32 = 0x5753_5052;
const MAGIC_TFLITE: u32 = 0x5553_454e;

/// Language prompt token, `None` for automatic detection.
pub fn language_token(language: LanguageCode) -> Option<u32> {
    match language {
        LanguageCode::English => Some(50259),
        LanguageCode::Chinese => Some(50260),
        LanguageCode::Korean => Some(50264),
        LanguageCode::Japanese => Some(50266),
        LanguageCode::Auto => None,
    }
}

/// Decoder prompt: start-of-transcript, language, task.
pub fn prompt_tokens(language: LanguageCode) -> Vec<u32> {
    let mut prompt = vec![SOT];
    prompt.extend(language_token(language));
    prompt.push(TRANSCRIBE);
    prompt
}

/// Token byte strings plus the mel filterbank they ship with.
#[derive(Debug, Clone)]
pub struct WhisperVocab {
    filters: MelFilters,
    tokens: Vec<Vec<u8>>,
}

impl WhisperVocab {
    pub fn load(path: &Path) -> VoxsubResult<Self> {
        if !path.exists() {
            return Err(VoxsubError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let bytes = std::fs::read(path)?;
        let vocab = Self::from_bytes(&bytes)?;
        tracing::info!(
            path = %path.display(),
            tokens = vocab.tokens.len(),
            n_mel = vocab.filters.n_mel,
            "Loaded Whisper vocabulary"
        );
        Ok(vocab)
    }

    pub fn from_bytes(bytes: &[u8]) -> VoxsubResult<Self> {
        let mut reader = LeReader::new(bytes);

        let magic = reader.u32()?;
        if magic != MAGIC_GGML && magic != MAGIC_TFLITE {
            return Err(VoxsubError::engine_init(format!(
                "Invalid vocabulary file (bad magic {magic:#010x})"
            )));
        }

        let n_mel = reader.count()?;
        let n_fft = reader.count()?;
        let filter_len = n_mel
            .checked_mul(n_fft)
            .ok_or_else(|| VoxsubError::engine_init("Mel filterbank size overflows"))?;
        let mut data = Vec::with_capacity(filter_len);
        for _ in 0..filter_len {
            data.push(reader.f32()?);
        }
        let filters = MelFilters::new(n_mel, n_fft, data)?;

        let n_vocab = reader.count()?;
        let mut tokens = Vec::with_capacity(n_vocab.max(MULTILINGUAL_VOCAB as usize));
        for _ in 0..n_vocab {
            let len = reader.count()?;
            tokens.push(reader.bytes(len)?.to_vec());
        }

        for id in tokens.len() as u32..MULTILINGUAL_VOCAB {
            tokens.push(special_token_text(id).into_bytes());
        }

        Ok(Self { filters, tokens })
    }

    pub fn filters(&self) -> &MelFilters {
        &self.filters
    }

    /// Raw bytes of a token; text tokens are not guaranteed to be valid UTF-8 on their own.
    pub fn token_bytes(&self, id: u32) -> Option<&[u8]> {
        self.tokens.get(id as usize).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

fn special_token_text(id: u32) -> String {
    match id {
        id if id > BEGIN => format!("[_TT_{}]", id - BEGIN),
        EOT => "[_EOT_]".to_string(),
        SOT => "[_SOT_]".to_string(),
        PREV => "[_PREV_]".to_string(),
        NO_TIMESTAMPS => "[_NOT_]".to_string(),
        BEGIN => "[_BEG_]".to_string(),
        id => format!("[_extra_token_{id}]"),
    }
}

struct LeReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> LeReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn bytes(&mut self, len: usize) -> VoxsubResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| {
                VoxsubError::engine_init(format!(
                    "Vocabulary file truncated at byte {}",
                    self.pos
                ))
            })?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> VoxsubResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> VoxsubResult<u32> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn f32(&mut self) -> VoxsubResult<f32> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// A non-negative i32 count.
    fn count(&mut self) -> VoxsubResult<usize> {
        let value = i32::from_le_bytes(self.array()?);
        usize::try_from(value)
            .map_err(|_| VoxsubError::engine_init(format!("Negative length {value} in vocabulary")))
    }
}

/// One decoded block, times in absolute seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedText {
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// Turn a timestamped token stream into text blocks.
///
/// Text tokens accumulate raw bytes until a timestamp token closes them;
/// the closing timestamp also opens the next block. Decoding stops at
/// end-of-text. Text still open at the end runs for
/// [`OPEN_SEGMENT_SECS`] past its start.
pub fn decode_timestamped(tokens: &[u32], vocab: &WhisperVocab, offset_secs: f64) -> Vec<TimedText> {
    let mut blocks = Vec::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut start: Option<f64> = None;

    let mut emit = |start: f64, end: f64, bytes: &[u8]| {
        let text = String::from_utf8_lossy(bytes).trim().to_string();
        blocks.push(TimedText {
            start_secs: start,
            end_secs: end,
            text,
        });
    };

    for &token in tokens {
        match token {
            t if t < EOT => {
                if let Some(bytes) = vocab.token_bytes(t) {
                    pending.extend_from_slice(bytes);
                }
            }
            EOT => break,
            BEGIN..=END => {
                let ts = TS_STEP * f64::from(token - BEGIN) + offset_secs;
                if let Some(open) = start {
                    if !pending.is_empty() {
                        emit(open, ts, &pending);
                    }
                    pending.clear();
                }
                start = Some(ts);
            }
            _ => {}
        }
    }

    if let Some(open) = start {
        if !pending.is_empty() {
            emit(open, open + OPEN_SEGMENT_SECS, &pending);
        }
    }

    blocks
}
