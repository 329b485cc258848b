//! SubRip (SRT) assembly and parsing.
//!
//! Blocks are written as `index\nHH:MM:SS,mmm --> HH:MM:SS,mmm\ntext\n\n`.
//! Text is kept on a single line so every block spans exactly four
//! lines, which the line-oriented translation path relies on.

use std::fmt::Write as _;
use std::sync::OnceLock;

use regex::Regex;
use voxsub_common::error::{VoxsubError, VoxsubResult};

/// Offset added when SRT text carries no timestamp at all.
pub const FALLBACK_ADVANCE_SECS: f64 = 30.0;

/// One numbered subtitle block.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleBlock {
    pub index: u32,
    pub start_secs: f64,
    pub end_secs: f64,
    pub text: String,
}

/// Seconds to whole milliseconds; negative and non-finite input maps to 0.
fn to_millis(secs: f64) -> u64 {
    if secs.is_finite() && secs > 0.0 {
        (secs * 1000.0).round() as u64
    } else {
        0
    }
}

/// Format seconds as SRT timestamp: HH:MM:SS,mmm
pub fn format_srt_time(secs: f64) -> String {
    format_srt_millis(to_millis(secs))
}

fn format_srt_millis(total_ms: u64) -> String {
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1000;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// Parse an SRT timestamp (`HH:MM:SS,mmm`) into seconds.
pub fn parse_srt_time(s: &str) -> Option<f64> {
    let (hms, millis) = s.trim().split_once(',')?;
    let mut parts = hms.split(':');
    let hours: u64 = parts.next()?.parse().ok()?;
    let minutes: u64 = parts.next()?.parse().ok()?;
    let seconds: u64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || millis.len() != 3 {
        return None;
    }
    let millis: u64 = millis.parse().ok()?;
    let total = hours
        .checked_mul(3600)?
        .checked_add(minutes.checked_mul(60)?)?
        .checked_add(seconds)?;
    Some(total as f64 + millis as f64 / 1000.0)
}

fn end_time_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"-->\s*(\d{2,}):(\d{2}):(\d{2}),(\d{3})").ok())
        .as_ref()
}

/// Find the last block end time in `srt` and the index of that block.
///
/// The index is the last purely numeric line before the final `-->`.
/// Returns `None` when the text has no timestamp.
pub fn last_position(srt: &str) -> Option<(Option<u32>, f64)> {
    let caps = end_time_pattern()?.captures_iter(srt).last()?;
    let field = |i: usize| -> f64 {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0) as f64
    };
    let end = field(1) * 3600.0 + field(2) * 60.0 + field(3) + field(4) / 1000.0;

    let arrow = caps.get(0).map(|m| m.start()).unwrap_or(0);
    let index = srt[..arrow]
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty() && line.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|line| line.parse().ok());

    Some((index, end))
}

/// Running position across recognizer flushes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SrtCursor {
    /// Index of the last emitted block, 0 before the first.
    pub index: u32,

    /// Seconds added to model-relative timestamps.
    pub offset_secs: f64,
}

impl SrtCursor {
    /// Re-derive the cursor from SRT text produced since the last update.
    ///
    /// With a timestamp present, the offset moves to the last end time and
    /// the index to that block's number. Without one, the offset advances
    /// by [`FALLBACK_ADVANCE_SECS`] and the index is left alone.
    ///
    /// The fallback hides chunks whose timestamps were never detected;
    /// callers that know the true chunk position should seek to it before
    /// the next chunk.
    pub fn advance_from(&mut self, srt: &str) {
        match last_position(srt) {
            Some((index, end)) => {
                if let Some(index) = index {
                    self.index = self.index.max(index);
                }
                self.offset_secs = self.offset_secs.max(end);
            }
            None => {
                self.offset_secs += FALLBACK_ADVANCE_SECS;
            }
        }
    }

    /// Place the offset at an externally known position, such as the
    /// start of the next chunk in the source.
    pub fn seek(&mut self, offset_secs: f64) {
        if offset_secs.is_finite() {
            self.offset_secs = offset_secs.max(0.0);
        }
    }
}

/// Accumulates recognized text as numbered SRT blocks.
#[derive(Debug, Default)]
pub struct SrtAssembler {
    cursor: SrtCursor,
    text: String,
}

impl SrtAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self) -> SrtCursor {
        self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut SrtCursor {
        &mut self.cursor
    }

    /// Text accumulated since the last [`take`](Self::take).
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Append one block with absolute times in seconds.
    ///
    /// Blank text is skipped. Line breaks are folded into spaces, negative
    /// times clamp to zero, and an end not after the start is nudged
    /// forward by one millisecond. Returns the emitted index.
    pub fn push(&mut self, start_secs: f64, end_secs: f64, text: &str) -> Option<u32> {
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            return None;
        }

        let start = to_millis(start_secs);
        let end = to_millis(end_secs).max(start + 1);

        self.cursor.index += 1;
        let index = self.cursor.index;
        let _ = write!(
            self.text,
            "{index}\n{} --> {}\n{text}\n\n",
            format_srt_millis(start),
            format_srt_millis(end)
        );
        Some(index)
    }

    /// Append SRT text produced elsewhere and re-derive the cursor from it.
    pub fn append_rendered(&mut self, srt: &str) {
        self.text.push_str(srt);
        self.cursor.advance_from(srt);
    }

    /// Return and clear the accumulated text.
    ///
    /// The block index restarts at 0; the time offset is kept because it
    /// tracks the absolute position in the source audio.
    pub fn take(&mut self) -> String {
        self.cursor.index = 0;
        std::mem::take(&mut self.text)
    }
}

/// A parsed SRT document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubtitleDocument {
    pub blocks: Vec<SubtitleBlock>,
}

impl SubtitleDocument {
    /// Parse block-structured SRT text.
    ///
    /// Blocks are separated by blank lines; multi-line text is joined
    /// with `\n`.
    pub fn parse(srt: &str) -> VoxsubResult<Self> {
        let mut blocks = Vec::new();
        let mut lines = srt.lines().map(|l| l.trim_end_matches('\r')).peekable();

        loop {
            while lines.peek().is_some_and(|l| l.trim().is_empty()) {
                lines.next();
            }
            let Some(index_line) = lines.next() else {
                break;
            };
            let index: u32 = index_line.trim().parse().map_err(|_| {
                VoxsubError::subtitle(format!("Invalid SRT index line: {index_line:?}"))
            })?;

            let time_line = lines
                .next()
                .ok_or_else(|| VoxsubError::subtitle(format!("SRT block {index} has no timing")))?;
            let (start, end) = time_line
                .split_once("-->")
                .and_then(|(a, b)| Some((parse_srt_time(a)?, parse_srt_time(b)?)))
                .ok_or_else(|| {
                    VoxsubError::subtitle(format!("Invalid SRT timing line: {time_line:?}"))
                })?;

            let mut text_lines = Vec::new();
            while let Some(line) = lines.peek() {
                if line.trim().is_empty() {
                    break;
                }
                text_lines.push(*line);
                lines.next();
            }

            blocks.push(SubtitleBlock {
                index,
                start_secs: start,
                end_secs: end,
                text: text_lines.join("\n"),
            });
        }

        Ok(Self { blocks })
    }

    /// Render back to SRT text.
    pub fn render(&self) -> String {
        let mut output = String::new();
        for block in &self.blocks {
            let _ = write!(
                output,
                "{}\n{} --> {}\n{}\n\n",
                block.index,
                format_srt_time(block.start_secs),
                format_srt_time(block.end_secs),
                block.text
            );
        }
        output
    }

    /// Block texts, in order.
    pub fn texts(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.text.as_str()).collect()
    }
}
