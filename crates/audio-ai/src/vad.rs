//! Voice activity detection over fixed-size windows.
//!
//! The detector is a two-state machine (`Silence`, `InSpeech`) fed one
//! window at a time. Completed speech segments are queued and drained by
//! the caller; several can become available from a single window.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use voxsub_common::error::{VoxsubError, VoxsubResult};

/// Detector thresholds, durations in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadConfig {
    /// Speech probability at or above which a window counts as speech.
    pub threshold: f32,
    pub min_silence_duration: f32,
    pub min_speech_duration: f32,
    /// Speech longer than this is cut into several segments.
    pub max_speech_duration: f32,
    /// Samples per window.
    pub window_size: usize,
    pub sample_rate: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            min_silence_duration: 0.1,
            min_speech_duration: 0.1,
            max_speech_duration: 9.5,
            window_size: 512,
            sample_rate: 16_000,
        }
    }
}

impl VadConfig {
    pub fn validate(&self) -> VoxsubResult<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(VoxsubError::vad_config(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        for (name, value) in [
            ("min_silence_duration", self.min_silence_duration),
            ("min_speech_duration", self.min_speech_duration),
            ("max_speech_duration", self.max_speech_duration),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(VoxsubError::vad_config(format!(
                    "{name} must be a non-negative number of seconds, got {value}"
                )));
            }
        }
        if self.max_speech_duration <= 0.0 || self.max_speech_duration < self.min_speech_duration {
            return Err(VoxsubError::vad_config(
                "max_speech_duration must be positive and not below min_speech_duration",
            ));
        }
        if self.window_size == 0 || self.sample_rate == 0 {
            return Err(VoxsubError::vad_config(
                "window_size and sample_rate must be non-zero",
            ));
        }
        Ok(())
    }

    fn samples_for(&self, seconds: f32) -> u64 {
        (f64::from(seconds) * f64::from(self.sample_rate)).ceil() as u64
    }
}

/// Per-window speech probability.
pub trait SpeechScorer: Send {
    /// Probability in [0, 1] that `window` contains speech.
    fn score(&mut self, window: &[f32]) -> VoxsubResult<f32>;

    /// Drop any recurrent state between streams.
    fn reset(&mut self) {}
}

/// RMS energy used directly as the speech probability.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyScorer;

impl SpeechScorer for EnergyScorer {
    fn score(&mut self, window: &[f32]) -> VoxsubResult<f32> {
        if window.is_empty() {
            return Ok(0.0);
        }
        let sum_sq: f32 = window.iter().map(|s| s * s).sum();
        let rms = (sum_sq / window.len() as f32).sqrt();
        Ok(if rms.is_finite() { rms.clamp(0.0, 1.0) } else { 0.0 })
    }
}

/// A contiguous run of detected speech.
///
/// Sample indices are relative to the start of the stream; `end_sample`
/// is exclusive.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSegment {
    pub start_sample: u64,
    pub end_sample: u64,
    pub samples: Vec<f32>,
}

impl SpeechSegment {
    pub fn start_secs(&self, sample_rate: u32) -> f64 {
        self.start_sample as f64 / f64::from(sample_rate)
    }

    pub fn duration_secs(&self, sample_rate: u32) -> f64 {
        (self.end_sample - self.start_sample) as f64 / f64::from(sample_rate)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    Silence,
    InSpeech,
}

pub struct VoiceActivityDetector {
    config: VadConfig,
    scorer: Box<dyn SpeechScorer>,
    state: VadState,
    min_speech_samples: u64,
    min_silence_samples: u64,
    max_speech_samples: u64,
    /// Samples consumed so far.
    position: u64,
    /// Start of the current speech candidate or segment.
    run_start: u64,
    /// Speech windows seen while still in `Silence`.
    pending: Vec<f32>,
    current: Vec<f32>,
    /// Trailing below-threshold samples at the end of `current`.
    silence_run: u64,
    segments: VecDeque<SpeechSegment>,
}

impl VoiceActivityDetector {
    /// Detector backed by [`EnergyScorer`].
    pub fn new(config: VadConfig) -> VoxsubResult<Self> {
        Self::with_scorer(config, Box::new(EnergyScorer))
    }

    pub fn with_scorer(config: VadConfig, scorer: Box<dyn SpeechScorer>) -> VoxsubResult<Self> {
        config.validate()?;
        Ok(Self {
            min_speech_samples: config.samples_for(config.min_speech_duration),
            min_silence_samples: config.samples_for(config.min_silence_duration),
            max_speech_samples: config.samples_for(config.max_speech_duration).max(1),
            config,
            scorer,
            state: VadState::Silence,
            position: 0,
            run_start: 0,
            pending: Vec::new(),
            current: Vec::new(),
            silence_run: 0,
            segments: VecDeque::new(),
        })
    }

    pub fn config(&self) -> &VadConfig {
        &self.config
    }

    pub fn state(&self) -> VadState {
        self.state
    }

    /// Feed one window. A short final window is accepted as-is.
    pub fn accept_window(&mut self, window: &[f32]) -> VoxsubResult<()> {
        if window.is_empty() {
            return Ok(());
        }
        let probability = self.scorer.score(window)?;
        let is_speech = probability >= self.config.threshold;
        let len = window.len() as u64;

        match self.state {
            VadState::Silence => {
                if is_speech {
                    if self.pending.is_empty() {
                        self.run_start = self.position;
                    }
                    self.pending.extend_from_slice(window);
                    if self.pending.len() as u64 >= self.min_speech_samples {
                        self.current = std::mem::take(&mut self.pending);
                        self.silence_run = 0;
                        self.state = VadState::InSpeech;
                        tracing::trace!(start = self.run_start, "Speech started");
                    }
                } else {
                    self.pending.clear();
                }
            }
            VadState::InSpeech => {
                self.current.extend_from_slice(window);
                if is_speech {
                    self.silence_run = 0;
                } else {
                    self.silence_run += len;
                }

                if self.silence_run >= self.min_silence_samples && self.silence_run > 0 {
                    self.close_segment(true);
                } else if self.current.len() as u64 >= self.max_speech_samples {
                    tracing::debug!(
                        start = self.run_start,
                        samples = self.current.len(),
                        "Forced segment cut at max speech duration"
                    );
                    self.close_segment(false);
                }
            }
        }

        self.position += len;
        Ok(())
    }

    /// Emit the in-progress segment, if any, at end of stream.
    pub fn flush(&mut self) {
        if self.state == VadState::InSpeech {
            self.close_segment(true);
        }
        self.pending.clear();
    }

    pub fn has_segment(&self) -> bool {
        !self.segments.is_empty()
    }

    /// Oldest completed segment without removing it.
    pub fn front(&self) -> Option<&SpeechSegment> {
        self.segments.front()
    }

    pub fn pop_segment(&mut self) -> Option<SpeechSegment> {
        self.segments.pop_front()
    }

    /// Return to the initial state, discarding queued segments.
    pub fn reset(&mut self) {
        self.state = VadState::Silence;
        self.position = 0;
        self.run_start = 0;
        self.pending.clear();
        self.current.clear();
        self.silence_run = 0;
        self.segments.clear();
        self.scorer.reset();
    }

    fn close_segment(&mut self, trim_silence: bool) {
        let mut samples = std::mem::take(&mut self.current);
        if trim_silence {
            let keep = samples.len().saturating_sub(self.silence_run as usize);
            samples.truncate(keep);
        }
        self.state = VadState::Silence;
        self.silence_run = 0;

        if samples.is_empty() {
            return;
        }
        let segment = SpeechSegment {
            start_sample: self.run_start,
            end_sample: self.run_start + samples.len() as u64,
            samples,
        };
        tracing::trace!(
            start = segment.start_sample,
            end = segment.end_sample,
            "Speech segment closed"
        );
        self.segments.push_back(segment);
    }
}
