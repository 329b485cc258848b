//! Job state, progress publishing, and the final report.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use voxsub_common::language::LanguageCode;

/// Where a transcription job is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// No job has started.
    Idle,
    /// Resolving the video and decoding its audio track.
    Extracting,
    /// Speech segments are being recognized.
    Recognizing,
    /// Translating the stored source subtitle.
    Translating,
    /// Writing subtitle files.
    Persisting,
    Done,
    Cancelled,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

/// Outcome of a finished job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    /// The source subtitle was stored but translation failed.
    Partial,
    Failed,
    Cancelled,
}

/// Summary of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub video_id: String,
    pub status: JobStatus,
    /// Error message for anything but `Success`.
    pub cause: Option<String>,
    /// The source-language SRT, when recognition got that far.
    pub subtitle: Option<String>,
    pub source_language: Option<LanguageCode>,
    /// Subtitle file ids written, source first.
    pub files: Vec<String>,
    pub segments_recognized: u64,
    /// Segments whose recognition failed and were left out.
    pub segments_skipped: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl JobReport {
    pub(crate) fn new(video_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            video_id: video_id.to_string(),
            status: JobStatus::Failed,
            cause: None,
            subtitle: None,
            source_language: None,
            files: Vec::new(),
            segments_recognized: 0,
            segments_skipped: 0,
            started_at,
            finished_at: started_at,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
    }
}

/// Progress never exceeds this before the job is done.
pub const PROGRESS_CAP: f32 = 0.9;

/// Shared publisher for job state and progress.
#[derive(Clone)]
pub(crate) struct JobSignals {
    state: Arc<watch::Sender<JobState>>,
    progress: Arc<watch::Sender<f32>>,
}

impl JobSignals {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(watch::channel(JobState::Idle).0),
            progress: Arc::new(watch::channel(0.0).0),
        }
    }

    pub(crate) fn subscribe_state(&self) -> watch::Receiver<JobState> {
        self.state.subscribe()
    }

    pub(crate) fn subscribe_progress(&self) -> watch::Receiver<f32> {
        self.progress.subscribe()
    }

    pub(crate) fn set_state(&self, state: JobState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            tracing::debug!(from = ?*current, to = ?state, "Job state changed");
            *current = state;
            true
        });
    }

    /// Start a new job at zero progress.
    pub(crate) fn reset_progress(&self) {
        self.progress.send_replace(0.0);
    }

    /// Publish `processed / expected`, capped and never decreasing.
    pub(crate) fn report_bytes(&self, processed: u64, expected: u64) {
        if expected == 0 {
            return;
        }
        let fraction = (processed as f64 / expected as f64) as f32;
        self.advance(fraction.min(PROGRESS_CAP));
    }

    pub(crate) fn complete(&self) {
        self.advance(1.0);
    }

    fn advance(&self, value: f32) {
        self.progress.send_if_modified(|current| {
            if value > *current {
                *current = value;
                true
            } else {
                false
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_progress_is_capped_and_monotonic() {
        let signals = JobSignals::new();
        let rx = signals.subscribe_progress();

        signals.report_bytes(50, 100);
        assert_eq!(*rx.borrow(), 0.5);

        signals.report_bytes(40, 100);
        assert_eq!(*rx.borrow(), 0.5);

        signals.report_bytes(150, 100);
        assert_eq!(*rx.borrow(), PROGRESS_CAP);

        signals.report_bytes(10, 0);
        assert_eq!(*rx.borrow(), PROGRESS_CAP);

        signals.complete();
        assert_eq!(*rx.borrow(), 1.0);

        signals.reset_progress();
        assert_eq!(*rx.borrow(), 0.0);
    }

    #[test]
    fn test_state_changes_are_published() {
        let signals = JobSignals::new();
        let mut rx = signals.subscribe_state();
        assert_eq!(*rx.borrow_and_update(), JobState::Idle);

        signals.set_state(JobState::Extracting);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), JobState::Extracting);

        signals.set_state(JobState::Extracting);
        assert!(!rx.has_changed().unwrap());
        assert_eq!(*rx.borrow(), JobState::Extracting);
        assert!(!rx.borrow().is_terminal());
        assert!(JobState::Cancelled.is_terminal());
    }

    #[test]
    fn test_report_serializes_with_timestamps() {
        let started = Utc::now();
        let mut report = JobReport::new("clip", started);
        report.status = JobStatus::Partial;
        report.source_language = Some(LanguageCode::Japanese);
        report.finished_at = started + chrono::Duration::milliseconds(1500);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "partial");
        assert_eq!(json["source_language"], "ja");
        assert!((report.duration_secs() - 1.5).abs() < 1e-9);
    }

    proptest! {
        #[test]
        fn prop_progress_never_decreases(
            expected in 1u64..1_000_000,
            steps in prop::collection::vec(0u64..2_000_000, 1..50)
        ) {
            let signals = JobSignals::new();
            let rx = signals.subscribe_progress();
            let mut last = 0.0f32;
            for processed in steps {
                signals.report_bytes(processed, expected);
                let now = *rx.borrow();
                prop_assert!(now >= last);
                prop_assert!(now <= PROGRESS_CAP);
                last = now;
            }
        }
    }
}
