//! Transcription job orchestration.
//!
//! A job runs three stages at once, connected by bounded queues:
//!
//! 1. **Decode** (blocking thread): pull PCM chunks, publish byte
//!    progress, normalize to 16 kHz mono
//! 2. **Segment** (async task): window the samples and run the VAD
//! 3. **Recognize** (blocking thread): transcribe each segment into the
//!    recognizer's SRT text
//!
//! Once the stages drain, the subtitle is stored under its detected
//! language and, when a different target language is configured,
//! translated and stored again.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use voxsub_audio_ai::{
    SpeechRecognizer, SpeechScorer, SpeechSegment, SubtitleDocument, Translator,
    VoiceActivityDetector, WindowBuffer,
};
use voxsub_common::error::{VoxsubError, VoxsubResult};
use voxsub_common::language::LanguageCode;
use voxsub_media::{normalize, write_wav, DecoderConfig, TARGET_SAMPLE_RATE};

use crate::collab::{
    subtitle_file_name, AudioSourceFactory, LanguageDetector, ModelAssets, SubtitleStore,
    VideoSource,
};
use crate::config::VoxsubConfig;
use crate::job::{JobReport, JobSignals, JobState, JobStatus};

/// Builds a model-backed speech scorer from its weights file.
pub type ScorerLoader = Box<dyn Fn(&Path) -> VoxsubResult<Box<dyn SpeechScorer>> + Send + Sync>;

/// The outside world a job talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub videos: Arc<dyn VideoSource>,
    pub audio: Arc<dyn AudioSourceFactory>,
    pub assets: Arc<dyn ModelAssets>,
    pub store: Arc<dyn SubtitleStore>,
    pub detector: Arc<dyn LanguageDetector>,
}

#[derive(Debug, Default, Clone, Copy)]
struct RecognizeStats {
    recognized: u64,
    skipped: u64,
}

/// Runs transcription jobs, one at a time.
///
/// Engines are loaded on the first job and kept while jobs succeed. A
/// failed or cancelled job releases them; dropping the orchestrator
/// releases them too.
pub struct TranscriptionOrchestrator {
    config: VoxsubConfig,
    collaborators: Collaborators,
    recognizer: Arc<Mutex<SpeechRecognizer>>,
    translator: Option<Arc<Mutex<Translator>>>,
    scorer_loader: Option<ScorerLoader>,
    signals: JobSignals,
    cancel: CancellationToken,
}

impl TranscriptionOrchestrator {
    pub fn new(config: VoxsubConfig, collaborators: Collaborators, recognizer: SpeechRecognizer) -> Self {
        if recognizer.kind() != config.recognizer.kind {
            tracing::warn!(
                configured = ?config.recognizer.kind,
                actual = ?recognizer.kind(),
                "Recognizer backend differs from configuration"
            );
        }
        Self {
            config,
            collaborators,
            recognizer: Arc::new(Mutex::new(recognizer)),
            translator: None,
            scorer_loader: None,
            signals: JobSignals::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Enable translation into `translation.target_language`.
    pub fn with_translator(mut self, translator: Translator) -> Self {
        if translator.kind() != self.config.translation.backend {
            tracing::warn!(
                configured = ?self.config.translation.backend,
                actual = ?translator.kind(),
                "Translator backend differs from configuration"
            );
        }
        self.translator = Some(Arc::new(Mutex::new(translator)));
        self
    }

    /// Score VAD windows with a model loaded from `ModelAssets::vad_model`
    /// instead of signal energy.
    pub fn with_scorer_loader(mut self, loader: ScorerLoader) -> Self {
        self.scorer_loader = Some(loader);
        self
    }

    pub fn config(&self) -> &VoxsubConfig {
        &self.config
    }

    /// Job progress in [0, 1].
    pub fn progress(&self) -> watch::Receiver<f32> {
        self.signals.subscribe_progress()
    }

    pub fn state(&self) -> watch::Receiver<JobState> {
        self.signals.subscribe_state()
    }

    /// Token that cancels the running job and any later one.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        tracing::info!("Cancelling transcription");
        self.cancel.cancel();
    }

    /// Drop loaded engine sessions. They are reloaded by the next job.
    pub fn release(&mut self) {
        lock_engine(&self.recognizer).release();
        if let Some(translator) = &self.translator {
            lock_engine(translator).release();
        }
    }

    /// Transcribe one video. Never panics on job failure; the outcome is
    /// in the report.
    pub async fn run(&mut self, video_id: &str) -> JobReport {
        let mut report = JobReport::new(video_id, Utc::now());
        self.signals.reset_progress();
        self.signals.set_state(JobState::Extracting);
        tracing::info!(video_id, "Transcription job started");

        match self.execute(video_id, &mut report).await {
            Ok(status) => report.status = status,
            Err(e) => {
                tracing::error!(video_id, error = %e, "Transcription job failed");
                report.status = JobStatus::Failed;
                report.cause = Some(e.to_string());
            }
        }

        let state = match report.status {
            JobStatus::Success | JobStatus::Partial => {
                self.signals.complete();
                JobState::Done
            }
            JobStatus::Cancelled => {
                self.release();
                report.cause.get_or_insert_with(|| VoxsubError::Cancelled.to_string());
                JobState::Cancelled
            }
            JobStatus::Failed => {
                self.release();
                JobState::Failed
            }
        };
        self.signals.set_state(state);
        report.finished_at = Utc::now();

        tracing::info!(
            video_id,
            status = ?report.status,
            segments = report.segments_recognized,
            skipped = report.segments_skipped,
            duration_secs = report.duration_secs(),
            "Transcription job finished"
        );
        report
    }

    async fn execute(&mut self, video_id: &str, report: &mut JobReport) -> VoxsubResult<JobStatus> {
        if self.cancel.is_cancelled() {
            return Ok(JobStatus::Cancelled);
        }
        self.config.validate()?;
        let vad = self.build_vad()?;
        let locator = self.collaborators.videos.resolve(video_id).await?;
        self.prepare_recognizer()?;

        let srt = match self.recognize_all(locator, vad, report).await? {
            Some(srt) => srt,
            None => return Ok(JobStatus::Cancelled),
        };

        let language = self.source_language(&srt).await?;
        report.source_language = Some(language);

        self.signals.set_state(JobState::Persisting);
        let source_file = subtitle_file_name(video_id, language);
        if !self.collaborators.store.write(&source_file, &srt).await {
            return Err(VoxsubError::persistence(format!("Could not store {source_file}")));
        }
        report.files.push(source_file.clone());
        tracing::info!(file = %source_file, "Stored subtitle");

        let target = self
            .config
            .translation
            .target_language
            .filter(|target| target.is_concrete() && *target != language);
        let Some(target) = target else {
            return Ok(JobStatus::Success);
        };
        if self.cancel.is_cancelled() {
            return Ok(JobStatus::Cancelled);
        }

        match self.translate_stored(video_id, &source_file, language, target).await {
            Ok(Some(file)) => {
                report.files.push(file);
                Ok(JobStatus::Success)
            }
            Ok(None) => Ok(JobStatus::Cancelled),
            Err(e) => {
                tracing::warn!(error = %e, language = %target.code(), "Translation failed; keeping source subtitle");
                report.cause = Some(e.to_string());
                Ok(JobStatus::Partial)
            }
        }
    }

    fn build_vad(&self) -> VoxsubResult<VoiceActivityDetector> {
        let config = self.config.vad;
        match (&self.scorer_loader, self.collaborators.assets.vad_model()) {
            (Some(loader), Some(path)) => {
                let scorer = loader(&path).map_err(|e| {
                    VoxsubError::engine_init(format!("VAD model {}: {e}", path.display()))
                })?;
                VoiceActivityDetector::with_scorer(config, scorer)
            }
            _ => VoiceActivityDetector::new(config),
        }
    }

    fn prepare_recognizer(&mut self) -> VoxsubResult<()> {
        let mut recognizer = lock_engine(&self.recognizer);
        if !recognizer.is_initialized() {
            let model = self.collaborators.assets.recognizer_model();
            let vocab = self.collaborators.assets.recognizer_vocab();
            recognizer.initialize(&model, vocab.as_deref())?;
        }
        recognizer.reset();
        Ok(())
    }

    /// Run the three stages to completion. `None` means the job was cancelled.
    async fn recognize_all(
        &mut self,
        locator: String,
        vad: VoiceActivityDetector,
        report: &mut JobReport,
    ) -> VoxsubResult<Option<String>> {
        // Stage failures cancel their siblings without cancelling the job.
        let stages = self.cancel.child_token();
        let (sample_tx, sample_rx) = mpsc::channel(self.config.pipeline.sample_queue_capacity);
        let (segment_tx, segment_rx) = mpsc::channel(self.config.pipeline.segment_queue_capacity);

        let decode = {
            let audio = Arc::clone(&self.collaborators.audio);
            let decoder = self.config.decoder.clone();
            let cancel = stages.clone();
            let signals = self.signals.clone();
            tokio::task::spawn_blocking(move || {
                let result = decode_stage(audio.as_ref(), &locator, &decoder, &cancel, &sample_tx, &signals);
                if result.is_err() {
                    cancel.cancel();
                }
                result
            })
        };

        let segment = {
            let cancel = stages.clone();
            tokio::spawn(async move {
                let result = vad_stage(vad, sample_rx, segment_tx, &cancel).await;
                if result.is_err() {
                    cancel.cancel();
                }
                result
            })
        };

        let recognize = {
            let cancel = stages.clone();
            let signals = self.signals.clone();
            let language = self.config.recognizer.language;
            let capture_dir = self.config.pipeline.debug_capture_dir.clone();
            let recognizer = Arc::clone(&self.recognizer);
            tokio::task::spawn_blocking(move || {
                let mut recognizer = lock_engine(&recognizer);
                let mut stats = RecognizeStats::default();
                let result = recognize_stage(
                    &mut recognizer,
                    &mut stats,
                    segment_rx,
                    language,
                    capture_dir.as_deref(),
                    &cancel,
                    &signals,
                );
                if result.is_err() {
                    cancel.cancel();
                }
                (stats, result)
            })
        };

        let (decoded, segmented, recognized) = tokio::join!(decode, segment, recognize);

        let srt = lock_engine(&self.recognizer).result();
        report.subtitle = Some(srt.clone());
        let (stats, recognized) = recognized.map_err(|e| task_failed("recognition", e))?;
        report.segments_recognized = stats.recognized;
        report.segments_skipped = stats.skipped;

        if self.cancel.is_cancelled() {
            tracing::info!(
                recognized = stats.recognized,
                "Transcription cancelled; keeping recognized text"
            );
            return Ok(None);
        }

        let decoded_bytes = decoded.map_err(|e| task_failed("decode", e))??;
        segmented.map_err(|e| task_failed("segmentation", e))??;
        recognized?;

        tracing::debug!(
            decoded_bytes,
            recognized = stats.recognized,
            skipped = stats.skipped,
            "Recognition finished"
        );
        Ok(Some(srt))
    }

    async fn source_language(&self, srt: &str) -> VoxsubResult<LanguageCode> {
        let configured = self.config.recognizer.language;
        if configured.is_concrete() {
            return Ok(configured);
        }

        let text = match SubtitleDocument::parse(srt) {
            Ok(document) => document.texts().join("\n"),
            Err(e) => {
                tracing::warn!(error = %e, "Recognized subtitle did not parse; detecting on raw text");
                srt.to_string()
            }
        };
        let detected = self.collaborators.detector.detect(&text).await?;
        if !detected.is_concrete() {
            return Err(VoxsubError::unsupported_language(detected.code()));
        }
        tracing::info!(language = %detected.code(), "Detected subtitle language");
        Ok(detected)
    }

    /// Translate a stored subtitle and store the result. `None` means the
    /// job was cancelled before the translation was stored.
    async fn translate_stored(
        &mut self,
        video_id: &str,
        source_file: &str,
        source: LanguageCode,
        target: LanguageCode,
    ) -> VoxsubResult<Option<String>> {
        self.signals.set_state(JobState::Translating);

        let lines = self
            .collaborators
            .store
            .read_lines(source_file)
            .await
            .ok_or_else(|| VoxsubError::persistence(format!("Could not read back {source_file}")))?;
        let translator = self
            .translator
            .clone()
            .ok_or_else(|| VoxsubError::translation("No translator configured"))?;

        let task = {
            let translator = Arc::clone(&translator);
            tokio::task::spawn_blocking(move || {
                lock_engine(&translator).translate_subtitle(&lines, source, target)
            })
        };
        let translated = match task.await {
            Ok(translated) => translated?,
            Err(e) => {
                // The session may be half-torn; the next job reloads it.
                lock_engine(&translator).release();
                return Err(task_failed("translation", e));
            }
        };

        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        self.signals.set_state(JobState::Persisting);
        let target_file = subtitle_file_name(video_id, target);
        if !self
            .collaborators
            .store
            .write(&target_file, &translated.join("\n"))
            .await
        {
            return Err(VoxsubError::persistence(format!("Could not store {target_file}")));
        }
        tracing::info!(file = %target_file, "Stored translated subtitle");
        Ok(Some(target_file))
    }
}

/// Lock an engine, taking it over from a task that panicked while
/// holding it. Callers release such an engine before reuse.
fn lock_engine<T>(engine: &Mutex<T>) -> MutexGuard<'_, T> {
    engine.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Engine lock poisoned by a panicked task");
        engine.clear_poison();
        poisoned.into_inner()
    })
}

fn task_failed(stage: &str, e: JoinError) -> VoxsubError {
    VoxsubError::Other(anyhow::Error::new(e).context(format!("{stage} task failed")))
}

/// Pull and normalize the whole audio track. Returns decoded byte count.
fn decode_stage(
    factory: &dyn AudioSourceFactory,
    locator: &str,
    config: &DecoderConfig,
    cancel: &CancellationToken,
    samples: &mpsc::Sender<Vec<f32>>,
    signals: &JobSignals,
) -> VoxsubResult<u64> {
    let mut source = factory.open(locator, config, cancel.clone())?;
    let mut processed = 0u64;

    while !cancel.is_cancelled() {
        let Some(chunk) = source.next_chunk()? else {
            break;
        };
        processed += chunk.bytes.len() as u64;
        let info = source.media_info().unwrap_or(chunk.info);
        signals.report_bytes(processed, info.expected_total_bytes());

        let normalized = normalize(&chunk);
        source.recycle(chunk);
        if normalized.is_empty() {
            continue;
        }
        if samples.blocking_send(normalized).is_err() {
            // Segmenter is gone; a sibling failed or the job was cancelled.
            break;
        }
    }
    Ok(processed)
}

/// Window incoming samples through the VAD and forward finished segments.
async fn vad_stage(
    mut vad: VoiceActivityDetector,
    mut samples: mpsc::Receiver<Vec<f32>>,
    segments: mpsc::Sender<SpeechSegment>,
    cancel: &CancellationToken,
) -> VoxsubResult<()> {
    let window_size = vad.config().window_size;
    let mut buffer = WindowBuffer::new();

    loop {
        let batch = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            batch = samples.recv() => batch,
        };
        let Some(batch) = batch else {
            break;
        };
        buffer.write(&batch);
        while let Some(window) = buffer.read_chunk(window_size) {
            vad.accept_window(&window)?;
            if !forward_segments(&mut vad, &segments, cancel).await {
                return Ok(());
            }
        }
    }

    vad.accept_window(&buffer.flush())?;
    vad.flush();
    forward_segments(&mut vad, &segments, cancel).await;
    Ok(())
}

/// Returns false once segments can no longer be delivered.
async fn forward_segments(
    vad: &mut VoiceActivityDetector,
    segments: &mpsc::Sender<SpeechSegment>,
    cancel: &CancellationToken,
) -> bool {
    while let Some(segment) = vad.pop_segment() {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            sent = segments.send(segment) => {
                if sent.is_err() {
                    return false;
                }
            }
        }
    }
    true
}

fn recognize_stage(
    recognizer: &mut SpeechRecognizer,
    stats: &mut RecognizeStats,
    mut segments: mpsc::Receiver<SpeechSegment>,
    language: LanguageCode,
    capture_dir: Option<&Path>,
    cancel: &CancellationToken,
    signals: &JobSignals,
) -> VoxsubResult<()> {
    while let Some(segment) = segments.blocking_recv() {
        if cancel.is_cancelled() {
            break;
        }
        signals.set_state(JobState::Recognizing);

        let index = stats.recognized + stats.skipped;
        if let Some(dir) = capture_dir {
            capture_segment(dir, index, &segment);
        }

        let start_secs = segment.start_secs(TARGET_SAMPLE_RATE);
        recognizer.set_standard_time(start_secs);
        match recognizer.transcribe(&segment.samples, language) {
            Ok(()) => stats.recognized += 1,
            Err(e) if !e.is_fatal() => {
                tracing::warn!(segment = index, start_secs, error = %e, "Skipping unrecognized segment");
                stats.skipped += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn capture_segment(dir: &Path, index: u64, segment: &SpeechSegment) {
    let path = dir.join(format!("segment_{index}.wav"));
    if let Err(e) = write_wav(&path, &segment.samples, TARGET_SAMPLE_RATE) {
        tracing::warn!(error = %e, path = %path.display(), "Failed to capture segment");
    }
}
