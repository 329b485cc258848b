//! Whole jobs through the orchestrator with in-memory collaborators.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio_util::sync::CancellationToken;
use voxsub_audio_ai::mel::MelSpectrogram;
use voxsub_audio_ai::whisper::{BEGIN, EOT};
use voxsub_audio_ai::{
    LightModel, RecognizedSpan, RecognizerKind, SpeechRecognizer, SubtitleDocument,
    TimestampedModel, TokenModel, Translator,
};
use voxsub_common::error::{VoxsubError, VoxsubResult};
use voxsub_common::language::LanguageCode;
use voxsub_media::{AudioSource, DecoderConfig, MediaInfo, PcmEncoding, PcmSource};
use voxsub_pipeline::{
    AudioSourceFactory, Collaborators, FixedLanguage, FsSubtitleStore, JobState, JobStatus,
    StaticModelAssets, SubtitleStore, TranscriptionOrchestrator, VideoSource, VoxsubConfig,
};

const RATE: u32 = 16_000;

// ---------------------------------------------------------------------------
// Audio
// ---------------------------------------------------------------------------

fn silence(seconds: f32) -> Vec<i16> {
    vec![0; (seconds * RATE as f32) as usize]
}

fn tone(seconds: f32) -> Vec<i16> {
    let n = (seconds * RATE as f32) as usize;
    (0..n)
        .map(|i| {
            let phase = i as f32 * 300.0 * std::f32::consts::TAU / RATE as f32;
            (0.4 * phase.sin() * 32767.0) as i16
        })
        .collect()
}

/// 1 s silence, 1 s speech, 1 s silence, 2 s speech, 0.5 s silence.
fn two_utterances() -> Vec<u8> {
    let mut samples = silence(1.0);
    samples.extend(tone(1.0));
    samples.extend(silence(1.0));
    samples.extend(tone(2.0));
    samples.extend(silence(0.5));
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

struct SyntheticAudio(Vec<u8>);

impl AudioSourceFactory for SyntheticAudio {
    fn open(
        &self,
        _locator: &str,
        _config: &DecoderConfig,
        _cancel: CancellationToken,
    ) -> VoxsubResult<Box<dyn AudioSource>> {
        let info = MediaInfo {
            sample_rate: RATE,
            channel_count: 1,
            encoding: PcmEncoding::S16,
            duration_secs: self.0.len() as f64 / 2.0 / f64::from(RATE),
        };
        // Quarter-second chunks so progress moves in steps.
        Ok(Box::new(PcmSource::with_chunk_bytes(self.0.clone(), info, 8_000)))
    }
}

struct SilentContainer;

impl AudioSourceFactory for SilentContainer {
    fn open(
        &self,
        locator: &str,
        _config: &DecoderConfig,
        _cancel: CancellationToken,
    ) -> VoxsubResult<Box<dyn AudioSource>> {
        Err(VoxsubError::no_audio_track(locator))
    }
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

struct MemoryVideos;

#[async_trait::async_trait]
impl VideoSource for MemoryVideos {
    async fn resolve(&self, video_id: &str) -> VoxsubResult<String> {
        Ok(format!("memory://{video_id}"))
    }
}

#[derive(Default)]
struct MemoryStore {
    files: Mutex<HashMap<String, String>>,
    read_only: bool,
}

impl MemoryStore {
    fn read_only() -> Self {
        Self {
            read_only: true,
            ..Self::default()
        }
    }

    fn get(&self, file_id: &str) -> Option<String> {
        self.files.lock().unwrap().get(file_id).cloned()
    }
}

#[async_trait::async_trait]
impl SubtitleStore for MemoryStore {
    async fn write(&self, file_id: &str, content: &str) -> bool {
        if self.read_only {
            return false;
        }
        self.files
            .lock()
            .unwrap()
            .insert(file_id.to_string(), content.to_string());
        true
    }

    async fn read_lines(&self, file_id: &str) -> Option<Vec<String>> {
        self.get(file_id)
            .map(|content| content.split('\n').map(str::to_string).collect())
    }
}

fn collaborators(audio: impl AudioSourceFactory + 'static, store: Arc<dyn SubtitleStore>) -> Collaborators {
    Collaborators {
        videos: Arc::new(MemoryVideos),
        audio: Arc::new(audio),
        assets: Arc::new(StaticModelAssets::new("/models/engine.onnx")),
        store,
        detector: Arc::new(FixedLanguage(LanguageCode::English)),
    }
}

// ---------------------------------------------------------------------------
// Engines
// ---------------------------------------------------------------------------

/// Names each segment by its length in whole seconds.
///
/// Segments shorter than `min_secs` fail, and the first call cancels
/// `cancel_on_first` when it is set.
struct LengthNamer {
    min_secs: f64,
    cancel_on_first: Arc<OnceLock<CancellationToken>>,
}

impl TimestampedModel for LengthNamer {
    fn recognize(&mut self, samples: &[f32], _language: LanguageCode) -> VoxsubResult<Vec<RecognizedSpan>> {
        if let Some(token) = self.cancel_on_first.get() {
            token.cancel();
        }
        let secs = samples.len() as f64 / f64::from(RATE);
        if secs < self.min_secs {
            return Err(VoxsubError::recognition("segment too short"));
        }
        Ok(vec![RecognizedSpan {
            start_secs: 0.0,
            end_secs: secs,
            text: format!("speech of {} seconds", secs.round()),
        }])
    }
}

fn recognizer(min_secs: f64, cancel_on_first: Arc<OnceLock<CancellationToken>>) -> SpeechRecognizer {
    SpeechRecognizer::timestamped(Box::new(move |path: &Path| {
        assert_eq!(path, Path::new("/models/engine.onnx"));
        Ok(Box::new(LengthNamer {
            min_secs,
            cancel_on_first: Arc::clone(&cancel_on_first),
        }) as Box<dyn TimestampedModel>)
    }))
}

fn plain_recognizer() -> SpeechRecognizer {
    recognizer(0.0, Arc::new(OnceLock::new()))
}

struct Shout;

impl LightModel for Shout {
    fn translate(&mut self, text: &str, _src: &str, _tgt: &str) -> VoxsubResult<Option<String>> {
        Ok(Some(text.to_uppercase()))
    }
}

struct Mute;

impl LightModel for Mute {
    fn translate(&mut self, _text: &str, _src: &str, _tgt: &str) -> VoxsubResult<Option<String>> {
        Ok(None)
    }
}

fn config_with_target(target: Option<LanguageCode>) -> VoxsubConfig {
    let mut config = VoxsubConfig::default();
    config.translation.target_language = target;
    config
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transcribes_stores_and_translates() {
    let store = Arc::new(MemoryStore::default());
    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(Some(LanguageCode::Korean)),
        collaborators(SyntheticAudio(two_utterances()), store.clone()),
        plain_recognizer(),
    )
    .with_translator(Translator::light(Box::new(|| {
        Ok(Box::new(Shout) as Box<dyn LightModel>)
    })));

    let mut progress = orchestrator.progress();
    let watcher = tokio::spawn(async move {
        let mut seen = vec![*progress.borrow_and_update()];
        while progress.changed().await.is_ok() {
            seen.push(*progress.borrow_and_update());
        }
        seen
    });
    let state = orchestrator.state();

    let report = orchestrator.run("clip").await;

    assert_eq!(report.status, JobStatus::Success, "cause: {:?}", report.cause);
    assert_eq!(report.cause, None);
    assert_eq!(report.source_language, Some(LanguageCode::English));
    assert_eq!(report.files, vec!["clip_en.srt", "clip_ko.srt"]);
    assert_eq!(report.segments_recognized, 2);
    assert_eq!(report.segments_skipped, 0);
    assert_eq!(*state.borrow(), JobState::Done);

    let source = SubtitleDocument::parse(&store.get("clip_en.srt").unwrap()).unwrap();
    assert_eq!(source.texts(), vec!["speech of 1 seconds", "speech of 2 seconds"]);
    assert!((source.blocks[0].start_secs - 1.0).abs() < 0.05);
    assert!((source.blocks[1].start_secs - 3.0).abs() < 0.05);
    assert_eq!(report.subtitle.as_deref(), store.get("clip_en.srt").as_deref());

    let translated = SubtitleDocument::parse(&store.get("clip_ko.srt").unwrap()).unwrap();
    assert_eq!(translated.texts(), vec!["SPEECH OF 1 SECONDS", "SPEECH OF 2 SECONDS"]);
    assert_eq!(translated.blocks[1].end_secs, source.blocks[1].end_secs);

    drop(orchestrator);
    let seen = watcher.await.unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress went backwards: {seen:?}");
    assert_eq!(seen.last().copied(), Some(1.0));
    assert!(seen.iter().filter(|p| **p < 1.0).all(|p| *p <= 0.9));
}

#[tokio::test]
async fn failed_segments_are_skipped() {
    let store = Arc::new(MemoryStore::default());
    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(None),
        collaborators(SyntheticAudio(two_utterances()), store.clone()),
        recognizer(1.5, Arc::new(OnceLock::new())),
    );

    let report = orchestrator.run("clip").await;

    assert_eq!(report.status, JobStatus::Success);
    assert_eq!(report.segments_recognized, 1);
    assert_eq!(report.segments_skipped, 1);

    let stored = store.get("clip_en.srt").unwrap();
    let document = SubtitleDocument::parse(&stored).unwrap();
    assert_eq!(document.blocks.len(), 1);
    assert_eq!(document.blocks[0].index, 1);
    assert_eq!(document.texts(), vec!["speech of 2 seconds"]);
}

#[tokio::test]
async fn translation_failure_keeps_source_subtitle() {
    let store = Arc::new(MemoryStore::default());
    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(Some(LanguageCode::Japanese)),
        collaborators(SyntheticAudio(two_utterances()), store.clone()),
        plain_recognizer(),
    )
    .with_translator(Translator::light(Box::new(|| {
        Ok(Box::new(Mute) as Box<dyn LightModel>)
    })));

    let report = orchestrator.run("clip").await;

    assert_eq!(report.status, JobStatus::Partial);
    assert!(report.cause.as_deref().unwrap().contains("Translation failed"));
    assert_eq!(report.files, vec!["clip_en.srt"]);
    assert!(store.get("clip_en.srt").is_some());
    assert!(store.get("clip_ja.srt").is_none());
    assert_eq!(*orchestrator.progress().borrow(), 1.0);
    assert_eq!(*orchestrator.state().borrow(), JobState::Done);
}

#[tokio::test]
async fn same_target_language_skips_translation() {
    let store = Arc::new(MemoryStore::default());
    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(Some(LanguageCode::English)),
        collaborators(SyntheticAudio(two_utterances()), store.clone()),
        plain_recognizer(),
    )
    .with_translator(Translator::light(Box::new(|| {
        Ok(Box::new(Mute) as Box<dyn LightModel>)
    })));

    let report = orchestrator.run("clip").await;

    assert_eq!(report.status, JobStatus::Success);
    assert_eq!(report.files, vec!["clip_en.srt"]);
}

#[tokio::test]
async fn persistence_failure_keeps_subtitle_in_report() {
    let store = Arc::new(MemoryStore::read_only());
    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(None),
        collaborators(SyntheticAudio(two_utterances()), store),
        plain_recognizer(),
    );

    let report = orchestrator.run("clip").await;

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.cause.as_deref().unwrap().contains("clip_en.srt"));
    assert!(report.files.is_empty());
    let subtitle = report.subtitle.unwrap();
    assert!(subtitle.contains("speech of 1 seconds"));
    assert!(subtitle.contains("speech of 2 seconds"));
    assert_eq!(*orchestrator.state().borrow(), JobState::Failed);
}

#[tokio::test]
async fn missing_audio_track_fails_the_job() {
    let store = Arc::new(MemoryStore::default());
    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(None),
        collaborators(SilentContainer, store.clone()),
        plain_recognizer(),
    );

    let report = orchestrator.run("clip").await;

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.cause.as_deref().unwrap().contains("No audio track"));
    assert!(store.get("clip_en.srt").is_none());
    assert!(*orchestrator.progress().borrow() < 1.0);
}

#[tokio::test]
async fn engine_init_failure_fails_the_job() {
    let store = Arc::new(MemoryStore::default());
    let broken = SpeechRecognizer::timestamped(Box::new(|_path: &Path| {
        Err(VoxsubError::media("model file is corrupt"))
    }));
    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(None),
        collaborators(SyntheticAudio(two_utterances()), store),
        broken,
    );

    let report = orchestrator.run("clip").await;

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report
        .cause
        .as_deref()
        .unwrap()
        .contains("Engine initialization failed"));
    assert!(report.subtitle.is_none());
}

#[tokio::test]
async fn invalid_vad_config_fails_before_decoding() {
    let mut config = config_with_target(None);
    config.vad.threshold = 2.0;
    let mut orchestrator = TranscriptionOrchestrator::new(
        config,
        collaborators(SyntheticAudio(two_utterances()), Arc::new(MemoryStore::default())),
        plain_recognizer(),
    );

    let report = orchestrator.run("clip").await;

    assert_eq!(report.status, JobStatus::Failed);
    assert!(report.cause.as_deref().unwrap().contains("VAD"));
    assert_eq!(*orchestrator.progress().borrow(), 0.0);
}

#[tokio::test]
async fn cancellation_keeps_recognized_text() {
    let store = Arc::new(MemoryStore::default());
    let cancel_slot = Arc::new(OnceLock::new());
    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(None),
        collaborators(SyntheticAudio(two_utterances()), store.clone()),
        recognizer(0.0, cancel_slot.clone()),
    );
    cancel_slot.set(orchestrator.cancellation_token()).unwrap();

    let report = orchestrator.run("clip").await;

    assert_eq!(report.status, JobStatus::Cancelled);
    assert_eq!(report.segments_recognized, 1);
    let subtitle = report.subtitle.unwrap();
    assert!(subtitle.starts_with("1\n"));
    assert!(subtitle.contains("speech of 1 seconds"));
    assert!(store.get("clip_en.srt").is_none());
    assert_eq!(*orchestrator.state().borrow(), JobState::Cancelled);

    // The token stays cancelled.
    let again = orchestrator.run("clip").await;
    assert_eq!(again.status, JobStatus::Cancelled);
    assert!(again.subtitle.is_none());
}

#[tokio::test]
async fn configured_language_and_fs_store_and_capture() {
    let root = std::env::temp_dir().join("voxsub_test_orchestrator_fs");
    let _ = std::fs::remove_dir_all(&root);
    let subtitles = root.join("subtitles");
    let captures = root.join("segments");

    let mut config = config_with_target(None);
    config.recognizer.language = LanguageCode::Japanese;
    config.pipeline.debug_capture_dir = Some(captures.clone());

    let mut orchestrator = TranscriptionOrchestrator::new(
        config,
        collaborators(
            SyntheticAudio(two_utterances()),
            Arc::new(FsSubtitleStore::new(&subtitles)),
        ),
        plain_recognizer(),
    );

    let report = orchestrator.run("42").await;

    assert_eq!(report.status, JobStatus::Success);
    assert_eq!(report.source_language, Some(LanguageCode::Japanese));
    assert_eq!(report.files, vec!["42_ja.srt"]);

    let stored = std::fs::read_to_string(subtitles.join("42_ja.srt")).unwrap();
    assert_eq!(SubtitleDocument::parse(&stored).unwrap().blocks.len(), 2);

    let captured: Vec<PathBuf> = (0..2).map(|i| captures.join(format!("segment_{i}.wav"))).collect();
    assert!(captured.iter().all(|p| p.exists()));

    std::fs::remove_dir_all(&root).ok();
}

fn counting_recognizer(loads: &Arc<AtomicUsize>) -> SpeechRecognizer {
    let loads = Arc::clone(loads);
    SpeechRecognizer::timestamped(Box::new(move |_path: &Path| {
        loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(LengthNamer {
            min_secs: 0.0,
            cancel_on_first: Arc::new(OnceLock::new()),
        }) as Box<dyn TimestampedModel>)
    }))
}

#[tokio::test]
async fn engines_are_kept_on_success_and_reloaded_after_failure() {
    let loads = Arc::new(AtomicUsize::new(0));
    let counting = counting_recognizer(&loads);

    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(None),
        collaborators(SyntheticAudio(two_utterances()), Arc::new(MemoryStore::default())),
        counting,
    );
    assert_eq!(orchestrator.run("a").await.status, JobStatus::Success);
    let second = orchestrator.run("b").await;
    assert_eq!(second.status, JobStatus::Success);
    assert_eq!(loads.load(Ordering::SeqCst), 1);

    // Each job starts a fresh timeline.
    let document = SubtitleDocument::parse(&second.subtitle.unwrap()).unwrap();
    assert_eq!(document.blocks[0].index, 1);
    assert!((document.blocks[0].start_secs - 1.0).abs() < 0.05);

    let loads = Arc::new(AtomicUsize::new(0));
    let counting = counting_recognizer(&loads);
    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(None),
        collaborators(SyntheticAudio(two_utterances()), Arc::new(MemoryStore::read_only())),
        counting,
    );
    assert_eq!(orchestrator.run("a").await.status, JobStatus::Failed);
    assert_eq!(orchestrator.run("a").await.status, JobStatus::Failed);
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Token-stream engine
// ---------------------------------------------------------------------------

/// One token stream per call, then end-of-text.
struct ScriptedTokens(Vec<Vec<u32>>);

impl TokenModel for ScriptedTokens {
    fn generate(&mut self, _mel: &MelSpectrogram, _prompt: &[u32]) -> VoxsubResult<Vec<u32>> {
        if self.0.is_empty() {
            return Ok(vec![EOT]);
        }
        Ok(self.0.remove(0))
    }
}

/// A vocabulary file with an empty 80 x 201 filterbank.
fn write_vocab(dir: &Path, words: &[&str]) -> PathBuf {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0x5753_5052u32.to_le_bytes());
    bytes.extend_from_slice(&80i32.to_le_bytes());
    bytes.extend_from_slice(&201i32.to_le_bytes());
    bytes.extend(std::iter::repeat(0u8).take(80 * 201 * 4));
    bytes.extend_from_slice(&(words.len() as i32).to_le_bytes());
    for word in words {
        bytes.extend_from_slice(&(word.len() as i32).to_le_bytes());
        bytes.extend_from_slice(word.as_bytes());
    }

    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("vocab.bin");
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn token_stream_blocks_follow_their_segments() {
    let dir = std::env::temp_dir().join("voxsub_test_orchestrator_tokens");
    let vocab = write_vocab(&dir, &["hel", "lo"]);

    // The first segment decodes to nothing, the second to one second of text.
    let script = Mutex::new(Some(vec![vec![EOT], vec![BEGIN, 0, 1, BEGIN + 50, EOT]]));
    let recognizer = SpeechRecognizer::token_stream(Box::new(move |_path: &Path| {
        let tokens = script.lock().unwrap().take().unwrap_or_default();
        Ok(Box::new(ScriptedTokens(tokens)) as Box<dyn TokenModel>)
    }));

    let store = Arc::new(MemoryStore::default());
    let mut collaborators = collaborators(SyntheticAudio(two_utterances()), store.clone());
    collaborators.assets = Arc::new(StaticModelAssets::new("/models/whisper.tflite").with_vocab(vocab));
    let mut config = config_with_target(None);
    config.recognizer.kind = RecognizerKind::TokenStream;

    let mut orchestrator = TranscriptionOrchestrator::new(config, collaborators, recognizer);
    let report = orchestrator.run("clip").await;

    assert_eq!(report.status, JobStatus::Success, "cause: {:?}", report.cause);
    assert_eq!(report.segments_recognized, 2);

    let document = SubtitleDocument::parse(&store.get("clip_en.srt").unwrap()).unwrap();
    assert_eq!(document.texts(), vec!["hello"]);
    assert_eq!(document.blocks[0].index, 1);
    assert!(
        (document.blocks[0].start_secs - 3.0).abs() < 0.05,
        "block starts at {}",
        document.blocks[0].start_secs
    );
    assert!((document.blocks[0].end_secs - document.blocks[0].start_secs - 1.0).abs() < 0.002);

    std::fs::remove_dir_all(&dir).ok();
}

// ---------------------------------------------------------------------------
// Engine panics
// ---------------------------------------------------------------------------

/// Panics on its first call, then names segments by length.
struct PanicsOnce(Arc<AtomicBool>);

impl TimestampedModel for PanicsOnce {
    fn recognize(&mut self, samples: &[f32], language: LanguageCode) -> VoxsubResult<Vec<RecognizedSpan>> {
        if self.0.swap(false, Ordering::SeqCst) {
            panic!("engine crashed");
        }
        LengthNamer {
            min_secs: 0.0,
            cancel_on_first: Arc::new(OnceLock::new()),
        }
        .recognize(samples, language)
    }
}

impl LightModel for PanicsOnce {
    fn translate(&mut self, text: &str, src: &str, tgt: &str) -> VoxsubResult<Option<String>> {
        if self.0.swap(false, Ordering::SeqCst) {
            panic!("engine crashed");
        }
        Shout.translate(text, src, tgt)
    }
}

#[tokio::test]
async fn recognizer_panic_fails_one_job_only() {
    let armed = Arc::new(AtomicBool::new(true));
    let loads = Arc::new(AtomicUsize::new(0));
    let recognizer = {
        let armed = Arc::clone(&armed);
        let loads = Arc::clone(&loads);
        SpeechRecognizer::timestamped(Box::new(move |_path: &Path| {
            loads.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(PanicsOnce(Arc::clone(&armed))) as Box<dyn TimestampedModel>)
        }))
    };
    let store = Arc::new(MemoryStore::default());
    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(None),
        collaborators(SyntheticAudio(two_utterances()), store.clone()),
        recognizer,
    );

    let first = orchestrator.run("clip").await;
    assert_eq!(first.status, JobStatus::Failed);
    assert!(first.cause.as_deref().unwrap().contains("recognition task failed"));
    assert!(store.get("clip_en.srt").is_none());

    let second = orchestrator.run("clip").await;
    assert_eq!(second.status, JobStatus::Success, "cause: {:?}", second.cause);
    assert_eq!(second.segments_recognized, 2);
    assert!(store.get("clip_en.srt").is_some());
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn translator_panic_keeps_translator_usable() {
    let armed = Arc::new(AtomicBool::new(true));
    let translator = {
        let armed = Arc::clone(&armed);
        Translator::light(Box::new(move || {
            Ok(Box::new(PanicsOnce(Arc::clone(&armed))) as Box<dyn LightModel>)
        }))
    };
    let store = Arc::new(MemoryStore::default());
    let mut orchestrator = TranscriptionOrchestrator::new(
        config_with_target(Some(LanguageCode::Korean)),
        collaborators(SyntheticAudio(two_utterances()), store.clone()),
        plain_recognizer(),
    )
    .with_translator(translator);

    let first = orchestrator.run("clip").await;
    assert_eq!(first.status, JobStatus::Partial);
    assert!(first.cause.as_deref().unwrap().contains("translation task failed"));
    assert_eq!(first.files, vec!["clip_en.srt"]);

    let second = orchestrator.run("clip").await;
    assert_eq!(second.status, JobStatus::Success, "cause: {:?}", second.cause);
    assert_eq!(second.files, vec!["clip_en.srt", "clip_ko.srt"]);
    let translated = SubtitleDocument::parse(&store.get("clip_ko.srt").unwrap()).unwrap();
    assert_eq!(translated.texts(), vec!["SPEECH OF 1 SECONDS", "SPEECH OF 2 SECONDS"]);
}
