//! Request-scoped pipeline runner
//!
//! Sequences acquire → trim → crop → extract audio → transcribe → align →
//! render → composite → encode → publish → clean up for one request.
//! Every collaborator sits behind a trait object so the whole flow runs
//! against in-memory fakes in tests.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, error, info, warn};

use super::state::PipelineStage;
use crate::acquire::{sanitize_filename, LocalFileSource, SourceAcquirer, SourceRouter};
use crate::captions::{align, CaptionRenderer, CaptionStyle, Palette, DEFAULT_DELAY_SECS};
use crate::compose::{Compositor, CompositorConfig};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::media::{compute_crop, CropRect, FfmpegEngine, MediaClip, MediaEngine, OverlayAnchor};
use crate::storage::{self, BlobStore};
use crate::timecode::TimeRange;
use crate::transcribe::{OpenAiTranscriber, Transcriber};

/// One short to make
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    /// Video reference (URL or local path)
    pub source: String,
    /// Trim start offset, unparsed
    pub start: String,
    /// Trim end offset, unparsed
    pub end: String,
}

impl PipelineRequest {
    pub fn new(source: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            start: start.into(),
            end: end.into(),
        }
    }

    /// Build from optional query values; absent or blank values are missing.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MissingParameter`] naming every missing value.
    pub fn from_query(link: Option<&str>, start: Option<&str>, end: Option<&str>) -> Result<Self> {
        let fields = [("link", present(link)), ("start", present(start)), ("end", present(end))];

        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(PipelineError::MissingParameter(missing.join(", ")));
        }

        match fields {
            [(_, Some(link)), (_, Some(start)), (_, Some(end))] => Ok(Self::new(link, start, end)),
            _ => Err(PipelineError::MissingParameter("link, start, end".to_string())),
        }
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Blob keys owned by one run
///
/// Every key carries the run id, so concurrent runs over the same source
/// never share a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobKeys {
    pub source: String,
    pub audio: String,
    pub output: String,
}

impl BlobKeys {
    #[must_use]
    pub fn new(run_id: &uuid::Uuid, filename: &str) -> Self {
        let stem = format!("{}_{filename}", run_id.simple());
        Self {
            audio: format!("audio_{stem}"),
            output: format!("{stem}_short"),
            source: stem,
        }
    }
}

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineResult {
    /// Where the short was published
    pub published_reference: String,
    /// Blob key of the short
    pub output_key: String,
    pub crop: CropRect,
    pub caption_count: usize,
    /// Length of the encoded short
    pub duration_secs: f64,
    pub style: CaptionStyle,
    /// Stages walked, in order
    pub stages: Vec<PipelineStage>,
    pub processing_time_secs: f64,
}

/// A run that ended in `Failed`
#[derive(Debug, Error)]
#[error("pipeline failed while {stage}: {error}")]
pub struct StageFailure {
    /// Stage that was running when the error happened
    pub stage: PipelineStage,
    #[source]
    pub error: PipelineError,
}

/// Orchestrator settings
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Each run works in its own subdirectory of this
    pub work_dir: PathBuf,
    /// Seconds added to every word's timing
    pub caption_delay: f64,
    pub fade_out_secs: f64,
    /// Deadline for one run
    pub request_timeout: Option<Duration>,
    /// Delete uploaded intermediates when a run fails
    pub cleanup_on_failure: bool,
    pub palette: Palette,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("shortsmith"),
            caption_delay: DEFAULT_DELAY_SECS,
            fade_out_secs: 1.0,
            request_timeout: Some(Duration::from_secs(900)),
            cleanup_on_failure: true,
            palette: Palette::default(),
        }
    }
}

impl PipelineConfig {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let timeout = config.pipeline.request_timeout_secs;
        Self {
            work_dir: config.pipeline.work_dir.clone(),
            caption_delay: config.captions.delay_secs,
            fade_out_secs: config.pipeline.fade_out_secs,
            request_timeout: (timeout > 0).then(|| Duration::from_secs(timeout)),
            cleanup_on_failure: config.pipeline.cleanup_on_failure,
            palette: config.captions.palette(),
        }
    }
}

#[derive(Debug, Clone)]
struct RunState {
    stage: PipelineStage,
    history: Vec<PipelineStage>,
    /// Blob keys this run put into the store and has not deleted yet
    uploaded: Vec<String>,
}

/// Shared view of a run's progress; survives the run future being dropped
/// on timeout. The lock is never held across an await point.
struct RunTracker {
    inner: Mutex<RunState>,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            inner: Mutex::new(RunState {
                stage: PipelineStage::Acquiring,
                history: vec![PipelineStage::Acquiring],
                uploaded: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, stage: PipelineStage) {
        let mut state = self.lock();
        debug_assert!(
            state.stage.can_transition(stage),
            "illegal transition {} -> {}",
            state.stage,
            stage
        );
        state.stage = stage;
        state.history.push(stage);
        info!("Stage: {}", stage);
    }

    fn uploaded(&self, key: &str) {
        self.lock().uploaded.push(key.to_string());
    }

    fn deleted(&self, key: &str) {
        self.lock().uploaded.retain(|k| k != key);
    }

    fn snapshot(&self) -> RunState {
        self.lock().clone()
    }
}

/// Runs the short-clip pipeline for one request at a time
pub struct Orchestrator {
    config: PipelineConfig,
    acquirer: Arc<dyn SourceAcquirer>,
    store: Arc<dyn BlobStore>,
    transcriber: Arc<dyn Transcriber>,
    engine: Arc<dyn MediaEngine>,
    compositor: Compositor,
    renderer: CaptionRenderer,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("acquirer", &self.acquirer.name())
            .field("store", &self.store.name())
            .field("transcriber", &self.transcriber.name())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        acquirer: Arc<dyn SourceAcquirer>,
        store: Arc<dyn BlobStore>,
        transcriber: Arc<dyn Transcriber>,
        engine: Arc<dyn MediaEngine>,
    ) -> Self {
        Self {
            config,
            acquirer,
            store,
            transcriber,
            engine,
            compositor: Compositor::new(),
            renderer: CaptionRenderer::new(),
        }
    }

    /// Use a custom compositor (encoder recipe and caption anchor)
    #[must_use]
    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    /// Wire up the production collaborators described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when a collaborator cannot be built,
    /// e.g. no transcription API key.
    pub fn from_config(config: &Config) -> Result<Self> {
        let render = &config.render;
        let mut compositor_config = CompositorConfig {
            video_codec: render.video_codec.clone(),
            audio_codec: render.audio_codec.clone(),
            preset: render.preset.clone(),
            crf: render.crf,
            anchor: OverlayAnchor::new(render.anchor_x, render.anchor_y),
            ..Default::default()
        };
        if let Some(ref path) = render.ffmpeg_path {
            compositor_config.ffmpeg_path.clone_from(path);
        }
        if let Some(ref accel) = render.hwaccel {
            compositor_config = compositor_config.with_hwaccel(accel);
        }
        let compositor = Compositor::with_config(compositor_config);

        let mut engine = FfmpegEngine::new(compositor.clone());
        if let Some(ref path) = render.ffprobe_path {
            engine = engine.with_ffprobe_path(path);
        }

        let mut acquirer = SourceRouter::standard(
            &config.pipeline.work_dir,
            render.ytdlp_path.as_deref(),
            render.max_download_bytes,
        )?;
        if config.pipeline.allow_local_sources {
            acquirer = acquirer.with(LocalFileSource);
        }
        let store = storage::from_config(&config.storage)?;
        let transcriber = OpenAiTranscriber::from_config(&config.transcription)?;

        Ok(Self::new(
            PipelineConfig::from_config(config),
            Arc::new(acquirer),
            store,
            Arc::new(transcriber),
            Arc::new(engine),
        )
        .with_compositor(compositor))
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for `request`.
    ///
    /// Local scratch files are always removed. On failure, blobs this run
    /// uploaded are deleted best-effort unless `cleanup_on_failure` is off.
    ///
    /// # Errors
    ///
    /// Returns [`StageFailure`] naming the stage that failed.
    pub async fn run(&self, request: &PipelineRequest) -> std::result::Result<PipelineResult, StageFailure> {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4();
        let scratch = self.config.work_dir.join(run_id.to_string());
        let tracker = RunTracker::new();

        info!(
            "Run {} started: {} [{} - {}]",
            run_id, request.source, request.start, request.end
        );

        let execution = self.execute(request, &run_id, &scratch, &tracker, started);
        let outcome = match self.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, execution)
                .await
                .unwrap_or(Err(PipelineError::Timeout(limit))),
            None => execution.await,
        };

        if let Err(e) = fs::remove_dir_all(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove scratch dir {}: {}", scratch.display(), e);
            }
        }

        match outcome {
            Ok(result) => {
                info!(
                    "Run {} published {} in {:.1}s",
                    run_id, result.published_reference, result.processing_time_secs
                );
                Ok(result)
            }
            Err(error) => {
                let state = tracker.snapshot();
                tracker.enter(PipelineStage::Failed);
                error!(
                    "Run {} failed while {} ({}): {}",
                    run_id,
                    state.stage,
                    error.kind(),
                    error
                );
                if self.config.cleanup_on_failure {
                    self.compensate(&state.uploaded).await;
                } else if !state.uploaded.is_empty() {
                    warn!("Leaving intermediate blobs behind: {:?}", state.uploaded);
                }
                Err(StageFailure {
                    stage: state.stage,
                    error,
                })
            }
        }
    }

    /// Best-effort delete of blobs left by a failed run
    async fn compensate(&self, keys: &[String]) {
        for key in keys {
            match self.store.delete(key).await {
                Ok(()) => debug!("Removed intermediate blob {}", key),
                Err(e) => warn!("Failed to remove intermediate blob {}: {}", key, e),
            }
        }
    }

    /// Upload `bytes`, tracking the key first so an upload cut short by the
    /// deadline is still compensated.
    async fn put(&self, tracker: &RunTracker, key: &str, bytes: Vec<u8>) -> Result<()> {
        tracker.uploaded(key);
        self.store.put(key, bytes).await
    }

    async fn execute(
        &self,
        request: &PipelineRequest,
        run_id: &uuid::Uuid,
        scratch: &Path,
        tracker: &RunTracker,
        started: Instant,
    ) -> Result<PipelineResult> {
        // Acquiring
        let range = TimeRange::parse(&request.start, &request.end)?;
        fs::create_dir_all(scratch).await?;

        let media = self.acquirer.resolve(&request.source).await?;
        let filename = sanitize_filename(&media.filename);
        let BlobKeys {
            source: source_key,
            audio: audio_key,
            output: output_key,
        } = BlobKeys::new(run_id, &filename);

        let local_source = scratch.join(&filename);
        fs::write(&local_source, &media.bytes).await?;
        info!("Acquired {} ({} bytes)", filename, media.bytes.len());
        self.put(tracker, &source_key, media.bytes).await?;

        tracker.enter(PipelineStage::Trimming);
        let info = self.engine.probe(&local_source).await?;
        debug!(
            "Source {}x{} @ {:.2} fps, {:.3}s, audio: {}",
            info.width, info.height, info.fps, info.duration, info.has_audio
        );
        let clip = MediaClip::from_source(&local_source, info)?
            .subclip(range)?
            .with_fade_out(self.config.fade_out_secs);

        tracker.enter(PipelineStage::Cropping);
        let crop = compute_crop(clip.width(), clip.height());
        debug!("Crop {:?}", crop);
        let clip = clip.cropped(crop);

        tracker.enter(PipelineStage::ExtractingAudio);
        if !clip.has_audio() {
            return Err(PipelineError::EmptyTranscript);
        }
        let audio = self.engine.extract_audio(&clip, scratch).await?;
        self.put(tracker, &audio_key, audio.clone()).await?;

        tracker.enter(PipelineStage::Transcribing);
        let transcript = self.transcriber.transcribe(audio).await?;
        info!(
            "Transcribed {} words via {}",
            transcript.words.len(),
            self.transcriber.name()
        );

        tracker.enter(PipelineStage::Aligning);
        let style = self.config.palette.pick(&mut rand::thread_rng());
        let intervals = align(&transcript.words, self.config.caption_delay, &style);

        tracker.enter(PipelineStage::Rendering);
        let overlay = self.renderer.render(intervals, &style);

        tracker.enter(PipelineStage::Compositing);
        let composition = self.compositor.compose(clip, overlay);
        if composition.is_degenerate() {
            return Err(PipelineError::EmptyTranscript);
        }

        tracker.enter(PipelineStage::Encoding);
        let encoded = self.engine.encode(&composition, scratch).await?;

        tracker.enter(PipelineStage::Publishing);
        self.put(tracker, &output_key, encoded).await?;
        let published_reference = self.store.url_for(&output_key);

        tracker.enter(PipelineStage::CleaningUp);
        for key in [&source_key, &audio_key] {
            self.store.delete(key).await?;
            tracker.deleted(key);
        }

        tracker.enter(PipelineStage::Done);
        Ok(PipelineResult {
            published_reference,
            output_key,
            crop,
            caption_count: composition.overlay.intervals().len(),
            duration_secs: composition.duration,
            style,
            stages: tracker.snapshot().history,
            processing_time_secs: started.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_query() {
        let request = PipelineRequest::from_query(
            Some("https://youtu.be/abc"),
            Some("00:00:10"),
            Some(" 20 "),
        )
        .unwrap();
        assert_eq!(request, PipelineRequest::new("https://youtu.be/abc", "00:00:10", "20"));
    }

    #[test]
    fn test_request_missing_fields() {
        let err = PipelineRequest::from_query(Some("x"), None, Some("")).unwrap_err();
        match err {
            PipelineError::MissingParameter(names) => assert_eq!(names, "start, end"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_config_timeout_zero_disables() {
        let mut config = Config::default();
        config.pipeline.request_timeout_secs = 0;
        assert_eq!(PipelineConfig::from_config(&config).request_timeout, None);
        assert_eq!(
            PipelineConfig::default().request_timeout,
            Some(Duration::from_secs(900))
        );
    }

    #[test]
    fn test_tracker_records_uploads() {
        let tracker = RunTracker::new();
        tracker.uploaded("a.mp4");
        tracker.uploaded("audio_a.mp4");
        tracker.deleted("a.mp4");
        tracker.enter(PipelineStage::Trimming);

        let state = tracker.snapshot();
        assert_eq!(state.uploaded, vec!["audio_a.mp4"]);
        assert_eq!(state.stage, PipelineStage::Trimming);
        assert_eq!(
            state.history,
            vec![PipelineStage::Acquiring, PipelineStage::Trimming]
        );
    }

    #[test]
    fn test_tracker_records_failed_state() {
        let tracker = RunTracker::new();
        tracker.enter(PipelineStage::Trimming);
        tracker.enter(PipelineStage::Failed);

        let state = tracker.snapshot();
        assert_eq!(state.stage, PipelineStage::Failed);
        assert!(state.stage.is_terminal());
        assert_eq!(state.history.last(), Some(&PipelineStage::Failed));
    }

    #[test]
    fn test_blob_keys_are_run_scoped() {
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        let keys = BlobKeys::new(&a, "Talk.mp4");

        assert_eq!(keys.source, format!("{}_Talk.mp4", a.simple()));
        assert_eq!(keys.audio, format!("audio_{}_Talk.mp4", a.simple()));
        assert_eq!(keys.output, format!("{}_Talk.mp4_short", a.simple()));
        assert_ne!(keys, BlobKeys::new(&b, "Talk.mp4"));
        assert!(crate::storage::validate_key(&keys.output).is_ok());
    }

    #[test]
    fn test_stage_failure_display() {
        let failure = StageFailure {
            stage: PipelineStage::Transcribing,
            error: PipelineError::Transcription("503".to_string()),
        };
        assert_eq!(
            failure.to_string(),
            "pipeline failed while transcribing: Transcription error: 503"
        );
    }
}
