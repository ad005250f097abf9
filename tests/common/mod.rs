//! In-memory collaborators for pipeline and server tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use shortsmith::acquire::SourceMedia;
use shortsmith::captions::TranscriptWord;
use shortsmith::compose::{Composition, Compositor, CompositorConfig};
use shortsmith::error::{PipelineError, Result};
use shortsmith::media::{MediaClip, MediaEngine, MediaInfo};
use shortsmith::pipeline::{Orchestrator, PipelineConfig};
use shortsmith::storage::{BlobStore, MemoryBlobStore};
use shortsmith::transcribe::{Transcriber, Transcript};
use shortsmith::SourceAcquirer;

/// Serves fixed bytes for any reference
pub struct FakeSource {
    pub filename: String,
    pub fail: bool,
}

impl FakeSource {
    pub fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            fail: false,
        }
    }
}

#[async_trait]
impl SourceAcquirer for FakeSource {
    fn name(&self) -> &str {
        "fake"
    }

    fn matches(&self, _reference: &str) -> bool {
        true
    }

    async fn resolve(&self, reference: &str) -> Result<SourceMedia> {
        if self.fail {
            return Err(PipelineError::Acquisition(format!("unreachable: {reference}")));
        }
        Ok(SourceMedia {
            bytes: b"not really a video".to_vec(),
            filename: self.filename.clone(),
        })
    }
}

/// Returns canned words, optionally after a delay or not at all
pub struct FakeTranscriber {
    pub words: Vec<TranscriptWord>,
    pub delay: Option<Duration>,
    pub fail: bool,
}

impl FakeTranscriber {
    pub fn new(words: Vec<TranscriptWord>) -> Self {
        Self {
            words,
            delay: None,
            fail: false,
        }
    }

    pub fn hello_world() -> Self {
        Self::new(vec![
            TranscriptWord::new(" Hello", 1.0, 1.4),
            TranscriptWord::new(" world", 1.5, 1.9),
        ])
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    fn name(&self) -> &str {
        "fake"
    }

    async fn transcribe(&self, audio: Vec<u8>) -> Result<Transcript> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(PipelineError::Transcription("service unavailable".to_string()));
        }
        assert!(!audio.is_empty(), "transcriber got no audio");
        Ok(Transcript {
            text: self
                .words
                .iter()
                .map(|w| w.text.trim())
                .collect::<Vec<_>>()
                .join(" "),
            words: self.words.clone(),
            language: None,
            duration: None,
        })
    }
}

/// Media engine that probes fixed properties and records what it encodes
pub struct FakeEngine {
    pub info: MediaInfo,
    pub encoded: Mutex<Vec<Composition>>,
}

impl FakeEngine {
    /// 1920x1080, 60 s, with audio
    pub fn landscape() -> Self {
        Self::with_info(MediaInfo {
            width: 1920,
            height: 1080,
            fps: 30.0,
            duration: 60.0,
            has_audio: true,
        })
    }

    pub fn with_info(info: MediaInfo) -> Self {
        Self {
            info,
            encoded: Mutex::new(Vec::new()),
        }
    }

    pub fn compositions(&self) -> Vec<Composition> {
        self.encoded.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        assert!(path.exists(), "source was not written to {}", path.display());
        Ok(self.info.clone())
    }

    async fn extract_audio(&self, clip: &MediaClip, work_dir: &Path) -> Result<Vec<u8>> {
        assert!(work_dir.is_dir());
        Ok(format!("RIFF {:.3}s", clip.duration()).into_bytes())
    }

    async fn encode(&self, composition: &Composition, _work_dir: &Path) -> Result<Vec<u8>> {
        self.encoded.lock().unwrap().push(composition.clone());
        Ok(format!("clip starting at {}", composition.clip.trim().start).into_bytes())
    }
}

/// Memory store that refuses uploads whose key ends with `fail_suffix`
pub struct FlakyStore {
    pub inner: MemoryBlobStore,
    pub fail_suffix: String,
}

#[async_trait]
impl BlobStore for FlakyStore {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        if key.ends_with(&self.fail_suffix) {
            return Err(PipelineError::Storage(format!("bucket rejected {key}")));
        }
        self.inner.put(key, bytes).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    fn url_for(&self, key: &str) -> String {
        self.inner.url_for(key)
    }
}

/// Memory store whose uploads land immediately but only return after `stall`
pub struct StallingStore {
    pub inner: MemoryBlobStore,
    pub stall: Duration,
}

#[async_trait]
impl BlobStore for StallingStore {
    fn name(&self) -> &str {
        "stalling"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.inner.put(key, bytes).await?;
        tokio::time::sleep(self.stall).await;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }

    fn url_for(&self, key: &str) -> String {
        self.inner.url_for(key)
    }
}

/// Pipeline settings rooted in `work_dir`
pub fn pipeline_config(work_dir: &Path) -> PipelineConfig {
    PipelineConfig {
        work_dir: work_dir.to_path_buf(),
        ..Default::default()
    }
}

/// Orchestrator over the given fakes with a deterministic compositor
pub fn orchestrator(
    config: PipelineConfig,
    store: Arc<dyn BlobStore>,
    transcriber: FakeTranscriber,
    engine: Arc<FakeEngine>,
) -> Orchestrator {
    Orchestrator::new(
        config,
        Arc::new(FakeSource::new("My Talk.mp4")),
        store,
        Arc::new(transcriber),
        engine,
    )
    .with_compositor(Compositor::with_config(CompositorConfig {
        ffmpeg_path: "ffmpeg".to_string(),
        ..Default::default()
    }))
}
