//! ffmpeg/ffprobe media engine
//!
//! Probes sources with ffprobe's JSON output, extracts trimmed audio as
//! 16 kHz mono WAV and encodes compositions built by the [`Compositor`].

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::fs;
use tokio::process::Command;
use tracing::debug;

use super::{MediaClip, MediaEngine, MediaInfo};
use crate::captions::CaptionRenderer;
use crate::compose::{Composition, Compositor};
use crate::error::{PipelineError, Result};

/// Media engine driving ffmpeg and ffprobe subprocesses
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    ffprobe_path: String,
    compositor: Compositor,
    renderer: CaptionRenderer,
}

impl FfmpegEngine {
    /// Create an engine, searching for ffprobe in PATH
    #[must_use]
    pub fn new(compositor: Compositor) -> Self {
        let ffprobe_path = which::which("ffprobe")
            .map_or_else(|_| "ffprobe".to_string(), |p| p.to_string_lossy().to_string());
        Self {
            ffprobe_path,
            compositor,
            renderer: CaptionRenderer::new(),
        }
    }

    /// Specify custom ffprobe binary path
    #[must_use]
    pub fn with_ffprobe_path(mut self, path: &str) -> Self {
        self.ffprobe_path = path.to_string();
        self
    }

    /// Use a custom caption renderer for the burned-in script
    #[must_use]
    pub fn with_renderer(mut self, renderer: CaptionRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    fn ffmpeg_path(&self) -> &str {
        &self.compositor.config().ffmpeg_path
    }

    /// Run ffmpeg with `args`, mapping failure to an encoding error
    async fn run_ffmpeg(&self, args: &[String], what: &str) -> Result<()> {
        debug!("ffmpeg {} args: {:?}", what, args);

        let output = Command::new(self.ffmpeg_path())
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PipelineError::Encoding(format!("failed to start ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Encoding(format!(
                "{what} failed ({}): {}",
                output.status,
                tail(&stderr, 800)
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl MediaEngine for FfmpegEngine {
    async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .await
            .map_err(|e| PipelineError::Encoding(format!("failed to start ffprobe: {e}")))?;

        if !output.status.success() {
            return Err(PipelineError::Encoding(format!(
                "ffprobe failed on {}",
                path.display()
            )));
        }

        parse_probe(&output.stdout)
    }

    async fn extract_audio(&self, clip: &MediaClip, work_dir: &Path) -> Result<Vec<u8>> {
        let audio_path = work_dir.join("audio.wav");
        let trim = clip.trim();

        let args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-nostdin".to_string(),
            "-ss".to_string(),
            format!("{:.3}", trim.start),
            "-i".to_string(),
            clip.source().to_string_lossy().to_string(),
            "-t".to_string(),
            format!("{:.3}", clip.duration()),
            "-vn".to_string(), // No video
            "-acodec".to_string(),
            "pcm_s16le".to_string(), // 16-bit PCM
            "-ar".to_string(),
            "16000".to_string(), // 16kHz sample rate (Whisper optimal)
            "-ac".to_string(),
            "1".to_string(), // Mono
            "-y".to_string(),
            audio_path.to_string_lossy().to_string(),
        ];

        self.run_ffmpeg(&args, "audio extraction").await?;
        let bytes = fs::read(&audio_path).await?;
        let _ = fs::remove_file(&audio_path).await;
        Ok(bytes)
    }

    async fn encode(&self, composition: &Composition, work_dir: &Path) -> Result<Vec<u8>> {
        let ass_path = work_dir.join("captions.ass");
        let output_path = work_dir.join("short.mp4");

        self.renderer
            .write_ass(
                &composition.overlay,
                composition.canvas(),
                composition.anchor,
                &ass_path,
            )
            .await?;

        let args = self
            .compositor
            .build_args(composition, Some(&ass_path), &output_path);
        self.run_ffmpeg(&args, "encode").await?;

        let bytes = fs::read(&output_path).await?;
        let _ = fs::remove_file(&ass_path).await;
        let _ = fs::remove_file(&output_path).await;
        Ok(bytes)
    }
}

/// Parse ffprobe JSON into [`MediaInfo`]
fn parse_probe(json: &[u8]) -> Result<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| PipelineError::Encoding("No video stream found".to_string()))?;

    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let fps = video_stream
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(30.0);

    // Container duration first, stream duration as fallback
    let duration = probe
        .format
        .duration
        .as_deref()
        .or(video_stream.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(MediaInfo {
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        duration,
        has_audio,
    })
}

/// Parse frame rate (e.g., "30/1" or "30000/1001")
fn parse_frame_rate(rate: &str) -> Option<f32> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f32 = num.parse().ok()?;
            let den: f32 = den.parse().ok()?;
            (den > 0.0).then(|| num / den)
        }
        None => rate.parse().ok(),
    }
}

/// Last `max` bytes of ffmpeg's stderr, on a char boundary
fn tail(text: &str, max: usize) -> &str {
    let trimmed = text.trim_end();
    if trimmed.len() <= max {
        return trimmed;
    }
    let mut start = trimmed.len() - max;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    &trimmed[start..]
}

/// `FFprobe` JSON output structure
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    #[serde(default)]
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}
