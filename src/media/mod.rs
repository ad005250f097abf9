//! Media model and local media processing
//!
//! A [`MediaClip`] is an edit description over a local source file: the
//! trim window, crop rectangle and fade-out to apply. Nothing is decoded
//! until a [`MediaEngine`] extracts audio or encodes the final composition.

pub mod ffmpeg;
pub mod geometry;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::compose::Composition;
use crate::error::{PipelineError, Result};
use crate::timecode::TimeRange;

pub use ffmpeg::FfmpegEngine;
pub use geometry::{compute_crop, CropRect, OverlayAnchor, TARGET_ASPECT};

/// Probed properties of a source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f32,
    pub duration: f64,
    pub has_audio: bool,
}

/// Edit description over a local source file
#[derive(Debug, Clone, PartialEq)]
pub struct MediaClip {
    source: PathBuf,
    info: MediaInfo,
    trim: TimeRange,
    crop: Option<CropRect>,
    fade_out: Option<f64>,
}

impl MediaClip {
    /// Wrap a probed source; the clip initially spans the whole file.
    pub fn from_source(source: impl Into<PathBuf>, info: MediaInfo) -> Result<Self> {
        if info.width == 0 || info.height == 0 {
            return Err(PipelineError::Encoding(format!(
                "source has no usable video frames ({}x{})",
                info.width, info.height
            )));
        }
        let duration = if info.duration.is_finite() {
            info.duration.max(0.0)
        } else {
            0.0
        };
        Ok(Self {
            source: source.into(),
            trim: TimeRange {
                start: 0.0,
                end: duration,
            },
            info: MediaInfo { duration, ..info },
            crop: None,
            fade_out: None,
        })
    }

    /// Restrict the clip to `range` (source seconds).
    ///
    /// An end past the source duration is clamped; a start at or past the
    /// end of the source is an error.
    pub fn subclip(mut self, range: TimeRange) -> Result<Self> {
        if range.start >= self.info.duration {
            return Err(PipelineError::InvalidTimecode(format!(
                "start {}s is past the end of the source ({:.3}s)",
                range.start, self.info.duration
            )));
        }
        let end = if range.end > self.info.duration {
            warn!(
                "Trim end {}s exceeds source duration {:.3}s, clamping",
                range.end, self.info.duration
            );
            self.info.duration
        } else {
            range.end
        };
        self.trim = TimeRange {
            start: range.start,
            end,
        };
        Ok(self)
    }

    /// Fade the tail of the clip out over `seconds` (capped at the clip length).
    #[must_use]
    pub fn with_fade_out(mut self, seconds: f64) -> Self {
        self.fade_out = (seconds > 0.0).then(|| seconds.min(self.duration()));
        self
    }

    /// Apply a crop window given in source coordinates.
    #[must_use]
    pub fn cropped(mut self, rect: CropRect) -> Self {
        self.crop = Some(rect);
        self
    }

    #[must_use]
    pub fn source(&self) -> &Path {
        &self.source
    }

    #[must_use]
    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    #[must_use]
    pub fn trim(&self) -> TimeRange {
        self.trim
    }

    #[must_use]
    pub fn crop(&self) -> Option<CropRect> {
        self.crop
    }

    #[must_use]
    pub fn fade_out(&self) -> Option<f64> {
        self.fade_out
    }

    /// Frame width after cropping
    #[must_use]
    pub fn width(&self) -> u32 {
        self.crop.map_or(self.info.width, |c| c.width)
    }

    /// Frame height after cropping
    #[must_use]
    pub fn height(&self) -> u32 {
        self.crop.map_or(self.info.height, |c| c.height)
    }

    #[must_use]
    pub fn duration(&self) -> f64 {
        self.trim.duration()
    }

    #[must_use]
    pub fn has_audio(&self) -> bool {
        self.info.has_audio
    }
}

/// Local media processing backend.
///
/// The pipeline only needs three operations from it; [`FfmpegEngine`] is the
/// production implementation.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Read dimensions, frame rate, duration and audio presence.
    async fn probe(&self, path: &Path) -> Result<MediaInfo>;

    /// Render the clip's audio as 16-bit PCM WAV bytes.
    async fn extract_audio(&self, clip: &MediaClip, work_dir: &Path) -> Result<Vec<u8>>;

    /// Encode a composition into a playable container and return its bytes.
    async fn encode(&self, composition: &Composition, work_dir: &Path) -> Result<Vec<u8>>;
}
