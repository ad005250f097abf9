//! ffmpeg-based compositor for burning caption overlays into cropped clips
//!
//! Supports:
//! - Crop and fade-out applied in one filter pass
//! - ASS caption burning at a proportional anchor
//! - Truncation to the caption track's duration
//! - Software and hardware H.264 encoders

use std::path::Path;

use crate::captions::RenderedOverlayTrack;
use crate::media::{MediaClip, OverlayAnchor};

/// Configuration for the compositor
#[derive(Debug, Clone)]
pub struct CompositorConfig {
    /// Path to ffmpeg binary
    pub ffmpeg_path: String,
    /// Video codec
    pub video_codec: String,
    /// Audio codec
    pub audio_codec: String,
    /// Encoder preset (x264 naming)
    pub preset: Option<String>,
    /// Constant rate factor
    pub crf: Option<u8>,
    /// Audio bitrate (e.g., "192k")
    pub audio_bitrate: Option<String>,
    /// Hardware acceleration (e.g., "videotoolbox", "cuda")
    pub hwaccel: Option<String>,
    /// Additional ffmpeg output arguments
    pub output_args: Vec<String>,
    /// Caption placement on the cropped canvas
    pub anchor: OverlayAnchor,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: which::which("ffmpeg").map_or_else(
                |_| "ffmpeg".to_string(),
                |p| p.to_string_lossy().to_string(),
            ),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: Some("medium".to_string()),
            crf: Some(23),
            audio_bitrate: Some("192k".to_string()),
            hwaccel: None,
            output_args: Vec::new(),
            anchor: OverlayAnchor::default(),
        }
    }
}

impl CompositorConfig {
    /// Enable hardware acceleration
    #[must_use]
    pub fn with_hwaccel(mut self, accel: &str) -> Self {
        self.hwaccel = Some(accel.to_string());

        // Set appropriate video codec for the accelerator
        self.video_codec = match accel {
            "videotoolbox" => "h264_videotoolbox".to_string(),
            "cuda" | "nvenc" => "h264_nvenc".to_string(),
            "vaapi" => "h264_vaapi".to_string(),
            "qsv" => "h264_qsv".to_string(),
            _ => "libx264".to_string(),
        };
        // x264 rate control flags don't apply to hardware encoders
        if self.video_codec != "libx264" {
            self.preset = None;
            self.crf = None;
        }

        self
    }
}

/// A cropped clip paired with its caption overlay
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub clip: MediaClip,
    pub overlay: RenderedOverlayTrack,
    /// Output length: the shorter of the clip and the overlay
    pub duration: f64,
    /// Caption anchor in canvas pixels
    pub anchor: (u32, u32),
}

impl Composition {
    /// A composition with nothing to show; it must not be encoded.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.duration <= 0.0
    }

    /// Output canvas size
    #[must_use]
    pub fn canvas(&self) -> (u32, u32) {
        (self.clip.width(), self.clip.height())
    }
}

/// ffmpeg-based video compositor
#[derive(Debug, Clone, Default)]
pub struct Compositor {
    config: CompositorConfig,
}

impl Compositor {
    /// Create a new compositor with default config
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new compositor with custom config
    #[must_use]
    pub fn with_config(config: CompositorConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    /// Pair a clip with its overlay.
    ///
    /// The result is cut to the overlay's length, so video after the last
    /// caption is dropped. An empty overlay yields a degenerate composition.
    /// The crop window is evened out for the encoder before the canvas and
    /// anchor are derived from it.
    #[must_use]
    pub fn compose(&self, clip: MediaClip, overlay: RenderedOverlayTrack) -> Composition {
        let clip = match clip.crop() {
            Some(rect) => {
                let (frame_width, frame_height) = (clip.info().width, clip.info().height);
                clip.cropped(rect.to_even(frame_width, frame_height))
            }
            None => clip,
        };
        let duration = clip.duration().min(overlay.duration()).max(0.0);
        let anchor = self.config.anchor.position(clip.width(), clip.height());
        Composition {
            clip,
            overlay,
            duration,
            anchor,
        }
    }

    /// Build the video filter chain: crop, fade, then captions
    pub fn build_video_filter(&self, composition: &Composition, subtitle_file: Option<&Path>) -> String {
        let clip = &composition.clip;
        let mut filters = Vec::new();

        if let Some(rect) = clip.crop() {
            filters.push(rect.to_ffmpeg_filter());
        }

        // The fade sits at the tail of the trimmed clip, even when the
        // caption track cuts the output before it
        if let Some(fade) = clip.fade_out() {
            let start = (clip.duration() - fade).max(0.0);
            filters.push(format!("fade=t=out:st={start:.3}:d={fade:.3}"));
        }

        if let Some(ass_path) = subtitle_file {
            let path_escaped = ass_path
                .to_string_lossy()
                .replace('\\', "\\\\")
                .replace(':', "\\:")
                .replace('\'', "\\'");
            filters.push(format!("ass='{path_escaped}'"));
        }

        filters.join(",")
    }

    /// Build the audio filter (matching fade-out), if the clip has audio
    pub fn build_audio_filter(&self, composition: &Composition) -> Option<String> {
        let clip = &composition.clip;
        if !clip.has_audio() {
            return None;
        }
        clip.fade_out().map(|fade| {
            let start = (clip.duration() - fade).max(0.0);
            format!("afade=t=out:st={start:.3}:d={fade:.3}")
        })
    }

    /// Build ffmpeg arguments for encoding a composition to `output`
    pub fn build_args(
        &self,
        composition: &Composition,
        subtitle_file: Option<&Path>,
        output: &Path,
    ) -> Vec<String> {
        let clip = &composition.clip;
        let mut args = Vec::new();

        args.extend(
            ["-hide_banner", "-loglevel", "warning", "-nostdin"]
                .iter()
                .map(std::string::ToString::to_string),
        );

        if let Some(ref accel) = self.config.hwaccel {
            args.push("-hwaccel".to_string());
            args.push(accel.clone());
        }

        // Input seek keeps the output timeline starting at 0
        args.push("-ss".to_string());
        args.push(format!("{:.3}", clip.trim().start));
        args.push("-i".to_string());
        args.push(clip.source().to_string_lossy().to_string());
        args.push("-t".to_string());
        args.push(format!("{:.3}", composition.duration));

        let filter = self.build_video_filter(composition, subtitle_file);
        if !filter.is_empty() {
            args.push("-vf".to_string());
            args.push(filter);
        }

        args.push("-c:v".to_string());
        args.push(self.config.video_codec.clone());
        if let Some(ref preset) = self.config.preset {
            args.push("-preset".to_string());
            args.push(preset.clone());
        }
        if let Some(crf) = self.config.crf {
            args.push("-crf".to_string());
            args.push(crf.to_string());
        }
        args.push("-pix_fmt".to_string());
        args.push("yuv420p".to_string());

        if clip.has_audio() {
            if let Some(filter) = self.build_audio_filter(composition) {
                args.push("-af".to_string());
                args.push(filter);
            }
            args.push("-c:a".to_string());
            args.push(self.config.audio_codec.clone());
            if let Some(ref bitrate) = self.config.audio_bitrate {
                args.push("-b:a".to_string());
                args.push(bitrate.clone());
            }
        } else {
            args.push("-an".to_string());
        }

        args.extend(self.config.output_args.clone());

        args.push("-movflags".to_string());
        args.push("+faststart".to_string());
        args.push("-y".to_string());
        args.push(output.to_string_lossy().to_string());

        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::{align, CaptionRenderer, CaptionStyle, TranscriptWord};
    use crate::media::{compute_crop, MediaInfo};
    use crate::timecode::TimeRange;
    use std::path::PathBuf;

    fn clip(has_audio: bool) -> MediaClip {
        clip_of(1920, 1080, has_audio)
    }

    fn clip_of(width: u32, height: u32, has_audio: bool) -> MediaClip {
        let info = MediaInfo {
            width,
            height,
            fps: 30.0,
            duration: 60.0,
            has_audio,
        };
        let clip = MediaClip::from_source("/tmp/in.mp4", info)
            .unwrap()
            .subclip(TimeRange::new(10.0, 20.0).unwrap())
            .unwrap()
            .with_fade_out(1.0);
        clip.cropped(compute_crop(width, height))
    }

    fn overlay(last_end: f64) -> RenderedOverlayTrack {
        let style = CaptionStyle::default();
        let words = vec![
            TranscriptWord::new("one", 0.5, 1.0),
            TranscriptWord::new("two", 1.0, last_end),
        ];
        CaptionRenderer::new().render(align(&words, 0.0, &style), &style)
    }

    fn compositor() -> Compositor {
        Compositor::with_config(CompositorConfig {
            ffmpeg_path: "ffmpeg".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_compositor_config_hwaccel() {
        let config = CompositorConfig::default().with_hwaccel("videotoolbox");
        assert_eq!(config.hwaccel, Some("videotoolbox".to_string()));
        assert_eq!(config.video_codec, "h264_videotoolbox");
        assert_eq!(config.crf, None);
    }

    #[test]
    fn test_compose_truncates_to_overlay() {
        let composition = compositor().compose(clip(true), overlay(6.0));
        assert_eq!(composition.duration, 6.0);
        assert_eq!(composition.canvas(), (608, 1080));
        assert_eq!(composition.anchor, (304, 675));
        assert!(!composition.is_degenerate());
    }

    #[test]
    fn test_compose_never_exceeds_clip() {
        let composition = compositor().compose(clip(true), overlay(30.0));
        assert_eq!(composition.duration, 10.0);
    }

    #[test]
    fn test_empty_overlay_is_degenerate() {
        let style = CaptionStyle::default();
        let empty = CaptionRenderer::new().render(Vec::new(), &style);
        let composition = compositor().compose(clip(true), empty);
        assert_eq!(composition.duration, 0.0);
        assert!(composition.is_degenerate());
    }

    #[test]
    fn test_video_filter_chain() {
        let composition = compositor().compose(clip(true), overlay(6.0));
        let path = PathBuf::from("/tmp/run/captions.ass");
        let filter = compositor().build_video_filter(&composition, Some(&path));

        assert_eq!(
            filter,
            "crop=608:1080:656:0,fade=t=out:st=9.000:d=1.000,ass='/tmp/run/captions.ass'"
        );
    }

    #[test]
    fn test_odd_crop_is_evened_for_encoder() {
        let composition = compositor().compose(clip_of(1280, 720, true), overlay(6.0));
        assert_eq!(composition.canvas(), (404, 720));
        assert_eq!(composition.anchor, (202, 450));

        let filter = compositor().build_video_filter(&composition, None);
        assert!(filter.starts_with("crop=404:720:438:0,"), "{filter}");

        let args = compositor().build_args(&composition, None, Path::new("/tmp/out.mp4"));
        assert!(args.iter().any(|a| a.starts_with("crop=404:720:438:0")));
    }

    #[test]
    fn test_build_args() {
        let composition = compositor().compose(clip(true), overlay(6.0));
        let args = compositor().build_args(&composition, None, Path::new("/tmp/out.mp4"));

        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-ss") + 1], "10.000");
        assert_eq!(args[pos("-i") + 1], "/tmp/in.mp4");
        assert_eq!(args[pos("-t") + 1], "6.000");
        assert_eq!(args[pos("-c:v") + 1], "libx264");
        assert_eq!(args[pos("-af") + 1], "afade=t=out:st=9.000:d=1.000");
        assert_eq!(args.last().map(String::as_str), Some("/tmp/out.mp4"));
    }

    #[test]
    fn test_build_args_without_audio() {
        let composition = compositor().compose(clip(false), overlay(6.0));
        let args = compositor().build_args(&composition, None, Path::new("/tmp/out.mp4"));

        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-af".to_string()));
    }
}
