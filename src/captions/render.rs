//! Caption overlay track and its ASS rendering
//!
//! The overlay is burned in by ffmpeg's `ass` filter, so "rendering" means
//! producing an ASS script whose play resolution matches the cropped canvas
//! and whose events are pinned at the compositor's anchor.

use std::fmt::Write as FmtWrite;
use std::path::Path;

use tokio::fs;

use super::align::CaptionInterval;
use super::style::{ass_color, CaptionStyle};
use crate::error::{PipelineError, Result};

/// Name of the single style line in generated scripts
const STYLE_NAME: &str = "Caption";

/// Timed caption stream with one style for the whole run
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedOverlayTrack {
    intervals: Vec<CaptionInterval>,
    style: CaptionStyle,
    duration: f64,
}

impl RenderedOverlayTrack {
    /// Track length: the latest caption end, 0 when empty.
    #[must_use]
    pub fn duration(&self) -> f64 {
        self.duration
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    #[must_use]
    pub fn intervals(&self) -> &[CaptionInterval] {
        &self.intervals
    }

    #[must_use]
    pub fn style(&self) -> &CaptionStyle {
        &self.style
    }

    /// Caption visible at `t`, if any. Gaps between words show nothing.
    #[must_use]
    pub fn caption_at(&self, t: f64) -> Option<&CaptionInterval> {
        self.intervals.iter().find(|interval| interval.contains(t))
    }
}

/// Builds overlay tracks and writes them as ASS scripts
#[derive(Debug, Clone)]
pub struct CaptionRenderer {
    /// Script title
    pub title: String,
    /// Horizontal margin as a fraction of canvas width (bounds the wrap width)
    pub side_margin_ratio: f64,
}

impl Default for CaptionRenderer {
    fn default() -> Self {
        Self {
            title: "shortsmith captions".to_string(),
            side_margin_ratio: 0.05,
        }
    }
}

impl CaptionRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble the overlay track for a run.
    #[must_use]
    pub fn render(&self, intervals: Vec<CaptionInterval>, style: &CaptionStyle) -> RenderedOverlayTrack {
        let duration = intervals
            .iter()
            .map(|interval| interval.end)
            .fold(0.0_f64, f64::max);
        RenderedOverlayTrack {
            intervals,
            style: style.clone(),
            duration,
        }
    }

    /// Produce an ASS script for `track` on a `canvas` with captions pinned
    /// at `anchor` (top-center of the caption box).
    pub fn to_ass(
        &self,
        track: &RenderedOverlayTrack,
        canvas: (u32, u32),
        anchor: (u32, u32),
    ) -> Result<String> {
        let (width, height) = canvas;
        let style = track.style();
        let (font_size, outline) = style.scaled_to(width);
        let (family, bold) = style.font_family();
        let primary = ass_color(&style.color)
            .ok_or_else(|| PipelineError::Config(format!("unknown caption color '{}'", style.color)))?;
        let stroke = ass_color(&style.stroke_color).ok_or_else(|| {
            PipelineError::Config(format!("unknown stroke color '{}'", style.stroke_color))
        })?;
        let margin = (f64::from(width) * self.side_margin_ratio).round() as u32;

        let mut out = String::new();

        writeln!(out, "[Script Info]")?;
        writeln!(out, "Title: {}", self.title)?;
        writeln!(out, "ScriptType: v4.00+")?;
        writeln!(out, "WrapStyle: 0")?;
        writeln!(out, "PlayResX: {width}")?;
        writeln!(out, "PlayResY: {height}")?;
        writeln!(out, "ScaledBorderAndShadow: yes")?;
        writeln!(out)?;

        writeln!(out, "[V4+ Styles]")?;
        writeln!(
            out,
            "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, \
             OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, \
             ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, \
             MarginL, MarginR, MarginV, Encoding"
        )?;
        writeln!(
            out,
            "Style: {STYLE_NAME},{family},{font_size},{primary},&H000000FF,{stroke},&H00000000,{},0,0,0,100,100,0,0,1,{outline},0,8,{margin},{margin},0,1",
            if bold { -1 } else { 0 },
        )?;
        writeln!(out)?;

        writeln!(out, "[Events]")?;
        writeln!(
            out,
            "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text"
        )?;

        let (x, y) = anchor;
        for interval in track.intervals() {
            // Zero-length captions never show; libass would drop them anyway
            if interval.end <= interval.start {
                continue;
            }
            writeln!(
                out,
                "Dialogue: 0,{},{},{STYLE_NAME},,0,0,0,,{{\\an8\\pos({x},{y})}}{}",
                format_ass_time(interval.start),
                format_ass_time(interval.end),
                escape_ass_text(&interval.text),
            )?;
        }

        Ok(out)
    }

    /// Write the ASS script for `track` to `path`.
    pub async fn write_ass(
        &self,
        track: &RenderedOverlayTrack,
        canvas: (u32, u32),
        anchor: (u32, u32),
        path: &Path,
    ) -> Result<()> {
        let content = self.to_ass(track, canvas, anchor)?;
        fs::write(path, content).await?;
        Ok(())
    }
}

/// Format seconds as an ASS timestamp (H:MM:SS.cc)
fn format_ass_time(seconds: f64) -> String {
    let centis = (seconds.max(0.0) * 100.0).round() as u64;
    let hours = centis / 360_000;
    let minutes = (centis % 360_000) / 6000;
    let secs = (centis % 6000) / 100;
    let cs = centis % 100;
    format!("{hours}:{minutes:02}:{secs:02}.{cs:02}")
}

/// ASS has no escape for a literal backslash; a word joiner after it keeps
/// `\N`, `\h` and override tags from being recognized.
fn escape_ass_text(text: &str) -> String {
    text.replace('\\', "\\\u{2060}")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('\n', "\\N")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::captions::align::{align, TranscriptWord};

    fn track() -> RenderedOverlayTrack {
        let style = CaptionStyle {
            color: "yellow".to_string(),
            font: "Comic-Sans-MS-Bold".to_string(),
            ..Default::default()
        };
        let words = vec![
            TranscriptWord::new("hello", 1.0, 1.4),
            TranscriptWord::new("world", 1.5, 1.9),
        ];
        CaptionRenderer::new().render(align(&words, 0.05, &style), &style)
    }

    #[test]
    fn test_ass_time_format() {
        assert_eq!(format_ass_time(0.0), "0:00:00.00");
        assert_eq!(format_ass_time(1.05), "0:00:01.05");
        assert_eq!(format_ass_time(61.0), "0:01:01.00");
        assert_eq!(format_ass_time(3661.5), "1:01:01.50");
    }

    #[test]
    fn test_duration_is_last_end() {
        let track = track();
        assert!((track.duration() - 1.95).abs() < 1e-9);
    }

    #[test]
    fn test_caption_lookup() {
        let track = track();
        assert_eq!(track.caption_at(1.2).map(|c| c.text.as_str()), Some("HELLO"));
        assert_eq!(track.caption_at(1.06).map(|c| c.text.as_str()), Some("HELLO"));
        // The pause between words is blank
        assert!(track.caption_at(1.47).is_none());
        assert!(track.caption_at(1.5).is_none());
        assert_eq!(track.caption_at(1.6).map(|c| c.text.as_str()), Some("WORLD"));
        assert!(track.caption_at(5.0).is_none());
    }

    #[test]
    fn test_empty_track() {
        let track = CaptionRenderer::new().render(Vec::new(), &CaptionStyle::default());
        assert!(track.is_empty());
        assert_eq!(track.duration(), 0.0);
        assert!(track.caption_at(0.0).is_none());
    }

    #[test]
    fn test_ass_document() {
        let ass = CaptionRenderer::new()
            .to_ass(&track(), (608, 1080), (304, 675))
            .unwrap();

        assert!(ass.contains("[Script Info]"));
        assert!(ass.contains("WrapStyle: 0"));
        assert!(ass.contains("PlayResX: 608"));
        assert!(ass.contains("PlayResY: 1080"));
        assert!(ass.contains("Style: Caption,Comic Sans MS,56,&H0000FFFF,"));
        assert!(ass.contains(
            "Dialogue: 0,0:00:01.05,0:00:01.45,Caption,,0,0,0,,{\\an8\\pos(304,675)}HELLO"
        ));
        assert!(ass.contains("0:00:01.55,0:00:01.95"));
    }

    #[test]
    fn test_ass_escapes_text() {
        let style = CaptionStyle::default();
        let intervals = align(&[TranscriptWord::new("{x}", 0.0, 1.0)], 0.0, &style);
        let track = CaptionRenderer::new().render(intervals, &style);
        let ass = CaptionRenderer::new().to_ass(&track, (1080, 1920), (540, 1200)).unwrap();
        assert!(ass.contains("}\\{X\\}"));
    }

    #[test]
    fn test_ass_backslash_renders_once() {
        assert_eq!(escape_ass_text("AND\\OR"), "AND\\\u{2060}OR");
        assert_eq!(escape_ass_text("A\\NB"), "A\\\u{2060}NB");
        assert!(!escape_ass_text("A\\NB").contains("\\N"));
    }

    #[test]
    fn test_unknown_color_rejected() {
        let style = CaptionStyle {
            color: "nope".to_string(),
            ..Default::default()
        };
        let track = CaptionRenderer::new().render(Vec::new(), &style);
        assert!(CaptionRenderer::new().to_ass(&track, (1080, 1920), (0, 0)).is_err());
    }
}
