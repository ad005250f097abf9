//! Caption styles and the palette they are drawn from.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Colors captions are drawn in by default
pub const DEFAULT_COLORS: &[&str] = &["green", "yellow", "red", "white"];

/// Fonts captions are drawn in by default
pub const DEFAULT_FONTS: &[&str] = &["Impact", "Comic-Sans-MS-Bold"];

/// Canvas width the palette's font size and stroke width are tuned for.
pub const REFERENCE_WIDTH: u32 = 1080;

/// Look up a named color as `RRGGBB` hex.
///
/// Accepts the common X11/CSS names and `#RRGGBB` literals.
#[must_use]
pub fn named_color_hex(name: &str) -> Option<String> {
    let lower = name.trim().to_ascii_lowercase();
    if let Some(hex) = lower.strip_prefix('#') {
        return (hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()))
            .then(|| hex.to_ascii_uppercase());
    }
    let hex = match lower.as_str() {
        "black" => "000000",
        "white" => "FFFFFF",
        "red" => "FF0000",
        "green" => "008000",
        "lime" => "00FF00",
        "blue" => "0000FF",
        "yellow" => "FFFF00",
        "orange" => "FFA500",
        "purple" => "800080",
        "pink" => "FFC0CB",
        "cyan" => "00FFFF",
        "magenta" => "FF00FF",
        "gray" | "grey" => "808080",
        _ => return None,
    };
    Some(hex.to_string())
}

/// Convert a named color to ASS `&HAABBGGRR` notation (opaque).
#[must_use]
pub fn ass_color(name: &str) -> Option<String> {
    let hex = named_color_hex(name)?;
    Some(format!("&H00{}{}{}", &hex[4..6], &hex[2..4], &hex[0..2]))
}

/// Visual style shared by every caption of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionStyle {
    /// Fill color name
    pub color: String,
    /// Font name (`-Bold` suffix selects the bold face)
    pub font: String,
    /// Outline color name
    pub stroke_color: String,
    /// Outline width at the reference canvas width
    pub stroke_width: f32,
    /// Font size at the reference canvas width
    pub font_size: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            color: "white".to_string(),
            font: "Impact".to_string(),
            stroke_color: "black".to_string(),
            stroke_width: 6.0,
            font_size: 100,
        }
    }
}

impl CaptionStyle {
    /// Font family and bold flag for the configured font name.
    ///
    /// `Comic-Sans-MS-Bold` becomes `("Comic Sans MS", true)`.
    #[must_use]
    pub fn font_family(&self) -> (String, bool) {
        let (base, bold) = match self.font.strip_suffix("-Bold") {
            Some(base) => (base, true),
            None => (self.font.as_str(), false),
        };
        (base.replace('-', " "), bold)
    }

    /// Font size and stroke width scaled to a canvas width.
    #[must_use]
    pub fn scaled_to(&self, canvas_width: u32) -> (u32, f32) {
        let scale = f64::from(canvas_width) / f64::from(REFERENCE_WIDTH);
        let size = (f64::from(self.font_size) * scale).round().max(1.0) as u32;
        let stroke = (f64::from(self.stroke_width) * scale) as f32;
        (size, stroke)
    }
}

/// Enumerated choices a run's style is picked from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub colors: Vec<String>,
    pub fonts: Vec<String>,
    pub stroke_color: String,
    pub stroke_width: f32,
    pub font_size: u32,
}

impl Default for Palette {
    fn default() -> Self {
        let style = CaptionStyle::default();
        Self {
            colors: DEFAULT_COLORS.iter().map(ToString::to_string).collect(),
            fonts: DEFAULT_FONTS.iter().map(ToString::to_string).collect(),
            stroke_color: style.stroke_color,
            stroke_width: style.stroke_width,
            font_size: style.font_size,
        }
    }
}

impl Palette {
    /// Check that every choice is usable.
    pub fn validate(&self) -> Result<()> {
        if self.colors.is_empty() || self.fonts.is_empty() {
            return Err(PipelineError::Config(
                "caption palette needs at least one color and one font".to_string(),
            ));
        }
        for color in self.colors.iter().chain(std::iter::once(&self.stroke_color)) {
            if named_color_hex(color).is_none() {
                return Err(PipelineError::Config(format!("unknown caption color '{color}'")));
            }
        }
        if self.font_size == 0 {
            return Err(PipelineError::Config("caption font size must be positive".to_string()));
        }
        Ok(())
    }

    /// Pick one color and one font uniformly at random.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> CaptionStyle {
        let fallback = CaptionStyle::default();
        CaptionStyle {
            color: self.colors.choose(rng).cloned().unwrap_or(fallback.color),
            font: self.fonts.choose(rng).cloned().unwrap_or(fallback.font),
            stroke_color: self.stroke_color.clone(),
            stroke_width: self.stroke_width,
            font_size: self.font_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_named_colors() {
        assert_eq!(named_color_hex("Yellow").as_deref(), Some("FFFF00"));
        assert_eq!(named_color_hex("#00ff80").as_deref(), Some("00FF80"));
        assert_eq!(named_color_hex("#12345"), None);
        assert_eq!(named_color_hex("chartreuse-ish"), None);
    }

    #[test]
    fn test_ass_color_is_bgr() {
        assert_eq!(ass_color("red").as_deref(), Some("&H000000FF"));
        assert_eq!(ass_color("green").as_deref(), Some("&H00008000"));
        assert_eq!(ass_color("black").as_deref(), Some("&H00000000"));
    }

    #[test]
    fn test_font_family() {
        let style = CaptionStyle {
            font: "Comic-Sans-MS-Bold".to_string(),
            ..Default::default()
        };
        assert_eq!(style.font_family(), ("Comic Sans MS".to_string(), true));
        assert_eq!(
            CaptionStyle::default().font_family(),
            ("Impact".to_string(), false)
        );
    }

    #[test]
    fn test_scaling() {
        let style = CaptionStyle::default();
        assert_eq!(style.scaled_to(1080), (100, 6.0));
        assert_eq!(style.scaled_to(540), (50, 3.0));
    }

    #[test]
    fn test_pick_stays_in_palette() {
        let palette = Palette::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let style = palette.pick(&mut rng);
            assert!(palette.colors.contains(&style.color));
            assert!(palette.fonts.contains(&style.font));
            assert_eq!(style.stroke_color, "black");
            assert_eq!(style.font_size, 100);
        }
    }

    #[test]
    fn test_validate() {
        assert!(Palette::default().validate().is_ok());

        let empty = Palette {
            fonts: Vec::new(),
            ..Default::default()
        };
        assert!(empty.validate().is_err());

        let unknown = Palette {
            colors: vec!["mauve-ish".to_string()],
            ..Default::default()
        };
        assert!(unknown.validate().is_err());
    }
}
