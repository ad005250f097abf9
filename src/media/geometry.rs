//! Portrait reframing geometry
//!
//! Converts any source frame into a centered 9:16 window and places the
//! caption anchor proportionally on the resulting canvas.

use serde::{Deserialize, Serialize};

/// Target width/height ratio for portrait shorts.
pub const TARGET_ASPECT: f64 = 9.0 / 16.0;

/// Crop window in source-pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    /// Width/height ratio of the window
    #[must_use]
    pub fn aspect(&self) -> f64 {
        f64::from(self.width) / f64::from(self.height)
    }

    /// Check whether the window lies inside a `width` x `height` frame
    #[must_use]
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        u64::from(self.x) + u64::from(self.width) <= u64::from(width)
            && u64::from(self.y) + u64::from(self.height) <= u64::from(height)
    }

    /// Shrink to even dimensions, keeping the window centered where it was.
    ///
    /// 4:2:0 encoders such as libx264 reject odd frame sizes. The result
    /// stays inside a `frame_width` x `frame_height` frame.
    #[must_use]
    pub fn to_even(&self, frame_width: u32, frame_height: u32) -> CropRect {
        let width = even_down(self.width).min(frame_width);
        let height = even_down(self.height).min(frame_height);
        CropRect {
            x: (self.x + (self.width - width).div_ceil(2)).min(frame_width - width),
            y: (self.y + (self.height - height).div_ceil(2)).min(frame_height - height),
            width,
            height,
        }
    }

    /// ffmpeg `crop` filter expression
    #[must_use]
    pub fn to_ffmpeg_filter(&self) -> String {
        format!("crop={}:{}:{}:{}", self.width, self.height, self.x, self.y)
    }
}

fn even_down(n: u32) -> u32 {
    if n < 2 {
        n
    } else {
        n & !1
    }
}

/// Compute the centered 9:16 crop for a `width` x `height` frame.
///
/// Wider sources lose their sides, taller sources lose top and bottom.
/// When rounding would push the window past the frame it is clamped to the
/// frame, trading a sub-pixel ratio error for containment.
#[must_use]
pub fn compute_crop(width: u32, height: u32) -> CropRect {
    let (w, h) = (f64::from(width.max(1)), f64::from(height.max(1)));

    if w / h > TARGET_ASPECT {
        let new_width = ((TARGET_ASPECT * h).round() as u32).clamp(1, width.max(1));
        CropRect {
            x: (width.saturating_sub(new_width)) / 2,
            y: 0,
            width: new_width,
            height: height.max(1),
        }
    } else {
        let new_height = ((w / TARGET_ASPECT).round() as u32).clamp(1, height.max(1));
        CropRect {
            x: 0,
            y: (height.saturating_sub(new_height)) / 2,
            width: width.max(1),
            height: new_height,
        }
    }
}

/// Caption anchor expressed as fractions of the output canvas.
///
/// `x_ratio` is the horizontal center of the caption box, `y_ratio` its top
/// edge. The defaults center captions horizontally and put them 62.5% of the
/// way down, the 1200/1920 placement portrait shorts are framed around.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayAnchor {
    pub x_ratio: f64,
    pub y_ratio: f64,
}

impl Default for OverlayAnchor {
    fn default() -> Self {
        Self {
            x_ratio: 0.5,
            y_ratio: 0.625,
        }
    }
}

impl OverlayAnchor {
    #[must_use]
    pub fn new(x_ratio: f64, y_ratio: f64) -> Self {
        Self { x_ratio, y_ratio }
    }

    /// Resolve the anchor to pixel coordinates on a canvas.
    #[must_use]
    pub fn position(&self, canvas_width: u32, canvas_height: u32) -> (u32, u32) {
        let x = (f64::from(canvas_width) * self.x_ratio.clamp(0.0, 1.0)).round() as u32;
        let y = (f64::from(canvas_height) * self.y_ratio.clamp(0.0, 1.0)).round() as u32;
        (x.min(canvas_width), y.min(canvas_height))
    }
}
