//! Word-level captions for shorts
//!
//! - **Style** - one color/font per run, picked from a [`Palette`]
//! - **Alignment** - transcript words to delayed, upper-cased intervals
//! - **Rendering** - intervals to an ASS overlay burned in by ffmpeg
//!
//! # Example
//!
//! ```rust
//! use shortsmith::captions::{align, CaptionRenderer, CaptionStyle, TranscriptWord};
//!
//! let style = CaptionStyle::default();
//! let words = vec![TranscriptWord::new("hello", 1.0, 1.4)];
//! let track = CaptionRenderer::new().render(align(&words, 0.05, &style), &style);
//! assert_eq!(track.caption_at(1.2).unwrap().text, "HELLO");
//! ```

pub mod align;
pub mod render;
pub mod style;

pub use align::{align, CaptionInterval, TranscriptWord, DEFAULT_DELAY_SECS};
pub use render::{CaptionRenderer, RenderedOverlayTrack};
pub use style::{named_color_hex, CaptionStyle, Palette};
