//! `shortsmith` - Turn long videos into cropped, captioned 9:16 shorts
//!
//! # Features
//!
//! - **Geometry**: centered 9:16 crop windows for any source frame
//! - **Captions**: one upper-cased caption per spoken word, styled once per run
//! - **Compositing**: crop, fade and burned-in captions in a single ffmpeg pass
//! - **Pipeline**: acquire → trim → crop → transcribe → caption → encode → publish
//! - **Service**: `GET /make-short?link=&start=&end=` over axum
//!
//! # Example
//!
//! ```rust
//! use shortsmith::captions::{align, CaptionStyle, TranscriptWord};
//! use shortsmith::media::compute_crop;
//!
//! let crop = compute_crop(1920, 1080);
//! assert_eq!((crop.x, crop.width), (656, 608));
//!
//! let words = vec![TranscriptWord::new("hello", 1.0, 1.4)];
//! let captions = align(&words, 0.05, &CaptionStyle::default());
//! assert_eq!(captions[0].text, "HELLO");
//! ```

pub mod acquire;
pub mod captions;
pub mod compose;
pub mod config;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod server;
pub mod storage;
pub mod timecode;
pub mod transcribe;

pub use acquire::{SourceAcquirer, SourceMedia, SourceRouter};
pub use captions::{align, CaptionInterval, CaptionRenderer, CaptionStyle, Palette, RenderedOverlayTrack, TranscriptWord};
pub use compose::{Composition, Compositor, CompositorConfig};
pub use config::Config;
pub use error::{ErrorKind, PipelineError, Result};
pub use media::{compute_crop, CropRect, FfmpegEngine, MediaClip, MediaEngine, MediaInfo, OverlayAnchor};
pub use pipeline::{Orchestrator, PipelineConfig, PipelineRequest, PipelineResult, PipelineStage, StageFailure};
pub use storage::{BlobStore, HttpBlobStore, LocalBlobStore, MemoryBlobStore};
pub use timecode::{parse_offset, TimeRange};
pub use transcribe::{OpenAiTranscriber, Transcriber, Transcript};

/// Version of shortsmith
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
