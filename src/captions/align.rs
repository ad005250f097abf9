//! Transcript words to timed caption intervals.
//!
//! One word becomes one caption. Timing is shifted by a small delay so the
//! caption lands just after the word starts being spoken; nothing is merged,
//! split or de-overlapped.

use serde::{Deserialize, Serialize};

use super::style::CaptionStyle;

/// Default caption delay in seconds
pub const DEFAULT_DELAY_SECS: f64 = 0.05;

/// A word with its timing, as returned by the transcription service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptWord {
    #[serde(alias = "word")]
    pub text: String,
    pub start: f64,
    pub end: f64,
}

impl TranscriptWord {
    #[must_use]
    pub fn new(text: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// A caption shown on screen during `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionInterval {
    pub text: String,
    pub start: f64,
    pub end: f64,
    pub style: CaptionStyle,
}

impl CaptionInterval {
    /// Whether the caption is visible at `t`
    #[must_use]
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t < self.end
    }
}

/// Convert transcript words into caption intervals.
///
/// Each interval is `word + delay`, upper-cased, in the same order as the
/// input. Negative starts (only possible with a negative delay) clamp to 0.
#[must_use]
pub fn align(words: &[TranscriptWord], delay: f64, style: &CaptionStyle) -> Vec<CaptionInterval> {
    words
        .iter()
        .map(|word| {
            let start = (word.start + delay).max(0.0);
            let end = (word.end + delay).max(start);
            CaptionInterval {
                text: word.text.trim().to_uppercase(),
                start,
                end,
                style: style.clone(),
            }
        })
        .collect()
}
