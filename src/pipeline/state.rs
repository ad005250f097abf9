//! Pipeline stages
//!
//! A run walks [`PipelineStage::SEQUENCE`] strictly forward. `Failed` can be
//! entered from any stage and, like `Done`, is terminal.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Acquiring,
    Trimming,
    Cropping,
    ExtractingAudio,
    Transcribing,
    Aligning,
    Rendering,
    Compositing,
    Encoding,
    Publishing,
    CleaningUp,
    Done,
    Failed,
}

impl PipelineStage {
    /// The happy path, in order
    pub const SEQUENCE: [Self; 12] = [
        Self::Acquiring,
        Self::Trimming,
        Self::Cropping,
        Self::ExtractingAudio,
        Self::Transcribing,
        Self::Aligning,
        Self::Rendering,
        Self::Compositing,
        Self::Encoding,
        Self::Publishing,
        Self::CleaningUp,
        Self::Done,
    ];

    /// Stage that follows this one on success
    #[must_use]
    pub fn next(self) -> Option<Self> {
        let idx = Self::SEQUENCE.iter().position(|s| *s == self)?;
        Self::SEQUENCE.get(idx + 1).copied()
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Whether moving from `self` to `to` is a legal transition
    #[must_use]
    pub fn can_transition(self, to: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == Self::Failed || self.next() == Some(to)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Acquiring => "acquiring",
            Self::Trimming => "trimming",
            Self::Cropping => "cropping",
            Self::ExtractingAudio => "extracting_audio",
            Self::Transcribing => "transcribing",
            Self::Aligning => "aligning",
            Self::Rendering => "rendering",
            Self::Compositing => "compositing",
            Self::Encoding => "encoding",
            Self::Publishing => "publishing",
            Self::CleaningUp => "cleaning_up",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_walks_forward() {
        let mut stage = PipelineStage::Acquiring;
        let mut walked = vec![stage];
        while let Some(next) = stage.next() {
            assert!(stage.can_transition(next));
            walked.push(next);
            stage = next;
        }
        assert_eq!(walked, PipelineStage::SEQUENCE);
        assert_eq!(stage, PipelineStage::Done);
    }

    #[test]
    fn test_failed_reachable_from_any_stage() {
        for stage in PipelineStage::SEQUENCE.iter().filter(|s| !s.is_terminal()) {
            assert!(stage.can_transition(PipelineStage::Failed));
        }
        assert!(!PipelineStage::Done.can_transition(PipelineStage::Failed));
        assert_eq!(PipelineStage::Failed.next(), None);
    }

    #[test]
    fn test_no_skipping_or_going_back() {
        assert!(!PipelineStage::Acquiring.can_transition(PipelineStage::Cropping));
        assert!(!PipelineStage::Encoding.can_transition(PipelineStage::Rendering));
    }

    #[test]
    fn test_names() {
        assert_eq!(PipelineStage::ExtractingAudio.to_string(), "extracting_audio");
        assert_eq!(
            serde_json::to_string(&PipelineStage::CleaningUp).unwrap(),
            "\"cleaning_up\""
        );
    }
}
