//! Error taxonomy for the short-clip pipeline.
//!
//! Every stage returns [`Result`]; the orchestrator tags failures with the
//! stage they happened in. The kinds exist for logging. Clients only ever
//! see a generic failure message.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid time offset: {0}")]
    InvalidTimecode(String),

    #[error("Acquisition error: {0}")]
    Acquisition(String),

    #[error("Transcription error: {0}")]
    Transcription(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Transcript contains no words to caption")]
    EmptyTranscript,

    #[error("Pipeline exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Format error: {0}")]
    Format(#[from] std::fmt::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Coarse classification used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    MissingParameter,
    InvalidInput,
    Acquisition,
    Transcription,
    Encoding,
    Storage,
    Timeout,
    Config,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingParameter => "missing_parameter",
            Self::InvalidInput => "invalid_input",
            Self::Acquisition => "acquisition_failure",
            Self::Transcription => "transcription_failure",
            Self::Encoding => "encoding_failure",
            Self::Storage => "storage_failure",
            Self::Timeout => "timeout",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    /// Classify this error for logging.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingParameter(_) => ErrorKind::MissingParameter,
            Self::InvalidTimecode(_) | Self::EmptyTranscript => ErrorKind::InvalidInput,
            Self::Acquisition(_) => ErrorKind::Acquisition,
            Self::Transcription(_) => ErrorKind::Transcription,
            // Local media work is the only thing that touches the filesystem
            Self::Encoding(_) | Self::Io(_) => ErrorKind::Encoding,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Config(_) => ErrorKind::Config,
            Self::Json(_) | Self::Format(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            PipelineError::Storage("bucket".into()).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            PipelineError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(PipelineError::EmptyTranscript.kind(), ErrorKind::InvalidInput);
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(PipelineError::from(io).kind(), ErrorKind::Encoding);
    }

    #[test]
    fn test_error_display() {
        let err = PipelineError::MissingParameter("start".to_string());
        assert_eq!(err.to_string(), "Missing parameter: start");
        assert_eq!(ErrorKind::Transcription.to_string(), "transcription_failure");
    }
}
