//! Speech-to-text collaborators
//!
//! The pipeline sends the trimmed clip's WAV audio to a [`Transcriber`] and
//! gets back the full text plus word-level timings.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::captions::TranscriptWord;
use crate::config::TranscriptionConfig;
use crate::error::{PipelineError, Result};

/// Transcription result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub words: Vec<TranscriptWord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

impl Transcript {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Speech-to-text service
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Transcribe WAV audio into text with word timings.
    async fn transcribe(&self, audio: Vec<u8>) -> Result<Transcript>;
}

/// Transcriber backed by an OpenAI-compatible `/audio/transcriptions` endpoint
#[derive(Debug, Clone)]
pub struct OpenAiTranscriber {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    language: Option<String>,
}

impl OpenAiTranscriber {
    /// Create a transcriber with the default endpoint and `whisper-1`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::from_config(&TranscriptionConfig {
            api_key: Some(api_key.into()),
            ..Default::default()
        })
    }

    /// Build from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Config`] when no API key is configured.
    pub fn from_config(config: &TranscriptionConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                PipelineError::Config(
                    "transcription API key missing (set OPENAI_API_KEY)".to_string(),
                )
            })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| PipelineError::Config(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }

    /// Multipart form for one request
    fn form(&self, audio: Vec<u8>) -> Result<Form> {
        let file = Part::bytes(audio)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| PipelineError::Transcription(e.to_string()))?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word");
        if let Some(ref language) = self.language {
            form = form.text("language", language.clone());
        }
        Ok(form)
    }
}

#[async_trait]
impl Transcriber for OpenAiTranscriber {
    fn name(&self) -> &str {
        "openai"
    }

    async fn transcribe(&self, audio: Vec<u8>) -> Result<Transcript> {
        debug!(
            "Sending {} bytes of audio to {} ({})",
            audio.len(),
            self.endpoint,
            self.model
        );

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(self.form(audio)?)
            .send()
            .await
            .map_err(|e| PipelineError::Transcription(format!("request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .bytes()
            .await
            .map_err(|e| PipelineError::Transcription(format!("reading response: {e}")))?;

        if !status.is_success() {
            return Err(PipelineError::Transcription(format!(
                "service returned {status}: {}",
                String::from_utf8_lossy(&body).chars().take(300).collect::<String>()
            )));
        }

        parse_response(&body)
    }
}

/// Parse a `verbose_json` transcription response.
///
/// # Errors
///
/// Returns [`PipelineError::Transcription`] on malformed JSON or word
/// timings where `start > end`.
pub fn parse_response(body: &[u8]) -> Result<Transcript> {
    let transcript: Transcript = serde_json::from_slice(body)
        .map_err(|e| PipelineError::Transcription(format!("malformed response: {e}")))?;

    if let Some(word) = transcript
        .words
        .iter()
        .find(|w| !(w.start.is_finite() && w.end.is_finite()) || w.start > w.end)
    {
        return Err(PipelineError::Transcription(format!(
            "invalid timing for word '{}' ({} > {})",
            word.text, word.start, word.end
        )));
    }

    Ok(transcript)
}
