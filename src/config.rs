//! Service configuration loaded from `~/.config/shortsmith/config.toml`.
//!
//! Every field has a default, so an absent file or an empty table is a valid
//! configuration. A few secrets and deployment knobs can also come from the
//! environment and take precedence over the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::captions::{Palette, DEFAULT_DELAY_SECS};

/// Environment variable holding the transcription API key
pub const ENV_API_KEY: &str = "OPENAI_API_KEY";
/// Environment variable overriding `server.bind`
pub const ENV_BIND: &str = "SHORTSMITH_BIND";
/// Environment variable overriding `storage.token`
pub const ENV_STORAGE_TOKEN: &str = "SHORTSMITH_STORAGE_TOKEN";

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub transcription: TranscriptionConfig,
    pub captions: CaptionsConfig,
    pub render: RenderConfig,
    pub pipeline: PipelineSettings,
}

/// HTTP service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: String,
    /// Pipeline runs allowed at once; further requests wait
    pub max_concurrent_jobs: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
            max_concurrent_jobs: 2,
        }
    }
}

/// Which blob store backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Files in a local directory
    #[default]
    Local,
    /// Objects behind an HTTP bucket endpoint
    Http,
    /// Process memory (tests and dry runs)
    Memory,
}

/// Blob store settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the local backend
    pub root: PathBuf,
    /// Base URL published references are built from (local backend)
    pub public_base_url: Option<String>,
    /// Bucket endpoint for the HTTP backend
    pub endpoint: Option<String>,
    /// Bearer token for the HTTP backend
    pub token: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Local,
            root: data_dir().join("blobs"),
            public_base_url: None,
            endpoint: None,
            token: None,
        }
    }
}

/// Speech-to-text service settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// API key; usually supplied through `OPENAI_API_KEY`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub model: String,
    /// Spoken language hint (ISO-639-1)
    pub language: Option<String>,
    pub timeout_secs: u64,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            model: "whisper-1".to_string(),
            language: None,
            timeout_secs: 300,
        }
    }
}

/// Caption timing and palette
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionsConfig {
    /// Seconds added to every word's timing
    pub delay_secs: f64,
    /// Color names one is picked from per run
    pub colors: Vec<String>,
    /// Font names one is picked from per run
    pub fonts: Vec<String>,
    pub stroke_color: String,
    pub stroke_width: f32,
    pub font_size: u32,
}

impl Default for CaptionsConfig {
    fn default() -> Self {
        let palette = Palette::default();
        Self {
            delay_secs: DEFAULT_DELAY_SECS,
            colors: palette.colors,
            fonts: palette.fonts,
            stroke_color: palette.stroke_color,
            stroke_width: palette.stroke_width,
            font_size: palette.font_size,
        }
    }
}

impl CaptionsConfig {
    /// The palette these settings describe
    #[must_use]
    pub fn palette(&self) -> Palette {
        Palette {
            colors: self.colors.clone(),
            fonts: self.fonts.clone(),
            stroke_color: self.stroke_color.clone(),
            stroke_width: self.stroke_width,
            font_size: self.font_size,
        }
    }
}

/// Media tooling and encoder settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// ffmpeg binary; looked up in PATH when unset
    pub ffmpeg_path: Option<String>,
    /// ffprobe binary; looked up in PATH when unset
    pub ffprobe_path: Option<String>,
    /// yt-dlp binary; looked up in PATH when unset
    pub ytdlp_path: Option<String>,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: Option<String>,
    pub crf: Option<u8>,
    /// Hardware acceleration (`videotoolbox`, `cuda`, `vaapi`, `qsv`)
    pub hwaccel: Option<String>,
    /// Caption anchor as a fraction of canvas width
    pub anchor_x: f64,
    /// Caption anchor as a fraction of canvas height
    pub anchor_y: f64,
    /// Largest source accepted from direct downloads
    pub max_download_bytes: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            ytdlp_path: None,
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: Some("medium".to_string()),
            crf: Some(23),
            hwaccel: None,
            anchor_x: 0.5,
            anchor_y: 0.625,
            max_download_bytes: 2 * 1024 * 1024 * 1024,
        }
    }
}

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Scratch space; each request gets its own subdirectory
    pub work_dir: PathBuf,
    /// Fade-out applied to the tail of every clip
    pub fade_out_secs: f64,
    /// Deadline for one request; 0 disables it
    pub request_timeout_secs: u64,
    /// Delete uploaded intermediates when a run fails
    pub cleanup_on_failure: bool,
    /// Accept local paths and `file://` links as sources. Off for the
    /// HTTP service, where it would let callers publish server files.
    pub allow_local_sources: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            work_dir: std::env::temp_dir().join("shortsmith"),
            fade_out_secs: 1.0,
            request_timeout_secs: 900,
            cleanup_on_failure: true,
            allow_local_sources: false,
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing default file yields the defaults; a missing explicit path
    /// is an error. Environment overrides are applied last.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = config_path();
                if path.exists() {
                    Self::from_file(&path)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&content).with_context(|| format!("invalid config in {}", path.display()))
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// Returns an error on malformed TOML or an unusable caption palette.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("invalid TOML")?;
        config.captions.palette().validate()?;
        Ok(config)
    }

    /// Serialize to TOML (the API key is never written out).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        let mut redacted = self.clone();
        redacted.transcription.api_key = None;
        if redacted.storage.token.is_some() {
            redacted.storage.token = Some("<redacted>".to_string());
        }
        toml::to_string_pretty(&redacted).context("failed to serialize config")
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_empty(ENV_API_KEY) {
            self.transcription.api_key = Some(key);
        }
        if let Some(bind) = non_empty(ENV_BIND) {
            self.server.bind = bind;
        }
        if let Some(token) = non_empty(ENV_STORAGE_TOKEN) {
            self.storage.token = Some(token);
        }
    }
}

/// Return the path to the default config file.
#[must_use]
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shortsmith")
        .join("config.toml")
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("shortsmith")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_empty_config() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.captions.delay_secs, 0.05);
        assert_eq!(config.pipeline.request_timeout_secs, 900);
        assert!(config.pipeline.cleanup_on_failure);
        assert!(!config.pipeline.allow_local_sources);
    }

    #[test]
    fn parse_partial_config() {
        let toml_str = r#"
[server]
max_concurrent_jobs = 4

[storage]
backend = "http"
endpoint = "https://bucket.example.com"

[captions]
delay_secs = 0.1
colors = ["yellow"]
fonts = ["Impact"]

[render]
anchor_y = 0.7
hwaccel = "cuda"
"#;
        let config = Config::from_toml_str(toml_str).unwrap();
        assert_eq!(config.server.max_concurrent_jobs, 4);
        assert_eq!(config.server.bind, "127.0.0.1:3000");
        assert_eq!(config.storage.backend, StorageBackend::Http);
        assert_eq!(
            config.storage.endpoint.as_deref(),
            Some("https://bucket.example.com")
        );
        assert_eq!(config.captions.delay_secs, 0.1);
        assert_eq!(config.captions.colors, vec!["yellow"]);
        assert_eq!(config.captions.palette().stroke_color, "black");
        assert_eq!(config.render.anchor_y, 0.7);
        assert_eq!(config.render.hwaccel.as_deref(), Some("cuda"));
    }

    #[test]
    fn rejects_bad_palette() {
        let toml_str = r#"
[captions]
colors = []
"#;
        assert!(Config::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn rejects_unknown_backend() {
        let toml_str = r#"
[storage]
backend = "tape"
"#;
        assert!(Config::from_toml_str(toml_str).is_err());
    }

    #[test]
    fn env_overrides() {
        let mut config = Config::default();
        config.apply_env(|key| match key {
            ENV_API_KEY => Some("sk-test".to_string()),
            ENV_BIND => Some("0.0.0.0:8080".to_string()),
            ENV_STORAGE_TOKEN => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(config.transcription.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.storage.token, None);
    }

    #[test]
    fn serialization_redacts_secrets() {
        let mut config = Config::default();
        config.transcription.api_key = Some("sk-secret".to_string());
        config.storage.token = Some("bucket-secret".to_string());

        let out = config.to_toml_string().unwrap();
        assert!(!out.contains("sk-secret"));
        assert!(!out.contains("bucket-secret"));
        assert!(out.contains("[pipeline]"));

        // The dump parses back
        let parsed = Config::from_toml_str(&out).unwrap();
        assert_eq!(parsed.server, config.server);
    }

    #[test]
    fn missing_explicit_path_is_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/shortsmith.toml"))).is_err());
    }
}
