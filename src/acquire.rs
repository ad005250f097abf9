//! Source acquisition
//!
//! Turns the `link` a client sends into video bytes plus a filename. The
//! [`SourceRouter`] tries its acquirers in order and the first one whose
//! [`SourceAcquirer::matches`] accepts the reference handles it.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

/// Filename used when a reference suggests none
pub const FALLBACK_FILENAME: &str = "video.mp4";

/// Hosts handed to yt-dlp instead of being fetched directly
const PAGE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
    "vimeo.com",
    "www.vimeo.com",
];

/// Downloaded source video
#[derive(Debug, Clone, PartialEq)]
pub struct SourceMedia {
    pub bytes: Vec<u8>,
    /// Suggested filename, already sanitized
    pub filename: String,
}

/// Something that can resolve a reference to video bytes
#[async_trait]
pub trait SourceAcquirer: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Whether this acquirer handles `reference`
    fn matches(&self, reference: &str) -> bool;

    /// Fetch the video behind `reference`.
    async fn resolve(&self, reference: &str) -> Result<SourceMedia>;
}

/// Make a filename safe to use as a blob key and a local path.
///
/// Whitespace is removed (links with spaces in their title produce keys
/// without them), path separators become `_`, and an empty result falls
/// back to [`FALLBACK_FILENAME`].
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| match c {
            '/' | '\\' | ':' | '\0' | '?' | '#' | '%' | '*' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        FALLBACK_FILENAME.to_string()
    } else {
        cleaned.to_string()
    }
}

fn parse_http_url(reference: &str) -> Option<url::Url> {
    url::Url::parse(reference.trim())
        .ok()
        .filter(|u| matches!(u.scheme(), "http" | "https"))
}

fn is_page_url(url: &url::Url) -> bool {
    url.host_str()
        .is_some_and(|host| PAGE_HOSTS.contains(&host.to_ascii_lowercase().as_str()))
}

/// Reads videos already on this machine (`/path/clip.mp4` or `file://...`)
#[derive(Debug, Clone, Default)]
pub struct LocalFileSource;

impl LocalFileSource {
    fn path_of(reference: &str) -> Option<PathBuf> {
        let reference = reference.trim();
        if reference.starts_with("file://") {
            return url::Url::parse(reference).ok()?.to_file_path().ok();
        }
        if reference.contains("://") {
            return None;
        }
        Some(PathBuf::from(reference))
    }
}

#[async_trait]
impl SourceAcquirer for LocalFileSource {
    fn name(&self) -> &str {
        "file"
    }

    fn matches(&self, reference: &str) -> bool {
        Self::path_of(reference).is_some()
    }

    async fn resolve(&self, reference: &str) -> Result<SourceMedia> {
        let path = Self::path_of(reference)
            .ok_or_else(|| PipelineError::Acquisition(format!("not a file reference: {reference}")))?;
        let bytes = fs::read(&path)
            .await
            .map_err(|e| PipelineError::Acquisition(format!("reading {}: {e}", path.display())))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(SourceMedia {
            bytes,
            filename: sanitize_filename(&filename),
        })
    }
}

/// Direct HTTP(S) download of a video file
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpSource {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(max_bytes: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Config(format!("HTTP client: {e}")))?;
        Ok(Self { client, max_bytes })
    }

    fn filename_of(url: &url::Url) -> String {
        let last = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or_default();
        let decoded = urlencoding::decode(last).map_or_else(|_| last.to_string(), |s| s.into_owned());
        sanitize_filename(&decoded)
    }
}

#[async_trait]
impl SourceAcquirer for HttpSource {
    fn name(&self) -> &str {
        "http"
    }

    fn matches(&self, reference: &str) -> bool {
        parse_http_url(reference).is_some_and(|u| !is_page_url(&u))
    }

    async fn resolve(&self, reference: &str) -> Result<SourceMedia> {
        let url = parse_http_url(reference)
            .ok_or_else(|| PipelineError::Acquisition(format!("not an http(s) URL: {reference}")))?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| PipelineError::Acquisition(format!("fetching {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(PipelineError::Acquisition(format!(
                "fetching {url} returned {}",
                response.status()
            )));
        }

        if let Some(len) = response.content_length() {
            if len > self.max_bytes {
                return Err(PipelineError::Acquisition(format!(
                    "source is {len} bytes, limit is {}",
                    self.max_bytes
                )));
            }
        }

        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk
                .map_err(|e| PipelineError::Acquisition(format!("reading {url}: {e}")))?;
            if (bytes.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(PipelineError::Acquisition(format!(
                    "source exceeds the {} byte limit",
                    self.max_bytes
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(SourceMedia {
            bytes,
            filename: Self::filename_of(&url),
        })
    }
}

/// Video pages (YouTube and friends) downloaded through `yt-dlp`
#[derive(Debug, Clone)]
pub struct YtDlpSource {
    ytdlp_path: String,
    scratch_dir: PathBuf,
}

impl YtDlpSource {
    /// Create a source, searching for yt-dlp in PATH
    #[must_use]
    pub fn new(scratch_dir: impl AsRef<Path>) -> Self {
        let ytdlp_path = which::which("yt-dlp")
            .map_or_else(|_| "yt-dlp".to_string(), |p| p.to_string_lossy().to_string());
        Self {
            ytdlp_path,
            scratch_dir: scratch_dir.as_ref().to_path_buf(),
        }
    }

    /// Specify custom yt-dlp binary path
    #[must_use]
    pub fn with_ytdlp_path(mut self, path: &str) -> Self {
        self.ytdlp_path = path.to_string();
        self
    }

    async fn download(&self, url: &url::Url, dir: &Path) -> Result<SourceMedia> {
        let output = Command::new(&self.ytdlp_path)
            .arg("--no-part")
            .arg("--no-playlist")
            .arg("--quiet")
            .arg("--no-warnings")
            // Progressive MP4 first, like a highest-resolution stream pick
            .arg("-f")
            .arg("best[ext=mp4]/bestvideo[ext=mp4]+bestaudio[ext=m4a]/best")
            .arg("--merge-output-format")
            .arg("mp4")
            .arg("-o")
            .arg(dir.join("%(title)s.%(ext)s").to_string_lossy().into_owned())
            .arg(url.as_str())
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| PipelineError::Acquisition(format!("failed to spawn yt-dlp: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::Acquisition(format!(
                "yt-dlp failed to download {url}: {}",
                stderr.trim()
            )));
        }

        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.ends_with(".info.json") || name.ends_with(".description") {
                continue;
            }
            let bytes = fs::read(entry.path()).await?;
            return Ok(SourceMedia {
                bytes,
                filename: sanitize_filename(&name),
            });
        }

        Err(PipelineError::Acquisition(format!(
            "yt-dlp reported success but produced no file for {url}"
        )))
    }
}

#[async_trait]
impl SourceAcquirer for YtDlpSource {
    fn name(&self) -> &str {
        "yt-dlp"
    }

    fn matches(&self, reference: &str) -> bool {
        parse_http_url(reference).is_some_and(|u| is_page_url(&u))
    }

    async fn resolve(&self, reference: &str) -> Result<SourceMedia> {
        let url = parse_http_url(reference)
            .ok_or_else(|| PipelineError::Acquisition(format!("not an http(s) URL: {reference}")))?;

        let dir = self.scratch_dir.join(format!("dl-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).await?;
        let result = self.download(&url, &dir).await;
        let _ = fs::remove_dir_all(&dir).await;
        result
    }
}

/// Dispatches a reference to the first acquirer that accepts it
#[derive(Clone, Default)]
pub struct SourceRouter {
    acquirers: Vec<Arc<dyn SourceAcquirer>>,
}

impl std::fmt::Debug for SourceRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.acquirers.iter().map(|a| a.name()).collect();
        f.debug_struct("SourceRouter").field("acquirers", &names).finish()
    }
}

impl SourceRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Remote chain: yt-dlp pages, then direct downloads.
    ///
    /// Local paths are not accepted; add [`LocalFileSource`] explicitly
    /// where the caller is trusted.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn standard(
        scratch_dir: impl AsRef<Path>,
        ytdlp_path: Option<&str>,
        max_download_bytes: u64,
    ) -> Result<Self> {
        let mut ytdlp = YtDlpSource::new(scratch_dir);
        if let Some(path) = ytdlp_path {
            ytdlp = ytdlp.with_ytdlp_path(path);
        }
        Ok(Self::new()
            .with(ytdlp)
            .with(HttpSource::new(max_download_bytes)?))
    }

    /// Append an acquirer; earlier ones win.
    #[must_use]
    pub fn with(mut self, acquirer: impl SourceAcquirer + 'static) -> Self {
        self.acquirers.push(Arc::new(acquirer));
        self
    }

    fn route(&self, reference: &str) -> Option<&Arc<dyn SourceAcquirer>> {
        self.acquirers.iter().find(|a| a.matches(reference))
    }
}

#[async_trait]
impl SourceAcquirer for SourceRouter {
    fn name(&self) -> &str {
        "router"
    }

    fn matches(&self, reference: &str) -> bool {
        self.route(reference).is_some()
    }

    async fn resolve(&self, reference: &str) -> Result<SourceMedia> {
        let acquirer = self.route(reference).ok_or_else(|| {
            PipelineError::Acquisition(format!("unrecognized source reference: {reference}"))
        })?;
        info!("Resolving {} via {}", reference, acquirer.name());
        let media = acquirer.resolve(reference).await?;
        if media.bytes.is_empty() {
            return Err(PipelineError::Acquisition(format!(
                "{reference} resolved to an empty file"
            )));
        }
        Ok(media)
    }
}
