//! Blob store collaborators
//!
//! The pipeline parks the source video and its audio in the store while it
//! works and publishes the finished short there. Three backends:
//!
//! - [`LocalBlobStore`] - a directory, optionally fronted by a static file server
//! - [`HttpBlobStore`] - a bucket reachable with plain `PUT`/`GET`/`DELETE`
//! - [`MemoryBlobStore`] - process memory, for tests and dry runs

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{PipelineError, Result};

/// Durable object storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Store `bytes` under `key`, replacing any existing object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Fetch the object stored under `key`.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Remove `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Public reference for `key`.
    fn url_for(&self, key: &str) -> String;
}

/// Build the store selected by configuration.
///
/// # Errors
///
/// Returns [`PipelineError::Config`] when the HTTP backend has no endpoint.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn BlobStore>> {
    Ok(match config.backend {
        StorageBackend::Local => Arc::new(LocalBlobStore::new(
            &config.root,
            config.public_base_url.clone(),
        )),
        StorageBackend::Http => {
            let endpoint = config.endpoint.as_deref().ok_or_else(|| {
                PipelineError::Config("storage.endpoint is required for the http backend".to_string())
            })?;
            Arc::new(HttpBlobStore::new(endpoint, config.token.clone())?)
        }
        StorageBackend::Memory => Arc::new(MemoryBlobStore::new()),
    })
}

/// Reject keys that could escape a store's namespace.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    if key.is_empty()
        || key == "."
        || key == ".."
        || key.contains(['/', '\\', '\0'])
    {
        return Err(PipelineError::Storage(format!("invalid blob key '{key}'")));
    }
    Ok(())
}

/// In-memory blob store
#[derive(Debug, Default, Clone)]
pub struct MemoryBlobStore {
    objects: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys currently stored, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        validate_key(key)?;
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| PipelineError::Storage(format!("no blob named '{key}'")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects.write().await.remove(key);
        Ok(())
    }

    fn url_for(&self, key: &str) -> String {
        format!("memory://{key}")
    }
}

/// Blob store backed by a local directory
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalBlobStore {
    pub fn new(root: impl AsRef<Path>, public_base_url: Option<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            public_base_url: public_base_url.map(|u| u.trim_end_matches('/').to_string()),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PipelineError::Storage(format!("creating {}: {e}", self.root.display())))?;
        fs::write(&path, bytes)
            .await
            .map_err(|e| PipelineError::Storage(format!("writing {}: {e}", path.display())))?;
        debug!("Stored blob {}", path.display());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        fs::read(&path)
            .await
            .map_err(|e| PipelineError::Storage(format!("reading {}: {e}", path.display())))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PipelineError::Storage(format!(
                "deleting {}: {e}",
                path.display()
            ))),
        }
    }

    fn url_for(&self, key: &str) -> String {
        match self.public_base_url {
            Some(ref base) => format!("{base}/{}", urlencoding::encode(key)),
            None => format!("file://{}", self.root.join(key).display()),
        }
    }
}

/// Blob store speaking plain HTTP object verbs against a bucket endpoint
#[derive(Debug, Clone)]
pub struct HttpBlobStore {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpBlobStore {
    /// # Errors
    ///
    /// Returns an error if the endpoint is not an HTTP(S) URL.
    pub fn new(endpoint: &str, token: Option<String>) -> Result<Self> {
        let parsed = url::Url::parse(endpoint)
            .map_err(|e| PipelineError::Config(format!("storage endpoint '{endpoint}': {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(PipelineError::Config(format!(
                "storage endpoint must be http(s): {endpoint}"
            )));
        }
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| PipelineError::Config(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn request(&self, method: reqwest::Method, key: &str) -> Result<reqwest::RequestBuilder> {
        validate_key(key)?;
        let mut req = self.client.request(method, self.url_for(key));
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }
        Ok(req)
    }

    async fn send(&self, req: reqwest::RequestBuilder, what: &str, key: &str) -> Result<reqwest::Response> {
        req.send()
            .await
            .map_err(|e| PipelineError::Storage(format!("{what} '{key}' failed: {e}")))
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let req = self
            .request(reqwest::Method::PUT, key)?
            .header(reqwest::header::CONTENT_TYPE, content_type(key))
            .body(bytes);
        let resp = self.send(req, "upload", key).await?;
        if !resp.status().is_success() {
            return Err(PipelineError::Storage(format!(
                "upload '{key}' returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let req = self.request(reqwest::Method::GET, key)?;
        let resp = self.send(req, "download", key).await?;
        if !resp.status().is_success() {
            return Err(PipelineError::Storage(format!(
                "download '{key}' returned {}",
                resp.status()
            )));
        }
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| PipelineError::Storage(format!("download '{key}': {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let req = self.request(reqwest::Method::DELETE, key)?;
        let resp = self.send(req, "delete", key).await?;
        let status = resp.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(PipelineError::Storage(format!("delete '{key}' returned {status}")))
        }
    }

    fn url_for(&self, key: &str) -> String {
        format!("{}/{}", self.endpoint, urlencoding::encode(key))
    }
}

/// Content type guessed from the key's extension (`_short` outputs are MP4)
fn content_type(key: &str) -> &'static str {
    if key.ends_with("_short") {
        return "video/mp4";
    }
    let ext = Path::new(key)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4" | "m4v") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryBlobStore::new();
        store.put("clip.mp4", b"abc".to_vec()).await.unwrap();
        assert_eq!(store.get("clip.mp4").await.unwrap(), b"abc");
        assert_eq!(store.keys().await, vec!["clip.mp4"]);

        store.delete("clip.mp4").await.unwrap();
        assert!(!store.contains("clip.mp4").await);
        assert!(store.get("clip.mp4").await.is_err());
        // Deleting again is fine
        store.delete("clip.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn test_local_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs"), None);

        store.put("a.mp4_short", vec![1, 2, 3]).await.unwrap();
        assert_eq!(store.get("a.mp4_short").await.unwrap(), vec![1, 2, 3]);
        assert!(store.url_for("a.mp4_short").starts_with("file://"));

        store.delete("a.mp4_short").await.unwrap();
        store.delete("a.mp4_short").await.unwrap();
        assert!(matches!(
            store.get("a.mp4_short").await,
            Err(PipelineError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path(), None);
        assert!(store.put("../escape", vec![0]).await.is_err());
        assert!(store.put("", vec![0]).await.is_err());
        assert!(MemoryBlobStore::new().put("a/b", vec![0]).await.is_err());
    }

    #[test]
    fn test_public_urls() {
        let store = LocalBlobStore::new("/srv/blobs", Some("https://cdn.example.com/".to_string()));
        assert_eq!(
            store.url_for("my clip.mp4_short"),
            "https://cdn.example.com/my%20clip.mp4_short"
        );

        let http = HttpBlobStore::new("https://bucket.example.com/shorts/", None).unwrap();
        assert_eq!(http.url_for("a.mp4"), "https://bucket.example.com/shorts/a.mp4");
        assert!(HttpBlobStore::new("ftp://bucket", None).is_err());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("a.MP4"), "video/mp4");
        assert_eq!(content_type("audio_a.wav"), "audio/wav");
        assert_eq!(content_type("a.webm_short"), "video/mp4");
        assert_eq!(content_type("blob"), "application/octet-stream");
    }

    #[test]
    fn test_from_config() {
        let memory = StorageConfig {
            backend: StorageBackend::Memory,
            ..Default::default()
        };
        assert_eq!(from_config(&memory).unwrap().name(), "memory");

        let http = StorageConfig {
            backend: StorageBackend::Http,
            ..Default::default()
        };
        assert!(from_config(&http).is_err());
    }
}
