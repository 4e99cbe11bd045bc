//! Remote model registry client
//!
//! Speaks the Hugging Face Hub HTTP surface: the recursive tree listing
//! (`/api/models/{repo}/tree/{revision}`, paginated through `Link` headers) and
//! the resolve endpoint (`/{repo}/resolve/{revision}/{path}`) for file bytes.

use async_trait::async_trait;
use model_hub_core::RemoteFile;
use reqwest::header::{ETAG, IF_RANGE, LINK, RANGE};
use reqwest::{Client, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};
use url::Url;

/// Public Hugging Face Hub endpoint
pub const DEFAULT_ENDPOINT: &str = "https://huggingface.co";

/// Default timeout for listing requests and connection setup
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Errors raised by a registry client
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry reports the repository as absent (or hidden from this token)
    #[error("{0}")]
    RepositoryNotFound(String),

    /// Transport failure or unexpected status while listing
    #[error("{0}")]
    Unavailable(String),

    /// Terminal failure while fetching a file
    #[error("Download failed for {path}: {cause}")]
    DownloadFailed { path: String, cause: String },

    /// Remote path is absolute or escapes the destination directory
    #[error("Unsafe remote path: {0}")]
    InvalidPath(String),

    /// Client could not be built from its configuration
    #[error("Registry client configuration error: {0}")]
    Configuration(String),
}

/// Client for a remote model registry
#[async_trait]
pub trait ModelRegistryClient: Send + Sync {
    /// List every file of a repository at a revision
    async fn list_files(
        &self,
        repo_id: &str,
        revision: &str,
    ) -> Result<Vec<RemoteFile>, RegistryError>;

    /// Fetch one file to `destination_dir/path`, returning the local path
    async fn fetch_file(
        &self,
        repo_id: &str,
        path: &str,
        revision: &str,
        destination_dir: &Path,
    ) -> Result<PathBuf, RegistryError>;
}

/// Configuration for [`HuggingFaceClient`]
#[derive(Debug, Clone)]
pub struct RegistryClientConfig {
    /// Base URL of the hub
    pub endpoint: String,
    /// Bearer token sent with every request
    pub token: Option<SecretString>,
    /// Timeout for listing requests and for establishing connections
    pub timeout: Duration,
    /// User-Agent header
    pub user_agent: String,
}

impl RegistryClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: format!("model-hub/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn token(mut self, token: Option<SecretString>) -> Self {
        self.token = token;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

impl Default for RegistryClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_ENDPOINT)
    }
}

#[derive(Debug, Deserialize)]
struct TreeEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    oid: Option<String>,
    #[serde(default)]
    lfs: Option<LfsPointer>,
}

#[derive(Debug, Deserialize)]
struct LfsPointer {
    oid: String,
    #[serde(default)]
    size: Option<u64>,
}

impl TreeEntry {
    fn into_remote_file(self) -> Option<RemoteFile> {
        if self.kind != "file" {
            return None;
        }
        let (size, content_digest, is_lfs) = match self.lfs {
            Some(lfs) => (lfs.size.unwrap_or(self.size), Some(lfs.oid), true),
            None => (self.size, self.oid, false),
        };
        Some(RemoteFile {
            path: self.path,
            size,
            content_digest,
            is_lfs,
        })
    }
}

/// Hugging Face Hub client over reqwest
#[derive(Debug, Clone)]
pub struct HuggingFaceClient {
    http: Client,
    base: Url,
    config: RegistryClientConfig,
}

impl HuggingFaceClient {
    /// Build a client from its configuration
    pub fn new(config: RegistryClientConfig) -> Result<Self, RegistryError> {
        let base = Url::parse(&config.endpoint).map_err(|e| {
            RegistryError::Configuration(format!("invalid endpoint {}: {}", config.endpoint, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(RegistryError::Configuration(format!(
                "endpoint cannot be a base URL: {}",
                config.endpoint
            )));
        }

        let http = Client::builder()
            .connect_timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| RegistryError::Configuration(e.to_string()))?;

        Ok(Self { http, base, config })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn get(&self, url: Url) -> RequestBuilder {
        let request = self.http.get(url);
        match &self.config.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    fn tree_url(&self, repo_id: &str, revision: &str) -> Url {
        let mut segments = vec!["api", "models"];
        segments.extend(repo_id.split('/'));
        segments.extend(["tree", revision]);
        let mut url = self.url(&segments);
        url.query_pairs_mut().append_pair("recursive", "true");
        url
    }

    fn resolve_url(&self, repo_id: &str, revision: &str, path: &str) -> Url {
        let mut segments: Vec<&str> = repo_id.split('/').collect();
        segments.extend(["resolve", revision]);
        segments.extend(path.split('/'));
        self.url(&segments)
    }
}

#[async_trait]
impl ModelRegistryClient for HuggingFaceClient {
    #[instrument(skip(self))]
    async fn list_files(
        &self,
        repo_id: &str,
        revision: &str,
    ) -> Result<Vec<RemoteFile>, RegistryError> {
        let mut files = Vec::new();
        let mut next = Some(self.tree_url(repo_id, revision));
        let mut pages = 0usize;

        while let Some(url) = next.take() {
            pages += 1;
            debug!(%url, page = pages, "Listing repository tree");

            let response = self
                .get(url)
                .timeout(self.config.timeout)
                .send()
                .await
                .map_err(|e| {
                    RegistryError::Unavailable(format!("listing {} failed: {}", repo_id, e))
                })?;

            match response.status() {
                status if status.is_success() => {}
                StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    return Err(RegistryError::RepositoryNotFound(format!(
                        "{} (HTTP {})",
                        repo_id,
                        response.status().as_u16()
                    )));
                }
                status => {
                    return Err(RegistryError::Unavailable(format!(
                        "listing {} returned HTTP {}",
                        repo_id,
                        status.as_u16()
                    )));
                }
            }

            next = response
                .headers()
                .get(LINK)
                .and_then(|value| value.to_str().ok())
                .and_then(next_link)
                .and_then(|link| Url::parse(&link).ok());

            let entries: Vec<TreeEntry> = response.json().await.map_err(|e| {
                RegistryError::Unavailable(format!("malformed listing for {}: {}", repo_id, e))
            })?;
            files.extend(entries.into_iter().filter_map(TreeEntry::into_remote_file));
        }

        info!(files = files.len(), pages, "Listed repository files");
        Ok(files)
    }

    #[instrument(skip(self, destination_dir))]
    async fn fetch_file(
        &self,
        repo_id: &str,
        path: &str,
        revision: &str,
        destination_dir: &Path,
    ) -> Result<PathBuf, RegistryError> {
        let relative = validate_remote_path(path)?;
        let target = destination_dir.join(&relative);
        let partial = partial_path(&target);
        let failed = |cause: String| RegistryError::DownloadFailed {
            path: path.to_string(),
            cause,
        };

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(format!("create {}: {}", parent.display(), e)))?;
        }

        // A partial file is only resumed against the version it came from
        let validator_path = validator_path(&partial);
        let validator = tokio::fs::read_to_string(&validator_path).await.ok();
        let resume_from = match (tokio::fs::metadata(&partial).await, &validator) {
            (Ok(meta), Some(_)) => meta.len(),
            _ => 0,
        };

        let mut request = self.get(self.resolve_url(repo_id, revision, path));
        if let (true, Some(etag)) = (resume_from > 0, &validator) {
            debug!(resume_from, "Resuming partial download");
            request = request
                .header(RANGE, format!("bytes={}-", resume_from))
                .header(IF_RANGE, etag.as_str());
        }

        let mut response = request.send().await.map_err(|e| failed(e.to_string()))?;
        let status = response.status();

        let mut file = if status == StatusCode::RANGE_NOT_SATISFIABLE && resume_from > 0 {
            debug!("Partial file already complete");
            None
        } else if status == StatusCode::PARTIAL_CONTENT && resume_from > 0 {
            let file = tokio::fs::OpenOptions::new()
                .append(true)
                .open(&partial)
                .await
                .map_err(|e| failed(format!("open {}: {}", partial.display(), e)))?;
            Some(file)
        } else if status.is_success() {
            let file = tokio::fs::File::create(&partial)
                .await
                .map_err(|e| failed(format!("create {}: {}", partial.display(), e)))?;
            let etag = response
                .headers()
                .get(ETAG)
                .and_then(|value| value.to_str().ok())
                .filter(|etag| !etag.starts_with("W/"));
            match etag {
                Some(etag) => tokio::fs::write(&validator_path, etag)
                    .await
                    .map_err(|e| failed(format!("write {}: {}", validator_path.display(), e)))?,
                None => remove_if_present(&validator_path).await,
            }
            Some(file)
        } else {
            return Err(failed(format!("HTTP {}", status.as_u16())));
        };

        if let Some(file) = file.as_mut() {
            while let Some(chunk) = response.chunk().await.map_err(|e| failed(e.to_string()))? {
                file.write_all(&chunk)
                    .await
                    .map_err(|e| failed(format!("write {}: {}", partial.display(), e)))?;
            }
            file.flush()
                .await
                .map_err(|e| failed(format!("flush {}: {}", partial.display(), e)))?;
        }
        drop(file);

        tokio::fs::rename(&partial, &target)
            .await
            .map_err(|e| failed(format!("rename to {}: {}", target.display(), e)))?;
        remove_if_present(&validator_path).await;

        debug!(path = %target.display(), "File fetched");
        Ok(target)
    }
}

/// Extract the `rel="next"` target from a `Link` header value
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|part| {
        let mut pieces = part.split(';');
        let target = pieces.next()?.trim();
        let is_next = pieces.any(|param| {
            let param = param.trim();
            param == "rel=\"next\"" || param == "rel=next"
        });
        if !is_next {
            return None;
        }
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(str::to_string)
    })
}

/// Reject remote paths that are absolute or could escape the destination
pub fn validate_remote_path(path: &str) -> Result<PathBuf, RegistryError> {
    if path.is_empty() || path.starts_with('/') || path.starts_with('\\') {
        return Err(RegistryError::InvalidPath(path.to_string()));
    }
    let relative = PathBuf::from(path);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(RegistryError::InvalidPath(path.to_string()));
    }
    Ok(relative)
}

fn partial_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    target.with_file_name(name)
}

/// Sidecar holding the strong ETag of the response a partial file came from
fn validator_path(partial: &Path) -> PathBuf {
    let mut name = partial
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".etag");
    partial.with_file_name(name)
}

async fn remove_if_present(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!(path = %path.display(), error = %e, "Failed to remove stale file");
        }
    }
}
