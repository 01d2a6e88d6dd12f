//! Storage backend contract
//!
//! The preview engine is a client of two backend calls: one that signs a
//! time-limited URL for a stored path and one that returns the raw bytes.
//! [`FsBackend`] serves both from a local directory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docket_preview_core::PreviewError;
use docket_preview_scheduler::Retryable;
use serde::Serialize;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Failure reported by a backend call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("backend timed out")]
    Timeout,

    /// The backend answered with something unusable
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl Retryable for BackendError {
    fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Network(_) | BackendError::Timeout)
    }

    fn timed_out() -> Self {
        BackendError::Timeout
    }
}

impl From<BackendError> for PreviewError {
    fn from(error: BackendError) -> Self {
        match error {
            BackendError::NotFound(path) => PreviewError::NotFound { path },
            BackendError::Network(reason) => PreviewError::NetworkFailure(reason),
            BackendError::Timeout => PreviewError::Timeout,
            BackendError::Malformed(reason) => PreviewError::DecodeFailure(reason),
        }
    }
}

/// Signed, time-limited fetchable address
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: DateTime<Utc>,
}

impl SignedUrl {
    /// URL valid for `ttl` from `now`
    pub fn new(url: impl Into<String>, now: DateTime<Utc>, ttl: Duration) -> Self {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            url: url.into(),
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Backend calls consumed by the resolver
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Produce a signed address for `path` valid for `ttl`
    async fn resolve_storage_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, BackendError>;

    /// Fetch the raw content stored at `path`
    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, BackendError>;
}

/// Backend serving files below a root directory
#[derive(Debug, Clone)]
pub struct FsBackend {
    root: PathBuf,
}

impl FsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage path below the root; escaping paths are not found
    fn locate(&self, path: &str) -> Result<PathBuf, BackendError> {
        let relative = Path::new(path.trim_start_matches('/'));
        let contained = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));

        if !contained || path.trim().is_empty() {
            return Err(BackendError::NotFound(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &str, error: io::Error) -> BackendError {
    match error.kind() {
        io::ErrorKind::NotFound => BackendError::NotFound(path.to_string()),
        _ => BackendError::Network(format!("{path}: {error}")),
    }
}

#[async_trait]
impl StorageBackend for FsBackend {
    async fn resolve_storage_url(&self, path: &str, ttl: Duration) -> Result<SignedUrl, BackendError> {
        let location = self.locate(path)?;
        let metadata = tokio::fs::metadata(&location)
            .await
            .map_err(|error| io_error(path, error))?;
        if !metadata.is_file() {
            return Err(BackendError::NotFound(path.to_string()));
        }

        let now = Utc::now();
        let signed = SignedUrl::new(String::new(), now, ttl);
        let url = format!(
            "file://{}?expires={}",
            location.display(),
            signed.expires_at.timestamp()
        );
        Ok(SignedUrl { url, ..signed })
    }

    async fn fetch_bytes(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        let location = self.locate(path)?;
        tokio::fs::read(&location)
            .await
            .map_err(|error| io_error(path, error))
    }
}
