//! Durable remote storage for the serialized index.
//!
//! The remote copy is the source of truth at cold start; after a successful
//! write-back it is expected-consistent with the in-memory index until the
//! next mutation. Object layout is a single serialized-index blob at a
//! fixed key per deployment.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::{Error, Result};

/// Object-store-style blob storage for serialized indices.
///
/// A failed `store` must never be reported as success; callers keep their
/// local durable copy until the remote write succeeds so a retry is always
/// possible from local state.
pub trait RemoteIndexStore: Send + Sync {
    /// Downloads the blob at `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the key is absent, or
    /// [`Error::RemoteUnavailable`] on network or credential failures.
    fn fetch(&self, key: &str) -> Result<Vec<u8>>;

    /// Uploads `bytes` to `key`, replacing any previous object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RemoteUnavailable`] if the upload does not complete.
    fn store(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// HTTP object-store client for an S3-compatible gateway.
///
/// Objects live at `{base_url}/{key}`; authentication is a bearer token.
/// Every request carries an explicit deadline so a stalled gateway fails
/// the call instead of hanging the request.
pub struct HttpRemoteStore {
    /// Gateway base URL, no trailing slash.
    base_url: String,
    /// Bearer credential, if the gateway requires one.
    token: Option<String>,
    /// HTTP client with the configured deadline.
    client: reqwest::blocking::Client,
}

impl HttpRemoteStore {
    /// Default per-request deadline.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Creates a client for the given gateway.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Self::DEFAULT_TIMEOUT)
    }

    /// Creates a client with an explicit per-request deadline.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::OperationFailed {
                operation: "build_http_client".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
            client,
        })
    }

    /// Sets the bearer credential.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{key}", self.base_url)
    }

    fn authorize(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => request.header("Authorization", format!("Bearer {token}")),
            None => request,
        }
    }

    fn transport_error(operation: &str, e: &reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(format!("{operation} exceeded its deadline"))
        } else {
            Error::RemoteUnavailable(format!("{operation}: {e}"))
        }
    }
}

impl RemoteIndexStore for HttpRemoteStore {
    fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let response = self
            .authorize(self.client.get(self.object_url(key)))
            .send()
            .map_err(|e| Self::transport_error("fetch", &e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("remote object '{key}' is absent")));
        }
        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "fetch of '{key}' returned status {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .map_err(|e| Self::transport_error("fetch", &e))?;
        Ok(bytes.to_vec())
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let response = self
            .authorize(self.client.put(self.object_url(key)))
            .body(bytes.to_vec())
            .send()
            .map_err(|e| Self::transport_error("store", &e))?;

        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "store of '{key}' returned status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Directory-backed remote store.
///
/// Stands in for the object gateway in tests and single-host deployments;
/// writes go through a temp file + rename so a partial write is never
/// observed at the key.
pub struct FsRemoteStore {
    /// Directory holding one file per key.
    root: PathBuf,
    /// Distinguishes staging files of concurrent writers to the same key.
    staging_seq: AtomicU64,
}

impl FsRemoteStore {
    /// Creates a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|e| Error::OperationFailed {
            operation: "create_remote_store_dir".to_string(),
            cause: e.to_string(),
        })?;
        Ok(Self {
            root,
            staging_seq: AtomicU64::new(0),
        })
    }
}

impl RemoteIndexStore for FsRemoteStore {
    fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.root.join(key);
        if !path.exists() {
            return Err(Error::NotFound(format!("remote object '{key}' is absent")));
        }
        std::fs::read(&path).map_err(|e| Error::RemoteUnavailable(format!("fetch of '{key}': {e}")))
    }

    fn store(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.root.join(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::RemoteUnavailable(format!("store of '{key}': {e}")))?;
        }
        let seq = self.staging_seq.fetch_add(1, Ordering::Relaxed);
        let staging = self.root.join(format!("{key}.partial.{seq}"));

        std::fs::write(&staging, bytes)
            .and_then(|()| std::fs::rename(&staging, &path))
            .map_err(|e| Error::RemoteUnavailable(format!("store of '{key}': {e}")))
    }
}
