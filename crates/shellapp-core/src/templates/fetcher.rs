//! Manifest and asset retrieval from remote URLs or local files
//!
//! `http(s)://` locators go through a shared reqwest client; `file://` locators
//! are read from disk so that development builds behave the same offline.

use super::manifest::Manifest;
use crate::error::{FetchError, PipelineError, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::fs;
use url::Url;

/// Header carrying the SDK version the package is built against
pub const SDK_VERSION_HEADER: &str = "Exponent-SDK-Version";

/// Header carrying the target platform name
pub const PLATFORM_HEADER: &str = "Exponent-Platform";

/// Where a piece of content lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Remote(Url),
    Local(PathBuf),
}

impl Source {
    pub fn parse(raw: &str) -> std::result::Result<Self, String> {
        let url = Url::parse(raw).map_err(|e| format!("invalid URL: {}", e))?;
        match url.scheme() {
            "http" | "https" => Ok(Self::Remote(url)),
            "file" => url
                .to_file_path()
                .map(Self::Local)
                .map_err(|_| "file URL has no local path".to_string()),
            other => Err(format!("unsupported URL scheme '{}'", other)),
        }
    }
}

/// Obtains the app manifest for a locator
pub trait ManifestResolver: Send + Sync {
    fn resolve(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> impl Future<Output = Result<Manifest>> + Send;
}

/// Downloads raw bytes
pub trait AssetFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = std::result::Result<Vec<u8>, FetchError>> + Send;

    /// Download `url` into `destination`, returning the number of bytes written.
    ///
    /// Content is staged in a sibling temp file and renamed into place, so a
    /// failure never leaves a partial file at `destination`.
    fn fetch_to_path(
        &self,
        url: &str,
        destination: &Path,
    ) -> impl Future<Output = std::result::Result<u64, FetchError>> + Send {
        async move {
            let bytes = match self.fetch(url).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    discard_stale(destination).await;
                    return Err(err.with_destination(destination));
                }
            };
            write_atomically(destination, &bytes)
                .await
                .map_err(|e| FetchError::new(url, e.to_string()).with_destination(destination))?;
            Ok(bytes.len() as u64)
        }
    }
}

async fn discard_stale(destination: &Path) {
    if fs::metadata(destination).await.is_ok() {
        let _ = fs::remove_file(destination).await;
    }
}

/// Write `bytes` to `destination` via a temp file + rename
pub async fn write_atomically(destination: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).await?;
    }

    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());
    let staging = destination.with_file_name(format!(".{}.part", file_name));

    if let Err(e) = fs::write(&staging, bytes).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e);
    }
    if let Err(e) = fs::rename(&staging, destination).await {
        let _ = fs::remove_file(&staging).await;
        return Err(e);
    }
    Ok(())
}

/// HTTP-backed resolver and fetcher
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    /// Create a new client with a custom user agent
    pub fn new(user_agent: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent(user_agent)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

impl ManifestResolver for HttpClient {
    async fn resolve(&self, url: &str, headers: &[(&str, &str)]) -> Result<Manifest> {
        let unavailable = |reason: String| PipelineError::ManifestUnavailable {
            url: url.to_string(),
            reason,
        };

        let body = match Source::parse(url).map_err(unavailable)? {
            Source::Remote(remote) => {
                let mut request = self
                    .client
                    .get(remote)
                    .header(reqwest::header::ACCEPT, "application/json");
                for (name, value) in headers {
                    request = request.header(*name, *value);
                }

                let response = request.send().await.map_err(|e| unavailable(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(unavailable(format!("HTTP {}", response.status())));
                }
                response.text().await.map_err(|e| unavailable(e.to_string()))?
            }
            Source::Local(path) => fs::read_to_string(&path)
                .await
                .map_err(|e| unavailable(format!("{}: {}", path.display(), e)))?,
        };

        Manifest::from_json(url, &body)
    }
}

impl AssetFetcher for HttpClient {
    async fn fetch(&self, url: &str) -> std::result::Result<Vec<u8>, FetchError> {
        match Source::parse(url).map_err(|reason| FetchError::new(url, reason))? {
            Source::Remote(remote) => {
                let response = self
                    .client
                    .get(remote)
                    .send()
                    .await
                    .map_err(|e| FetchError::new(url, e.to_string()))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(FetchError::new(url, format!("HTTP {}", status)));
                }

                let expected = response.content_length();
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::new(url, e.to_string()))?;
                if let Some(expected) = expected {
                    if expected != bytes.len() as u64 {
                        return Err(FetchError::new(
                            url,
                            format!("truncated body: {} of {} bytes", bytes.len(), expected),
                        ));
                    }
                }
                Ok(bytes.to_vec())
            }
            Source::Local(path) => fs::read(&path)
                .await
                .map_err(|e| FetchError::new(url, format!("{}: {}", path.display(), e))),
        }
    }
}
