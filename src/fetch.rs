//! Remote-content fetching for URL patch sources.

use std::fs;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("unsupported source scheme: {url}")]
    UnsupportedScheme { url: String },

    #[error("insecure source refused (secure-http is enabled): {url}")]
    Insecure { url: String },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to store download: {0}")]
    Cache(#[from] std::io::Error),
}

impl FetchError {
    /// Whether retrying the same request may succeed.
    ///
    /// Server errors and rate limiting are retried; other status codes are
    /// final.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { .. } => true,
            FetchError::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Fetches patch contents for a URL.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Serves `file://` URLs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFetcher;

impl Fetcher for LocalFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let Some(path) = url.strip_prefix("file://") else {
            return Err(FetchError::UnsupportedScheme {
                url: url.to_string(),
            });
        };
        let path = PathBuf::from(path);
        fs::read(&path).map_err(|source| FetchError::Io { path, source })
    }
}

/// HTTP(S) fetcher with a `file://` fallback.
#[cfg(feature = "http")]
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("patch-resolver/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                message: e.to_string(),
            })?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl Fetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        if url.starts_with("file://") {
            return LocalFetcher.fetch(url);
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(FetchError::UnsupportedScheme {
                url: url.to_string(),
            });
        }
        let transport = |e: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        };
        let response = self.client.get(url).send().map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().map_err(transport)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_fetcher_reads_file_urls() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("fix.patch");
        fs::write(&file, b"--- a/x\n+++ b/x\n").unwrap();

        let url = format!("file://{}", file.display());
        assert_eq!(LocalFetcher.fetch(&url).unwrap(), b"--- a/x\n+++ b/x\n");
    }

    #[test]
    fn test_local_fetcher_rejects_other_schemes() {
        let result = LocalFetcher.fetch("https://example.com/fix.patch");
        assert!(matches!(result, Err(FetchError::UnsupportedScheme { .. })));
    }

    #[test]
    fn test_missing_file_is_not_transient() {
        let err = LocalFetcher
            .fetch("file:///definitely/not/here.patch")
            .unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_status_errors_retry_only_server_side() {
        let status = |status| FetchError::Status {
            url: "https://x/y.patch".to_string(),
            status,
        };
        assert!(!status(404).is_transient());
        assert!(!status(403).is_transient());
        assert!(status(429).is_transient());
        assert!(status(503).is_transient());
    }
}
