//! [`MaskFetcher`] over HTTP and the local filesystem.
//!
//! `http://` and `https://` references are fetched with a shared
//! [`reqwest::Client`]. Anything else is treated as a file path,
//! resolved against an optional base directory so that a response file
//! can refer to masks saved next to it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use papercut_pipeline::{MaskFetcher, PipelineError};

use crate::error::IoError;

const USER_AGENT: &str = concat!("papercut/", env!("CARGO_PKG_VERSION"));

/// Fetches masks from HTTP(S) URLs and local paths.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_dir: Option<PathBuf>,
}

impl HttpFetcher {
    /// Create a fetcher whose HTTP requests give up after `timeout`.
    ///
    /// The scene builder applies its own per-mask bound on top of this;
    /// the client timeout only keeps abandoned sockets from lingering.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::Http`] if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, IoError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            base_dir: None,
        })
    }

    /// Resolve relative file references against `dir`.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    async fn fetch_http(&self, url: &str) -> Result<Vec<u8>, String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let bytes = resp.bytes().await.map_err(|e| e.to_string())?;
        Ok(bytes.to_vec())
    }

    fn local_path(&self, reference: &str) -> PathBuf {
        let path = Path::new(reference.strip_prefix("file://").unwrap_or(reference));
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl MaskFetcher for HttpFetcher {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, PipelineError> {
        let result = if is_http(reference) {
            self.fetch_http(reference).await
        } else {
            let path = self.local_path(reference);
            tokio::fs::read(&path)
                .await
                .map_err(|e| format!("{}: {e}", path.display()))
        };
        result.map_err(|message| PipelineError::Fetch {
            reference: reference.to_owned(),
            message,
        })
    }
}

fn is_http(reference: &str) -> bool {
    let lower = reference.get(..8).unwrap_or(reference).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn http_schemes_are_detected() {
        assert!(is_http("https://example.com/m.png"));
        assert!(is_http("HTTP://example.com/m.png"));
        assert!(!is_http("masks/0.png"));
        assert!(!is_http("file:///tmp/m.png"));
        assert!(!is_http("http"));
    }

    #[test]
    fn relative_paths_use_base_dir() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1))
            .unwrap()
            .with_base_dir("/data/run");
        assert_eq!(
            fetcher.local_path("masks/0.png"),
            PathBuf::from("/data/run/masks/0.png")
        );
        assert_eq!(
            fetcher.local_path("/abs/0.png"),
            PathBuf::from("/abs/0.png")
        );
        assert_eq!(
            fetcher.local_path("file:///abs/1.png"),
            PathBuf::from("/abs/1.png")
        );
    }

    #[tokio::test]
    async fn missing_file_is_fetch_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        let result = fetcher.fetch("/definitely/not/here.png").await;
        assert!(matches!(
            result,
            Err(PipelineError::Fetch { ref reference, .. }) if reference == "/definitely/not/here.png"
        ));
    }
}
