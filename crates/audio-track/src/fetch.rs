//! Media byte fetchers for buffer-mode tracks.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::FetchSettings;

/// The "fetch media bytes" collaborator.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch_media_bytes(&self, src: &str) -> Result<Vec<u8>>;
}

/// Reads local paths (plain or `file://`).
#[derive(Clone, Copy, Debug, Default)]
pub struct FileFetcher;

#[async_trait]
impl MediaFetcher for FileFetcher {
    async fn fetch_media_bytes(&self, src: &str) -> Result<Vec<u8>> {
        let path = Path::new(src.strip_prefix("file://").unwrap_or(src));
        tokio::fs::read(path)
            .await
            .with_context(|| format!("read {path:?}"))
    }
}

/// Downloads `http://` and `https://` sources.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn from_settings(settings: &FetchSettings) -> Result<Self> {
        Ok(Self::new(settings.http_client()?))
    }
}

#[async_trait]
impl MediaFetcher for HttpFetcher {
    async fn fetch_media_bytes(&self, src: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(src)
            .send()
            .await
            .with_context(|| format!("request {src}"))?
            .error_for_status()
            .with_context(|| format!("fetch {src}"))?;
        let bytes = resp
            .bytes()
            .await
            .with_context(|| format!("read body of {src}"))?;
        Ok(bytes.to_vec())
    }
}

/// Routes by scheme: HTTP(S) to [`HttpFetcher`], everything else to [`FileFetcher`].
#[derive(Clone, Debug)]
pub struct DefaultFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl DefaultFetcher {
    pub fn new() -> Self {
        Self {
            http: HttpFetcher::new(reqwest::Client::new()),
            file: FileFetcher,
        }
    }

    pub fn from_settings(settings: &FetchSettings) -> Result<Self> {
        Ok(Self {
            http: HttpFetcher::from_settings(settings)?,
            file: FileFetcher,
        })
    }
}

impl Default for DefaultFetcher {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn is_remote(src: &str) -> bool {
    src.starts_with("http://") || src.starts_with("https://")
}

#[async_trait]
impl MediaFetcher for DefaultFetcher {
    async fn fetch_media_bytes(&self, src: &str) -> Result<Vec<u8>> {
        if is_remote(src) {
            self.http.fetch_media_bytes(src).await
        } else {
            self.file.fetch_media_bytes(src).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!(
            "audio-track-fetch-{}-{name}",
            std::process::id()
        ))
    }

    #[tokio::test]
    async fn file_fetcher_reads_plain_and_file_urls() {
        let path = temp_path("plain.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let plain = FileFetcher.fetch_media_bytes(path.to_str().unwrap()).await.unwrap();
        let url = format!("file://{}", path.display());
        let via_url = DefaultFetcher::new().fetch_media_bytes(&url).await.unwrap();

        assert_eq!(plain, vec![1, 2, 3]);
        assert_eq!(via_url, plain);
        let _ = std::fs::remove_file(path);
    }

    #[tokio::test]
    async fn missing_file_reports_path() {
        let path = temp_path("missing.bin");
        let err = FileFetcher
            .fetch_media_bytes(path.to_str().unwrap())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("missing.bin"));
    }

    #[test]
    fn remote_detection() {
        assert!(is_remote("https://example.com/a.mp3"));
        assert!(is_remote("http://example.com/a.mp3"));
        assert!(!is_remote("file:///tmp/a.mp3"));
        assert!(!is_remote("a.mp3"));
    }
}
