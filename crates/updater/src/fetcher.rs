//! HTTP transport for manifests, assets and self-update payloads.
//!
//! Mirrors the original's libcurl configuration (fixed user-agent, connect
//! timeout, low-speed watchdog, TCP keepalive) and its two-timeout model:
//! small requests (manifests) use a short fixed timeout, while downloads
//! scale their timeout with the payload size the manifest itself declares
//! (`FileEntry.size`/`Package.size`) — never a probe request of its own.

use std::path::Path;
use std::time::Duration;

use reqwest::{Client, Response};
use tokio::io::AsyncWriteExt;

use crate::error::{Result, UpdaterError};

const USER_AGENT: &str = "MinecraftUpdater/1.0";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const GENERAL_TIMEOUT: Duration = Duration::from_secs(30);
const TCP_KEEPALIVE: Duration = Duration::from_secs(10);
const MIN_DOWNLOAD_TIMEOUT_SECS: u64 = 60;
const MAX_DOWNLOAD_TIMEOUT_SECS: u64 = 600;
const DOWNLOAD_TIMEOUT_STEP_SECS: u64 = 30;
const DOWNLOAD_TIMEOUT_STEP_BYTES: u64 = 10 * 1024 * 1024;

/// Called periodically while a download is in flight.
///
/// The second argument is the total size in bytes, or `0` when the server
/// didn't report a `Content-Length`.
pub type ProgressFn<'a> = dyn FnMut(u64, u64) + Send + 'a;

/// Timeout budget for a download of `size_bytes`, matching
/// `GetDownloadTimeoutForSize` from the original client: 60s plus 30s per
/// additional 10 MiB, capped at 600s.
pub fn download_timeout_for_size(size_bytes: u64) -> Duration {
    let steps = size_bytes / DOWNLOAD_TIMEOUT_STEP_BYTES;
    let seconds =
        (MIN_DOWNLOAD_TIMEOUT_SECS + steps * DOWNLOAD_TIMEOUT_STEP_SECS).min(MAX_DOWNLOAD_TIMEOUT_SECS);
    Duration::from_secs(seconds)
}

/// Thin wrapper around a [`reqwest::Client`] configured to the original
/// client's transport settings.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    general_timeout: Duration,
}

impl HttpFetcher {
    /// Build a fetcher with the fixed connect timeout, TCP keepalive and
    /// user-agent the original client used for every request, and the
    /// default general timeout (no `config.api_timeout` override).
    pub fn new() -> Result<Self> {
        Self::with_timeout(GENERAL_TIMEOUT)
    }

    /// Build a fetcher whose general (non-download) timeout is driven by
    /// `config.api_timeout` rather than the hardcoded default; used for
    /// manifest GETs.
    pub fn with_timeout(general_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .tcp_keepalive(TCP_KEEPALIVE)
            .build()?;
        Ok(HttpFetcher { client, general_timeout })
    }

    /// Fetch a small text document (a manifest) with the general
    /// timeout; the original applied its low-speed watchdog here too, which
    /// `reqwest` doesn't expose directly, so an overall wall-clock timeout
    /// stands in for it.
    pub async fn get_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .timeout(self.general_timeout)
            .send()
            .await?
            .error_for_status()?;
        let text = response.text().await?;
        Ok(text)
    }

    /// Download `url` fully into memory. `expected_size` (the manifest's
    /// `FileEntry.size`/`Package.size`, or `0` when the manifest didn't
    /// declare one) sets the download timeout; progress totals still prefer
    /// the server's `Content-Length` when present. `on_progress` is invoked
    /// as bytes arrive.
    pub async fn download_to_memory(
        &self,
        url: &str,
        expected_size: u64,
        mut on_progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<Vec<u8>> {
        let response = self.start_download(url, expected_size).await?;
        let total = response.content_length().unwrap_or(expected_size);
        let mut downloaded = 0u64;
        let mut buf = Vec::with_capacity(total as usize);

        let mut stream = response;
        while let Some(chunk) = stream.chunk().await? {
            downloaded += chunk.len() as u64;
            buf.extend_from_slice(&chunk);
            if let Some(cb) = on_progress.as_deref_mut() {
                cb(downloaded, total);
            }
        }
        Ok(buf)
    }

    /// Download `url` to `dest`, streaming chunks straight to disk and
    /// removing the partial file on any failure. `expected_size` sets the
    /// download timeout the same way as [`Self::download_to_memory`].
    pub async fn download_to_file(
        &self,
        url: &str,
        dest: &Path,
        expected_size: u64,
        mut on_progress: Option<&mut ProgressFn<'_>>,
    ) -> Result<u64> {
        let response = self.start_download(url, expected_size).await?;
        let total = response.content_length().unwrap_or(expected_size);

        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let result = self.write_stream(response, dest, total, &mut on_progress).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }

    async fn write_stream(
        &self,
        mut response: Response,
        dest: &Path,
        total: u64,
        on_progress: &mut Option<&mut ProgressFn<'_>>,
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(dest).await?;
        let mut downloaded = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(cb) = on_progress.as_deref_mut() {
                cb(downloaded, total);
            }
        }
        file.flush().await?;
        Ok(downloaded)
    }

    /// Issue the `GET`, sizing the download timeout directly off the
    /// manifest-declared `expected_size` (`GetDownloadTimeoutForSize` in the
    /// original reads `fileInfo["size"]`/`package["size"]` the same way,
    /// with no probe request of its own).
    async fn start_download(&self, url: &str, expected_size: u64) -> Result<Response> {
        self.client
            .get(url)
            .timeout(download_timeout_for_size(expected_size))
            .send()
            .await?
            .error_for_status()
            .map_err(UpdaterError::from)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new().expect("default reqwest client configuration is always valid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_floor_and_ceiling() {
        assert_eq!(download_timeout_for_size(0).as_secs(), 60);
        assert_eq!(download_timeout_for_size(5 * 1024 * 1024).as_secs(), 60);
    }

    #[test]
    fn timeout_scales_with_size() {
        assert_eq!(
            download_timeout_for_size(10 * 1024 * 1024).as_secs(),
            90
        );
        assert_eq!(
            download_timeout_for_size(25 * 1024 * 1024).as_secs(),
            120
        );
    }

    #[test]
    fn timeout_caps_at_ten_minutes() {
        assert_eq!(
            download_timeout_for_size(10_000 * 1024 * 1024).as_secs(),
            600
        );
    }

    #[test]
    fn with_timeout_overrides_the_default_general_timeout() {
        let fetcher = HttpFetcher::with_timeout(Duration::from_secs(120)).unwrap();
        assert_eq!(fetcher.general_timeout, Duration::from_secs(120));
    }
}
