//! Download of the static feed archive.

mod http;

pub use http::{BasicClient, HttpClient};

use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::info;

use crate::error::AcquisitionError;

/// File name the archive is saved under inside the target directory.
pub const ARCHIVE_FILE_NAME: &str = "gtfs.zip";

/// Fetches a remote feed archive into a local directory.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, target_dir: &Path) -> Result<PathBuf, AcquisitionError>;
}

/// Streams the archive to disk through an [`HttpClient`].
pub struct HttpFetcher<C> {
    client: C,
}

impl<C: HttpClient> HttpFetcher<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }

    #[tracing::instrument(skip_all, fields(url = %url))]
    async fn download(&self, url: &str, target_dir: &Path) -> Result<PathBuf, AcquisitionError> {
        info!("Downloading feed archive");
        let start = Instant::now();

        tokio::fs::create_dir_all(target_dir).await?;
        let archive = target_dir.join(ARCHIVE_FILE_NAME);

        let response = send_get(&self.client, url).await?;
        if !response.status().is_success() {
            return Err(AcquisitionError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }

        let mut file = tokio::fs::File::create(&archive).await?;
        let mut stream = response.bytes_stream();
        let mut total_bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| AcquisitionError::Download {
                url: url.to_string(),
                source,
            })?;
            total_bytes += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        info!(
            size_mb = total_bytes / (1024 * 1024),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Downloaded feed archive"
        );
        Ok(archive)
    }
}

impl Default for HttpFetcher<BasicClient> {
    fn default() -> Self {
        Self::new(BasicClient::new())
    }
}

#[async_trait]
impl<C: HttpClient> Fetcher for HttpFetcher<C> {
    async fn fetch(&self, url: &str, target_dir: &Path) -> Result<PathBuf, AcquisitionError> {
        self.download(url, target_dir).await
    }
}

pub async fn send_get<C: HttpClient>(
    client: &C,
    url: &str,
) -> Result<reqwest::Response, AcquisitionError> {
    let parsed = url
        .parse::<reqwest::Url>()
        .map_err(|e| AcquisitionError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
    let req = reqwest::Request::new(reqwest::Method::GET, parsed);

    client
        .execute(req)
        .await
        .map_err(|source| AcquisitionError::Download {
            url: url.to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_url_is_rejected_before_sending() {
        let client = BasicClient::new();
        let err = send_get(&client, "not a url").await.unwrap_err();
        assert!(matches!(err, AcquisitionError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_fetch_reports_invalid_url_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::default();
        let err = fetcher.fetch("::", dir.path()).await.unwrap_err();
        assert!(matches!(err, AcquisitionError::InvalidUrl { .. }));
        assert!(!dir.path().join(ARCHIVE_FILE_NAME).exists());
    }
}
