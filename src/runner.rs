//! One end-to-end import run: acquire the feed, open the session, import.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection, SqliteConnection};
use tracing::{info, warn};

use crate::config::ImportConfig;
use crate::error::{AcquisitionError, AtStage, ImportError, Stage};
use crate::extract::{Extractor, ZipExtractor};
use crate::fetch::{BasicClient, Fetcher, HttpFetcher};
use crate::orchestrator::ImportOrchestrator;
use crate::report::ImportReport;

/// Where the feed files come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedSource {
    /// An http(s) URL of a zip archive.
    Remote(String),
    /// A local zip archive.
    Archive(PathBuf),
    /// A directory that already holds the extracted feed files.
    Directory(PathBuf),
}

impl FeedSource {
    pub fn parse(source: &str) -> Self {
        if source.starts_with("http://") || source.starts_with("https://") {
            return FeedSource::Remote(source.to_string());
        }
        let path = PathBuf::from(source);
        if path.is_dir() {
            FeedSource::Directory(path)
        } else {
            FeedSource::Archive(path)
        }
    }
}

pub struct ImportRunner<F, E> {
    config: ImportConfig,
    fetcher: F,
    extractor: E,
}

impl ImportRunner<HttpFetcher<BasicClient>, ZipExtractor> {
    pub fn new(config: ImportConfig) -> Self {
        Self::with_collaborators(config, HttpFetcher::default(), ZipExtractor)
    }
}

impl<F: Fetcher, E: Extractor> ImportRunner<F, E> {
    pub fn with_collaborators(config: ImportConfig, fetcher: F, extractor: E) -> Self {
        Self {
            config,
            fetcher,
            extractor,
        }
    }

    /// The configured override, else the service date the clock is in now.
    /// Resolve once per run and hand the result to [`Self::run`].
    pub fn service_date(&self) -> NaiveDate {
        let clock = self.config.policy().now();
        let service_date = self.config.service_date.unwrap_or(clock.service_date);
        info!(
            service_date = %service_date,
            clock_service_date = %clock.service_date,
            elapsed_seconds = clock.elapsed_seconds,
            "Resolved service date"
        );
        service_date
    }

    /// Returns the directory the feed files can be read from.
    #[tracing::instrument(skip(self), fields(source = %self.config.source))]
    pub async fn acquire(&self) -> Result<PathBuf, AcquisitionError> {
        match FeedSource::parse(&self.config.source) {
            FeedSource::Directory(dir) => {
                info!(dir = %dir.display(), "Using extracted feed directory");
                Ok(dir)
            }
            FeedSource::Archive(archive) => {
                self.extractor
                    .extract(&archive, &self.config.extract_dir())
                    .await
            }
            FeedSource::Remote(url) => {
                let archive = self.fetcher.fetch(&url, &self.config.workdir).await?;
                self.extractor
                    .extract(&archive, &self.config.extract_dir())
                    .await
            }
        }
    }

    pub async fn run(&self, service_date: NaiveDate) -> Result<ImportReport, ImportError> {
        let feed_dir = self.acquire().await.at(Stage::Acquire)?;

        let mut conn = connect(&self.config.database_url)
            .await
            .at(Stage::Connect)?;
        let result = ImportOrchestrator::new(service_date)
            .import(&mut conn, &feed_dir)
            .await;

        // Drops the session's temporary tables along with it.
        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close database session");
        }
        result
    }
}

/// Opens the dedicated session connection for one import.
pub async fn connect(database_url: &str) -> Result<SqliteConnection, sqlx::Error> {
    SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .connect()
        .await
}

/// Convenience for callers holding a feed directory already.
pub async fn import_directory(
    database_url: &str,
    feed_dir: &Path,
    orchestrator: ImportOrchestrator,
) -> Result<ImportReport, ImportError> {
    let mut conn = connect(database_url).await.at(Stage::Connect)?;
    let result = orchestrator.import(&mut conn, feed_dir).await;
    if let Err(e) = conn.close().await {
        warn!(error = %e, "Failed to close database session");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clap::Parser;
    use std::sync::Mutex;

    struct RecordingFetcher {
        urls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Fetcher for RecordingFetcher {
        async fn fetch(&self, url: &str, target_dir: &Path) -> Result<PathBuf, AcquisitionError> {
            self.urls.lock().unwrap().push(url.to_string());
            Ok(target_dir.join("gtfs.zip"))
        }
    }

    struct EchoExtractor;

    #[async_trait]
    impl Extractor for EchoExtractor {
        async fn extract(&self, _archive: &Path, dest_dir: &Path) -> Result<PathBuf, AcquisitionError> {
            Ok(dest_dir.to_path_buf())
        }
    }

    fn config(source: &str, workdir: &Path) -> ImportConfig {
        ImportConfig::try_parse_from([
            "transit_static_loader",
            "--source",
            source,
            "--workdir",
            workdir.to_str().unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn test_feed_source_parse() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            FeedSource::parse("https://example.com/gtfs.zip"),
            FeedSource::Remote("https://example.com/gtfs.zip".to_string())
        );
        assert_eq!(
            FeedSource::parse(dir.path().to_str().unwrap()),
            FeedSource::Directory(dir.path().to_path_buf())
        );
        assert_eq!(
            FeedSource::parse("feeds/gtfs.zip"),
            FeedSource::Archive(PathBuf::from("feeds/gtfs.zip"))
        );
    }

    #[tokio::test]
    async fn test_acquire_remote_fetches_then_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ImportRunner::with_collaborators(
            config("https://example.com/gtfs.zip", dir.path()),
            RecordingFetcher {
                urls: Mutex::new(vec![]),
            },
            EchoExtractor,
        );

        let feed_dir = runner.acquire().await.unwrap();
        assert_eq!(feed_dir, dir.path().join("extracted"));
        assert_eq!(
            *runner.fetcher.urls.lock().unwrap(),
            vec!["https://example.com/gtfs.zip".to_string()]
        );
    }

    #[tokio::test]
    async fn test_acquire_directory_skips_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let runner = ImportRunner::with_collaborators(
            config(dir.path().to_str().unwrap(), dir.path()),
            RecordingFetcher {
                urls: Mutex::new(vec![]),
            },
            EchoExtractor,
        );

        assert_eq!(runner.acquire().await.unwrap(), dir.path());
        assert!(runner.fetcher.urls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_reports_acquire_stage() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.zip");
        let runner = ImportRunner::new(config(missing.to_str().unwrap(), dir.path()));

        let err = runner.run(runner.service_date()).await.unwrap_err();
        assert_eq!(err.stage, Stage::Acquire);
    }
}
