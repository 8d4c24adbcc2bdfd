//! Unpacking of the feed archive into a working directory.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::AcquisitionError;

/// Unpacks a feed archive into `dest_dir` and returns the directory holding
/// the feed files.
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<PathBuf, AcquisitionError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ZipExtractor;

#[async_trait]
impl Extractor for ZipExtractor {
    async fn extract(&self, archive: &Path, dest_dir: &Path) -> Result<PathBuf, AcquisitionError> {
        let archive = archive.to_path_buf();
        let dest_dir = dest_dir.to_path_buf();
        tokio::task::spawn_blocking(move || extract_zip(&archive, &dest_dir))
            .await
            .map_err(|e| AcquisitionError::Task(e.to_string()))?
    }
}

/// Blocking extraction. `dest_dir` is emptied first so it only ever holds
/// the files of this archive.
#[tracing::instrument]
pub fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<PathBuf, AcquisitionError> {
    info!("Extracting feed archive");
    let start = Instant::now();
    if dest_dir.exists() {
        debug!("Clearing previous extraction");
        std::fs::remove_dir_all(dest_dir)?;
    }
    std::fs::create_dir_all(dest_dir)?;

    let archive_err = |source| AcquisitionError::Archive {
        path: archive_path.to_path_buf(),
        source,
    };
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file).map_err(archive_err)?;

    let mut file_count = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(archive_err)?;
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            return Err(AcquisitionError::UnsafeEntry(entry.name().to_string()));
        };
        let out = dest_dir.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&out)?;
            continue;
        }
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut target = File::create(&out)?;
        std::io::copy(&mut entry, &mut target)?;
        file_count += 1;
    }

    info!(
        file_count,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Extracted feed archive"
    );
    Ok(dest_dir.to_path_buf())
}
