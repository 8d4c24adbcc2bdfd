//! Error taxonomy for an import run.
//!
//! Every failure is an [`ImportError`]: the [`Stage`] that failed plus an
//! [`ErrorKind`] describing what went wrong. Nothing in the library logs and
//! rethrows; the caller decides how to report a failure and which exit code
//! to use.

use std::fmt;
use std::path::PathBuf;

use crate::schema::Entity;

/// The step of an import run that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquire,
    Connect,
    Schema,
    Load(Entity),
    ResolveActiveServices,
    Commit,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Acquire => f.write_str("acquire"),
            Stage::Connect => f.write_str("connect"),
            Stage::Schema => f.write_str("schema"),
            Stage::Load(entity) => write!(f, "load {entity}"),
            Stage::ResolveActiveServices => f.write_str("resolve active services"),
            Stage::Commit => f.write_str("commit"),
        }
    }
}

#[derive(thiserror::Error, Debug)]
#[error("import failed during {stage}: {kind}")]
pub struct ImportError {
    pub stage: Stage,
    #[source]
    pub kind: ErrorKind,
}

impl ImportError {
    pub fn new(stage: Stage, kind: impl Into<ErrorKind>) -> Self {
        Self {
            stage,
            kind: kind.into(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ErrorKind {
    #[error("{file} not found in {}", .dir.display())]
    MissingSourceFile { file: &'static str, dir: PathBuf },
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),
    #[error("failed to read source file: {0}")]
    Source(#[from] csv::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// A source row that could not be coerced into its canonical form.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    #[error("column {column}, row {row}: {source}")]
    Malformed {
        column: &'static str,
        row: i64,
        #[source]
        source: TokenError,
    },
    #[error("column {column}, row {row}: required value is empty")]
    MissingValue { column: &'static str, row: i64 },
    #[error("required column {column} is missing from the header")]
    MissingColumn { column: &'static str },
}

/// A single raw token that does not match the expected format.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("expected {expected}, found {token:?}")]
pub struct TokenError {
    pub expected: &'static str,
    pub token: String,
}

#[derive(thiserror::Error, Debug)]
pub enum AcquisitionError {
    #[error("invalid feed url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("download of {url} failed: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download of {url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },
    #[error("{} is not a readable zip archive: {source}", .path.display())]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("archive entry {0:?} would be written outside the destination directory")]
    UnsafeEntry(String),
    #[error("extraction task failed: {0}")]
    Task(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Attaches a [`Stage`] to a lower-level error.
pub trait AtStage<T> {
    fn at(self, stage: Stage) -> Result<T, ImportError>;
}

impl<T, E: Into<ErrorKind>> AtStage<T> for Result<T, E> {
    fn at(self, stage: Stage) -> Result<T, ImportError> {
        self.map_err(|e| ImportError::new(stage, e))
    }
}
