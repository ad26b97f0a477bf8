//! Error types for scan-forge operations.
//!
//! Defines typed errors for the major subsystems:
//! - Configuration loading and validation
//! - Repository snapshot provisioning
//! - Result archiving
//! - Dataset publishing (HuggingFace)
//!
//! Per-run container failures are deliberately *not* errors: the executor
//! translates them into the closed outcome taxonomy in
//! [`crate::pipeline::RunStatus`] so that a failed analysis run is recorded
//! as data instead of unwinding the pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while provisioning a repository snapshot.
///
/// Ordinary fetch failures (bad HTTP status, unreachable host) are not
/// represented here — they surface as the `FetchFailed` sentinel on the
/// provisioning result. These errors cover local filesystem faults and the
/// one packaging-contract violation.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("Snapshot archive at '{path}' is not a valid zip: {source}")]
    BadArchive {
        path: PathBuf,
        source: zip::result::ZipError,
    },

    #[error(
        "Extracted snapshot at '{path}' has {entries} top-level entries, expected exactly one"
    )]
    AmbiguousArchiveRoot { path: PathBuf, entries: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while packaging a run's output directory.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Zip write failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Failed to walk source directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Entry '{0}' is outside the source directory")]
    EntryOutsideSource(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur while publishing to the remote dataset store.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Hub API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Missing HuggingFace API token")]
    MissingToken,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
