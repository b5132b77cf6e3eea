//! Error types for syncing a directory tree.

use std::path::PathBuf;
use thiserror::Error;
use treesync_core::FileError;
use treesync_store::StoreError;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Error, Debug)]
pub enum SyncError {
    /// The watch root or another setting is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to read config file '{path}': {source}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid ignore pattern: {0}")]
    Pattern(#[source] ignore::Error),

    /// Directory enumeration failed. Scans never return partial results.
    #[error("failed to scan '{path}': {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: ignore::Error,
    },

    #[error(transparent)]
    File(#[from] FileError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl SyncError {
    /// True when the failure is a file that vanished before it was read.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::File(e) if e.is_not_found())
    }
}
