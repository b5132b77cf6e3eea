//! Error types for reading files off disk.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Convenience type for functions that read files.
pub type Result<T> = std::result::Result<T, FileError>;

/// Things that can go wrong while stat'ing or hashing a file.
#[derive(Error, Debug)]
pub enum FileError {
    /// The file could not be stat'd, opened or read.
    #[error("failed to read file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The path exists but is a directory, socket or similar.
    #[error("not a regular file: '{0}'")]
    NotAFile(PathBuf),
}

impl FileError {
    /// Creates an IO error with the path for context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when the file disappeared before we could read it.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Io { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}
