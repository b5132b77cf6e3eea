//! Treesync Store - durable file records
//!
//! The reconciliation engine only needs a handful of primitives from its
//! store: insert, update, delete and list-all, keyed by path. They are
//! described by [`RecordStore`]; [`SledStore`] is the on-disk
//! implementation.

mod sled_store;

pub use sled_store::SledStore;

use std::path::{Path, PathBuf};
use thiserror::Error;
use treesync_core::{FileRecord, FileSnapshot};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sled(#[from] sled::Error),
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Record already exists for '{0}'")]
    Duplicate(PathBuf),
    #[error("No record for '{0}'")]
    NotFound(PathBuf),
    #[error("Record for '{0}' changed concurrently")]
    Conflict(PathBuf),
    #[error("Store is closed")]
    Closed,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// A key-indexed table of [`FileRecord`]s, one per path.
///
/// The store owns `id`, `created_at` and `updated_at`; callers hand it
/// snapshots and get full records back.
pub trait RecordStore: Send + Sync {
    /// Adds a record for a path that has none. Fails with
    /// [`StoreError::Duplicate`] otherwise.
    fn insert(&self, snapshot: FileSnapshot) -> Result<FileRecord>;

    /// Replaces the file data of an existing record, keeping its identity.
    /// Fails with [`StoreError::NotFound`] when there is no record.
    fn update(&self, snapshot: FileSnapshot) -> Result<FileRecord>;

    /// Removes the record for `path`. Returns whether one existed.
    fn delete(&self, path: &Path) -> Result<bool>;

    fn get(&self, path: &Path) -> Result<Option<FileRecord>>;

    fn list_all(&self) -> Result<Vec<FileRecord>>;

    /// Records for paths strictly beneath directory `dir`.
    fn list_under(&self, dir: &Path) -> Result<Vec<FileRecord>>;

    /// Flushes and releases the store. Safe to call more than once.
    fn close(&self) -> Result<()>;
}
