//! File record representation.
//!
//! A `FileSnapshot` is what we read off disk in one pass; a `FileRecord`
//! is a snapshot once the store has given it an identity and bookkeeping
//! timestamps.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Size and modification time only. Cheap to obtain, no content read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    /// Seconds since the Unix epoch, truncated.
    pub modified: i64,
}

/// A point-in-time read of one file.
///
/// `size`, `modified` and `checksum` all come from the same inspection,
/// but not atomically: a file rewritten between the stat and the read
/// can produce a checksum that belongs to newer content. The next event
/// or scan corrects that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSnapshot {
    /// Absolute, normalized path.
    pub path: PathBuf,
    pub size: u64,
    /// Seconds since the Unix epoch, truncated.
    pub modified: i64,
    /// Lowercase hex digest of the full contents.
    pub checksum: String,
}

impl FileSnapshot {
    pub fn stat(&self) -> FileStat {
        FileStat {
            size: self.size,
            modified: self.modified,
        }
    }
}

/// A snapshot as persisted by the record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Store-assigned identity, stable across updates.
    pub id: u64,
    pub path: PathBuf,
    pub size: u64,
    pub modified: i64,
    pub checksum: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FileRecord {
    /// Builds a new record from a snapshot. Both timestamps are set to `now`.
    pub fn from_snapshot(id: u64, snapshot: FileSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            id,
            path: snapshot.path,
            size: snapshot.size,
            modified: snapshot.modified,
            checksum: snapshot.checksum,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the file data, keeping `id` and `created_at`.
    pub fn refreshed(&self, snapshot: FileSnapshot, now: DateTime<Utc>) -> Self {
        Self {
            id: self.id,
            path: snapshot.path,
            size: snapshot.size,
            modified: snapshot.modified,
            checksum: snapshot.checksum,
            created_at: self.created_at,
            updated_at: now,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stat(&self) -> FileStat {
        FileStat {
            size: self.size,
            modified: self.modified,
        }
    }

    pub fn snapshot(&self) -> FileSnapshot {
        FileSnapshot {
            path: self.path.clone(),
            size: self.size,
            modified: self.modified,
            checksum: self.checksum.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(checksum: &str) -> FileSnapshot {
        FileSnapshot {
            path: PathBuf::from("/data/a.txt"),
            size: 5,
            modified: 1_700_000_000,
            checksum: checksum.to_string(),
        }
    }

    #[test]
    fn test_refresh_keeps_identity() {
        let created = Utc::now() - chrono::Duration::seconds(60);
        let record = FileRecord::from_snapshot(7, snapshot("aa"), created);
        assert_eq!(record.created_at, record.updated_at);

        let later = Utc::now();
        let updated = record.refreshed(snapshot("bb"), later);
        assert_eq!(updated.id, 7);
        assert_eq!(updated.created_at, created);
        assert_eq!(updated.updated_at, later);
        assert_eq!(updated.checksum, "bb");
    }

    #[test]
    fn test_snapshot_roundtrips_file_data() {
        let record = FileRecord::from_snapshot(1, snapshot("cc"), Utc::now());
        assert_eq!(record.snapshot(), snapshot("cc"));
        assert_eq!(record.stat(), snapshot("cc").stat());
    }
}
