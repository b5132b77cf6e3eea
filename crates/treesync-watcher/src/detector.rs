//! Change detection.
//!
//! Decides whether a file differs from its stored record. Size and
//! mtime are compared first; the checksum is only computed when both
//! match, which keeps untouched-looking files honest without hashing
//! files that obviously changed.

use std::path::Path;
use tracing::debug;
use treesync_core::{stat_file, Checksummer, FileRecord, FileSnapshot};

/// Outcome of comparing a file on disk against its record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeVerdict {
    /// Size, mtime and checksum all match.
    Unchanged,
    /// Size or mtime differ. The content was not read.
    MetadataChanged,
    /// Size and mtime match but the content does not. Carries the
    /// snapshot read while checking, so the file need not be hashed again.
    ContentChanged(FileSnapshot),
    /// The file could not be stat'd or read. Treated as changed.
    Unreadable,
}

impl ChangeVerdict {
    pub fn is_changed(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    /// The fresh snapshot, when detection already produced one.
    pub fn into_snapshot(self) -> Option<FileSnapshot> {
        match self {
            Self::ContentChanged(snapshot) => Some(snapshot),
            _ => None,
        }
    }
}

/// Compares `path` against `stored`.
///
/// Never fails: a file that cannot be checked is reported as
/// [`ChangeVerdict::Unreadable`], so the caller refreshes it rather than
/// keeping a record that may be stale.
pub fn detect_change(
    path: &Path,
    stored: &FileRecord,
    checksummer: &dyn Checksummer,
) -> ChangeVerdict {
    let current = match stat_file(path) {
        Ok(stat) => stat,
        Err(e) => {
            debug!("Cannot stat {}, assuming changed: {}", path.display(), e);
            return ChangeVerdict::Unreadable;
        }
    };

    if current != stored.stat() {
        return ChangeVerdict::MetadataChanged;
    }

    match checksummer.checksum_file(path) {
        Ok(checksum) if checksum == stored.checksum => ChangeVerdict::Unchanged,
        Ok(checksum) => ChangeVerdict::ContentChanged(FileSnapshot {
            path: path.to_path_buf(),
            size: current.size,
            modified: current.modified,
            checksum,
        }),
        Err(e) => {
            debug!("Cannot hash {}, assuming changed: {}", path.display(), e);
            ChangeVerdict::Unreadable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;
    use treesync_core::{inspect_file, FileSnapshot, Sha256Checksum};

    /// Counts how often content is hashed.
    #[derive(Default)]
    struct CountingChecksum {
        calls: AtomicUsize,
    }

    impl Checksummer for CountingChecksum {
        fn checksum_file(&self, path: &Path) -> treesync_core::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Sha256Checksum.checksum_file(path)
        }
    }

    fn record_for(snapshot: FileSnapshot) -> FileRecord {
        FileRecord::from_snapshot(1, snapshot, Default::default())
    }

    #[test]
    fn test_untouched_file_is_unchanged() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "stable").unwrap();
        let stored = record_for(inspect_file(&path, &Sha256Checksum).unwrap());

        assert_eq!(
            detect_change(&path, &stored, &Sha256Checksum),
            ChangeVerdict::Unchanged
        );
    }

    #[test]
    fn test_metadata_change_skips_hashing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "short").unwrap();
        let stored = record_for(inspect_file(&path, &Sha256Checksum).unwrap());

        fs::write(&path, "a good deal longer").unwrap();

        let counter = CountingChecksum::default();
        let verdict = detect_change(&path, &stored, &counter);
        assert_eq!(verdict, ChangeVerdict::MetadataChanged);
        assert_eq!(counter.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_same_size_and_mtime_different_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "AAAAA").unwrap();

        // Pin the mtime so both writes share it
        let pinned = SystemTime::now() - Duration::from_secs(3600);
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(pinned)
            .unwrap();
        let stored = record_for(inspect_file(&path, &Sha256Checksum).unwrap());

        fs::write(&path, "BBBBB").unwrap();
        fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(pinned)
            .unwrap();

        let counter = CountingChecksum::default();
        let verdict = detect_change(&path, &stored, &counter);
        assert!(verdict.is_changed());
        assert_eq!(counter.calls.load(Ordering::SeqCst), 1);

        let fresh = verdict.into_snapshot().unwrap();
        assert_eq!(fresh.checksum, treesync_core::checksum_bytes(b"BBBBB"));
        assert_eq!(fresh.stat(), stored.stat());
    }

    #[test]
    fn test_missing_file_counts_as_changed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, "soon gone").unwrap();
        let stored = record_for(inspect_file(&path, &Sha256Checksum).unwrap());
        fs::remove_file(&path).unwrap();

        let verdict = detect_change(&path, &stored, &Sha256Checksum);
        assert_eq!(verdict, ChangeVerdict::Unreadable);
        assert!(verdict.is_changed());
    }
}
