use crate::{RecordStore, Result, StoreError};
use chrono::Utc;
use sled::{Db, Tree};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;
use treesync_core::{FileRecord, FileSnapshot};

const RECORDS_TREE: &str = "records";

/// Record store backed by an embedded sled database.
///
/// Records live in their own tree keyed by the raw path bytes, values
/// are bincode-encoded [`FileRecord`]s.
pub struct SledStore {
    db: Db,
    records: Tree,
    closed: AtomicBool,
}

impl SledStore {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Opens a throwaway store that is discarded on drop.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        let records = db.open_tree(RECORDS_TREE)?;
        Ok(Self {
            db,
            records,
            closed: AtomicBool::new(false),
        })
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.records.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl RecordStore for SledStore {
    fn insert(&self, snapshot: FileSnapshot) -> Result<FileRecord> {
        self.ensure_open()?;
        let key = path_key(&snapshot.path);
        let id = self.db.generate_id()?;
        let record = FileRecord::from_snapshot(id, snapshot, Utc::now());
        let bytes = bincode::serialize(&record)?;

        // Only succeeds if the key is vacant
        match self
            .records
            .compare_and_swap(&key, None as Option<&[u8]>, Some(bytes))?
        {
            Ok(()) => {
                debug!("Inserted record {} for {}", record.id, record.path.display());
                Ok(record)
            }
            Err(_) => Err(StoreError::Duplicate(record.path)),
        }
    }

    fn update(&self, snapshot: FileSnapshot) -> Result<FileRecord> {
        self.ensure_open()?;
        let key = path_key(&snapshot.path);

        let old_bytes = match self.records.get(&key)? {
            Some(bytes) => bytes,
            None => return Err(StoreError::NotFound(snapshot.path)),
        };
        let old: FileRecord = bincode::deserialize(&old_bytes)?;
        let record = old.refreshed(snapshot, Utc::now());
        let bytes = bincode::serialize(&record)?;

        match self
            .records
            .compare_and_swap(&key, Some(old_bytes), Some(bytes))?
        {
            Ok(()) => {
                debug!("Updated record {} for {}", record.id, record.path.display());
                Ok(record)
            }
            Err(_) => Err(StoreError::Conflict(record.path)),
        }
    }

    fn delete(&self, path: &Path) -> Result<bool> {
        self.ensure_open()?;
        let removed = self.records.remove(path_key(path))?;
        if removed.is_some() {
            debug!("Deleted record for {}", path.display());
        }
        Ok(removed.is_some())
    }

    fn get(&self, path: &Path) -> Result<Option<FileRecord>> {
        self.ensure_open()?;
        match self.records.get(path_key(path))? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn list_all(&self) -> Result<Vec<FileRecord>> {
        self.ensure_open()?;
        let mut records = Vec::with_capacity(self.records.len());
        for item in self.records.iter() {
            let (_key, value) = item?;
            records.push(bincode::deserialize(&value)?);
        }
        Ok(records)
    }

    fn list_under(&self, dir: &Path) -> Result<Vec<FileRecord>> {
        self.ensure_open()?;
        let mut prefix = path_key(dir);
        prefix.extend_from_slice(std::path::MAIN_SEPARATOR_STR.as_bytes());

        let mut records = Vec::new();
        for item in self.records.scan_prefix(&prefix) {
            let (_key, value) = item?;
            let record: FileRecord = bincode::deserialize(&value)?;
            if record.path.starts_with(dir) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.db.flush()?;
        debug!("Record store closed");
        Ok(())
    }
}

#[cfg(unix)]
fn path_key(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
fn path_key(path: &Path) -> Vec<u8> {
    path.to_string_lossy().as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn snapshot(path: &str, content: &str) -> FileSnapshot {
        FileSnapshot {
            path: PathBuf::from(path),
            size: content.len() as u64,
            modified: 1_700_000_000,
            checksum: treesync_core::checksum_bytes(content.as_bytes()),
        }
    }

    #[test]
    fn test_insert_then_get() {
        let store = SledStore::temporary().unwrap();
        let record = store.insert(snapshot("/data/a.txt", "alpha")).unwrap();

        let loaded = store.get(Path::new("/data/a.txt")).unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_duplicate_insert_is_rejected() {
        let store = SledStore::temporary().unwrap();
        store.insert(snapshot("/data/a.txt", "alpha")).unwrap();

        let err = store.insert(snapshot("/data/a.txt", "beta")).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_update_keeps_identity() {
        let store = SledStore::temporary().unwrap();
        let first = store.insert(snapshot("/data/a.txt", "alpha")).unwrap();
        let second = store.update(snapshot("/data/a.txt", "alphabet")).unwrap();

        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(second.size, 8);
    }

    #[test]
    fn test_update_missing_is_not_found() {
        let store = SledStore::temporary().unwrap();
        let err = store.update(snapshot("/data/a.txt", "alpha")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = SledStore::temporary().unwrap();
        store.insert(snapshot("/data/a.txt", "alpha")).unwrap();

        assert!(store.delete(Path::new("/data/a.txt")).unwrap());
        assert!(!store.delete(Path::new("/data/a.txt")).unwrap());
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_ids_are_distinct() {
        let store = SledStore::temporary().unwrap();
        let a = store.insert(snapshot("/data/a.txt", "a")).unwrap();
        let b = store.insert(snapshot("/data/b.txt", "b")).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(store.list_all().unwrap().len(), 2);
    }

    #[test]
    fn test_list_under_matches_whole_components() {
        let store = SledStore::temporary().unwrap();
        store.insert(snapshot("/data/logs/a.log", "a")).unwrap();
        store.insert(snapshot("/data/logs/old/b.log", "b")).unwrap();
        store.insert(snapshot("/data/logs-archive/c.log", "c")).unwrap();
        store.insert(snapshot("/data/logs", "not a dir")).unwrap();

        let mut under: Vec<_> = store
            .list_under(Path::new("/data/logs"))
            .unwrap()
            .into_iter()
            .map(|r| r.path)
            .collect();
        under.sort();
        assert_eq!(
            under,
            vec![
                PathBuf::from("/data/logs/a.log"),
                PathBuf::from("/data/logs/old/b.log")
            ]
        );
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let store = SledStore::temporary().unwrap();
        store.close().unwrap();
        store.close().unwrap();

        let err = store.list_all().unwrap_err();
        assert!(matches!(err, StoreError::Closed));
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("db");
        {
            let store = SledStore::open(&db_path).unwrap();
            store.insert(snapshot("/data/a.txt", "alpha")).unwrap();
            store.close().unwrap();
        }

        let store = SledStore::open(&db_path).unwrap();
        let records = store.list_all().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path, PathBuf::from("/data/a.txt"));
    }
}
