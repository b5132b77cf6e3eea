//! File inspection.
//!
//! Turns a path into a [`FileSnapshot`]: metadata first, then content.
//! The two reads are not atomic with respect to writers; see
//! [`FileSnapshot`] for what that means for consumers.

use crate::checksum::Checksummer;
use crate::error::{FileError, Result};
use crate::record::{FileSnapshot, FileStat};
use std::fs;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Converts a timestamp to whole seconds since the epoch.
///
/// Sub-second precision is dropped so that records compare equal across
/// filesystems with different timestamp resolution.
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        // Pre-epoch mtimes: round toward negative infinity
        Err(e) => {
            let d = e.duration();
            let secs = -(d.as_secs() as i64);
            if d.subsec_nanos() > 0 {
                secs - 1
            } else {
                secs
            }
        }
    }
}

/// Reads size and modification time without touching the content.
pub fn stat_file(path: &Path) -> Result<FileStat> {
    let meta = fs::metadata(path).map_err(|e| FileError::io(path, e))?;
    if !meta.is_file() {
        return Err(FileError::NotAFile(path.to_path_buf()));
    }
    let modified = meta.modified().map_err(|e| FileError::io(path, e))?;

    Ok(FileStat {
        size: meta.len(),
        modified: unix_seconds(modified),
    })
}

/// Produces a full snapshot of `path`: size, mtime and checksum.
pub fn inspect_file(path: &Path, checksummer: &dyn Checksummer) -> Result<FileSnapshot> {
    let stat = stat_file(path)?;
    let checksum = checksummer.checksum_file(path)?;

    Ok(FileSnapshot {
        path: path.to_path_buf(),
        size: stat.size,
        modified: stat.modified,
        checksum,
    })
}
