//! Directory scanning.
//!
//! Enumerates every regular file under a directory. A scan either sees
//! the whole tree or fails: a partial file set would make the
//! reconciliation delete records for files that still exist.

use crate::error::{Result, SyncError};
use crate::filter::IgnoreRules;
use ignore::WalkBuilder;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct Scanner {
    rules: Arc<IgnoreRules>,
    follow_symlinks: bool,
}

impl Scanner {
    pub fn new(rules: Arc<IgnoreRules>, follow_symlinks: bool) -> Self {
        Self {
            rules,
            follow_symlinks,
        }
    }

    pub fn rules(&self) -> &Arc<IgnoreRules> {
        &self.rules
    }

    pub fn follows_symlinks(&self) -> bool {
        self.follow_symlinks
    }

    /// Returns the absolute paths of all regular files under `dir`.
    ///
    /// Symbolic links are only descended into when `follow_symlinks` is
    /// set; link cycles are skipped with a warning. Any other walk error
    /// aborts the scan.
    pub fn scan(&self, dir: &Path) -> Result<HashSet<PathBuf>> {
        let rules = Arc::clone(&self.rules);
        let walker = WalkBuilder::new(dir)
            .standard_filters(false) // Hidden files and patterns are handled by IgnoreRules
            .follow_links(self.follow_symlinks)
            .filter_entry(move |entry| {
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                !rules.is_ignored(entry.path(), is_dir)
            })
            .build();

        let mut files = HashSet::new();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if is_loop(&e) => {
                    warn!("Skipping symlink cycle: {}", e);
                    continue;
                }
                Err(source) => {
                    return Err(SyncError::Scan {
                        path: dir.to_path_buf(),
                        source,
                    })
                }
            };

            // With follow_links off, symlinks report their own type and are skipped
            if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                files.insert(entry.into_path());
            }
        }

        debug!("Scanned {}: {} files", dir.display(), files.len());
        Ok(files)
    }
}

fn is_loop(err: &ignore::Error) -> bool {
    match err {
        ignore::Error::Loop { .. } => true,
        ignore::Error::WithPath { err, .. }
        | ignore::Error::WithDepth { err, .. }
        | ignore::Error::WithLineNumber { err, .. } => is_loop(err),
        _ => false,
    }
}
