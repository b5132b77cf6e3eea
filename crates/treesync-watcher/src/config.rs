//! Sync configuration.
//!
//! Settings live in `<root>/.treesync/config.json`. Every key is
//! optional; missing keys fall back to the defaults below.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory holding treesync's own files, relative to the root.
pub const CONFIG_DIR: &str = ".treesync";
pub const CONFIG_FILE: &str = "config.json";

/// How long an add/change event waits before the file is read.
///
/// Editors often save in several writes; reading too early hashes a
/// half-written file. Longer delays mean fewer spurious updates but
/// slower detection.
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Directory to keep in sync. Never read from the config file.
    #[serde(skip)]
    pub root: PathBuf,

    /// Record store location. Relative paths resolve against `root`.
    /// Defaults to `.treesync/db`.
    pub store_path: Option<PathBuf>,

    pub settle_delay_ms: u64,

    /// Skip files and directories whose name starts with a dot.
    pub ignore_hidden: bool,

    /// Extra gitignore-style patterns, relative to `root`.
    pub ignore_patterns: Vec<String>,

    /// Follow symbolic links while scanning. Link cycles are skipped.
    pub follow_symlinks: bool,

    /// Number of files inspected in parallel during a full sync.
    pub scan_concurrency: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            store_path: None,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            ignore_hidden: true,
            ignore_patterns: Vec::new(),
            follow_symlinks: false,
            scan_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
        }
    }
}

impl SyncConfig {
    /// Default configuration for `root`.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Location of the config file for a given root.
    pub fn config_file(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Loads `<root>/.treesync/config.json`, or defaults if there is none.
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::config_file(root);
        if !path.exists() {
            return Ok(Self::for_root(root));
        }

        let text = fs::read_to_string(&path).map_err(|source| SyncError::ConfigFile {
            path: path.clone(),
            source,
        })?;
        let mut config: Self =
            serde_json::from_str(&text).map_err(|source| SyncError::ConfigParse { path, source })?;
        config.root = root.to_path_buf();
        Ok(config)
    }

    /// Writes this configuration to `<root>/.treesync/config.json`.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file(&self.root);
        let io_err = |source: std::io::Error| SyncError::ConfigFile {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|source| SyncError::ConfigParse {
            path: path.clone(),
            source,
        })?;
        fs::write(&path, text).map_err(io_err)?;
        Ok(path)
    }

    /// Checks the configuration and returns a normalized copy.
    ///
    /// The root is canonicalized and must be an existing directory; the
    /// store path is made absolute.
    pub fn validate(&self) -> Result<Self> {
        let root = fs::canonicalize(&self.root).map_err(|e| {
            SyncError::Config(format!(
                "watch root '{}' is not accessible: {}",
                self.root.display(),
                e
            ))
        })?;
        if !root.is_dir() {
            return Err(SyncError::Config(format!(
                "watch root '{}' is not a directory",
                root.display()
            )));
        }
        if self.scan_concurrency == 0 {
            return Err(SyncError::Config(
                "scan_concurrency must be at least 1".to_string(),
            ));
        }

        let mut config = self.clone();
        config.root = root;
        config.store_path = Some(config.store_path());
        Ok(config)
    }

    /// Absolute store location.
    pub fn store_path(&self) -> PathBuf {
        match &self.store_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => self.root.join(path),
            None => self.root.join(CONFIG_DIR).join("db"),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}
