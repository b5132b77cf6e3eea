//! Ignore rules shared by the scanner and the watcher.
//!
//! Both sides must agree on which files exist, otherwise a full sync
//! and the event stream would track different sets.

use crate::config::{SyncConfig, CONFIG_DIR};
use crate::error::{Result, SyncError};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct IgnoreRules {
    root: PathBuf,
    ignore_hidden: bool,
    patterns: Gitignore,
    /// Always skipped, whatever the other rules say.
    excluded: Vec<PathBuf>,
}

impl IgnoreRules {
    pub fn new(
        root: &Path,
        ignore_hidden: bool,
        patterns: &[String],
        excluded: Vec<PathBuf>,
    ) -> Result<Self> {
        let mut builder = GitignoreBuilder::new(root);
        for pattern in patterns {
            builder.add_line(None, pattern).map_err(SyncError::Pattern)?;
        }
        let patterns = builder.build().map_err(SyncError::Pattern)?;

        Ok(Self {
            root: root.to_path_buf(),
            ignore_hidden,
            patterns,
            excluded,
        })
    }

    /// Rules for a validated config. Treesync's own directory and the
    /// record store are excluded so the engine never tracks itself.
    pub fn from_config(config: &SyncConfig) -> Result<Self> {
        let excluded = vec![config.root.join(CONFIG_DIR), config.store_path()];
        Self::new(
            &config.root,
            config.ignore_hidden,
            &config.ignore_patterns,
            excluded,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `path` should be left alone. Paths outside the root are
    /// always ignored.
    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        let relative = match path.strip_prefix(&self.root) {
            Ok(rel) => rel,
            Err(_) => return true,
        };
        if relative.as_os_str().is_empty() {
            return false;
        }

        if self.excluded.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }

        if self.ignore_hidden && relative.components().any(is_hidden) {
            return true;
        }

        self.patterns
            .matched_path_or_any_parents(relative, is_dir)
            .is_ignore()
    }
}

fn is_hidden(component: Component<'_>) -> bool {
    match component {
        Component::Normal(name) => name.to_string_lossy().starts_with('.'),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(hidden: bool, patterns: &[&str]) -> IgnoreRules {
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        IgnoreRules::new(
            Path::new("/srv/data"),
            hidden,
            &patterns,
            vec![PathBuf::from("/srv/data/.treesync")],
        )
        .unwrap()
    }

    #[test]
    fn test_hidden_files_ignored_by_default() {
        let rules = rules(true, &[]);
        assert!(rules.is_ignored(Path::new("/srv/data/.env"), false));
        assert!(rules.is_ignored(Path::new("/srv/data/.git/config"), false));
        assert!(!rules.is_ignored(Path::new("/srv/data/notes.txt"), false));
    }

    #[test]
    fn test_hidden_files_can_be_included() {
        let rules = rules(false, &[]);
        assert!(!rules.is_ignored(Path::new("/srv/data/.env"), false));
        // Our own directory stays excluded
        assert!(rules.is_ignored(Path::new("/srv/data/.treesync/db/conf"), false));
    }

    #[test]
    fn test_patterns_match_files_and_parents() {
        let rules = rules(true, &["*.tmp", "build/"]);
        assert!(rules.is_ignored(Path::new("/srv/data/a/b.tmp"), false));
        assert!(rules.is_ignored(Path::new("/srv/data/build/out.bin"), false));
        assert!(!rules.is_ignored(Path::new("/srv/data/src/main.rs"), false));
    }

    #[test]
    fn test_outside_root_is_ignored() {
        let rules = rules(false, &[]);
        assert!(rules.is_ignored(Path::new("/etc/passwd"), false));
        assert!(!rules.is_ignored(Path::new("/srv/data"), true));
    }

    #[test]
    fn test_bad_pattern_is_rejected() {
        let err = IgnoreRules::new(Path::new("/srv"), true, &["a[".to_string()], vec![]);
        assert!(matches!(err, Err(SyncError::Pattern(_))));
    }
}
