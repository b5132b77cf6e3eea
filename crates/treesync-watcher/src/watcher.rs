//! File watcher for real-time updates.
//!
//! Uses the notify crate to watch the root recursively and turns raw
//! notifications into add/change/remove events on a tokio channel.
//! There is exactly one consumer; events for a path arrive in the order
//! notify reported them.

use crate::filter::IgnoreRules;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tracing::{debug, info};

/// A filesystem change as seen by the sync engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Add(PathBuf),
    Change(PathBuf),
    Remove(PathBuf),
    /// The watch backend reported a problem. Informational only.
    Error(String),
}

/// Watches a directory tree for file changes.
///
/// Dropping the watcher stops notifications and closes the event channel
/// once the backend has shut down.
pub struct FileWatcher {
    _watcher: notify::RecommendedWatcher,
    root: PathBuf,
}

impl FileWatcher {
    /// Starts watching `rules.root()` and returns the event stream.
    ///
    /// Files that already exist are not reported; only changes made after
    /// this call are.
    pub fn new(
        rules: Arc<IgnoreRules>,
    ) -> Result<(Self, UnboundedReceiver<WatchEvent>), notify::Error> {
        let (tx, rx) = unbounded_channel();
        let root = rules.root().to_path_buf();

        let mut watcher =
            notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
                let events = match res {
                    Ok(event) => classify(event, &rules),
                    Err(e) => vec![WatchEvent::Error(e.to_string())],
                };
                for event in events {
                    debug!("Watch event: {:?}", event);
                    // Receiver gone means we are shutting down
                    if tx.send(event).is_err() {
                        break;
                    }
                }
            })?;

        watcher.watch(&root, RecursiveMode::Recursive)?;

        info!("Watching {} for changes", root.display());

        Ok((
            Self {
                _watcher: watcher,
                root,
            },
            rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Maps one notify event to zero or more watch events, dropping ignored
/// paths and directory-level modifications.
fn classify(event: Event, rules: &IgnoreRules) -> Vec<WatchEvent> {
    let mut out = Vec::new();

    match event.kind {
        EventKind::Create(_) => {
            out.extend(event.paths.into_iter().map(WatchEvent::Add));
        }
        EventKind::Remove(_) => {
            out.extend(event.paths.into_iter().map(WatchEvent::Remove));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            out.extend(event.paths.into_iter().map(WatchEvent::Remove));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            out.extend(event.paths.into_iter().map(WatchEvent::Add));
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if event.paths.len() == 2 => {
            let mut paths = event.paths.into_iter();
            if let (Some(from), Some(to)) = (paths.next(), paths.next()) {
                out.push(WatchEvent::Remove(from));
                out.push(WatchEvent::Add(to));
            }
        }
        EventKind::Modify(ModifyKind::Name(_)) => {
            // Backend could not tell which side of the rename this is
            out.extend(event.paths.into_iter().map(|path| {
                if path.exists() {
                    WatchEvent::Add(path)
                } else {
                    WatchEvent::Remove(path)
                }
            }));
        }
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => {
            for path in event.paths {
                if path.is_dir() {
                    continue;
                }
                if path.exists() {
                    out.push(WatchEvent::Change(path));
                } else {
                    out.push(WatchEvent::Remove(path));
                }
            }
        }
        EventKind::Access(_) => {}
    }

    out.retain(|event| match event {
        WatchEvent::Add(path) | WatchEvent::Change(path) | WatchEvent::Remove(path) => {
            !rules.is_ignored(path, path.is_dir())
        }
        WatchEvent::Error(_) => true,
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, RemoveKind};
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    fn rules(root: &Path) -> IgnoreRules {
        IgnoreRules::new(root, true, &["*.tmp".to_string()], vec![]).unwrap()
    }

    fn event<P: AsRef<Path>>(kind: EventKind, paths: &[P]) -> Event {
        let mut event = Event::new(kind);
        for path in paths {
            event = event.add_path(path.as_ref().to_path_buf());
        }
        event
    }

    #[test]
    fn test_classify_create_modify_remove() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let file = root.join("a.txt");
        fs::write(&file, "x").unwrap();
        let rules = rules(&root);

        assert_eq!(
            classify(event(EventKind::Create(CreateKind::File), &[&file]), &rules),
            vec![WatchEvent::Add(file.clone())]
        );
        assert_eq!(
            classify(
                event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &[&file]),
                &rules
            ),
            vec![WatchEvent::Change(file.clone())]
        );
        assert_eq!(
            classify(event(EventKind::Remove(RemoveKind::File), &[&file]), &rules),
            vec![WatchEvent::Remove(file.clone())]
        );
    }

    #[test]
    fn test_classify_rename_both() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let from = root.join("old.txt");
        let to = root.join("new.txt");

        let events = classify(
            event(EventKind::Modify(ModifyKind::Name(RenameMode::Both)), &[&from, &to]),
            &rules(&root),
        );
        assert_eq!(events, vec![WatchEvent::Remove(from), WatchEvent::Add(to)]);
    }

    #[test]
    fn test_classify_drops_ignored_and_access() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let rules = rules(&root);

        let hidden = root.join(".swap");
        let scratch = root.join("scratch.tmp");
        assert!(classify(event(EventKind::Create(CreateKind::File), &[&hidden]), &rules).is_empty());
        assert!(classify(event(EventKind::Create(CreateKind::File), &[&scratch]), &rules).is_empty());
        assert!(classify(
            event(EventKind::Access(notify::event::AccessKind::Any), &[&root.join("a.txt")]),
            &rules
        )
        .is_empty());
    }

    #[test]
    fn test_classify_skips_directory_modifications() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        fs::create_dir_all(root.join("sub")).unwrap();

        let events = classify(
            event(EventKind::Modify(ModifyKind::Any), &[&root.join("sub")]),
            &rules(&root),
        );
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_watcher_reports_new_file() {
        let dir = tempdir().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();
        let (_watcher, mut events) = FileWatcher::new(Arc::new(rules(&root))).unwrap();

        let file = root.join("created.txt");
        fs::write(&file, "hello").unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), async {
            while let Some(event) = events.recv().await {
                if let WatchEvent::Add(path) | WatchEvent::Change(path) = event {
                    if path == file {
                        return true;
                    }
                }
            }
            false
        })
        .await
        .unwrap_or(false);
        assert!(seen);
    }
}
