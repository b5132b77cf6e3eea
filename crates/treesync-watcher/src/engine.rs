//! Reconciliation engine.
//!
//! Keeps the record store in step with the directory tree. A full sync
//! compares everything on disk with everything stored; incremental
//! handlers apply the single-file version of the same decision in
//! response to watch events. Both go through `snapshot_if_changed`, which
//! pairs [`detect_change`] with [`inspect_file`], so there is one
//! definition of "changed".

use crate::config::SyncConfig;
use crate::detector::detect_change;
use crate::error::Result;
use crate::filter::IgnoreRules;
use crate::scanner::Scanner;
use crate::watcher::WatchEvent;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use treesync_core::{inspect_file, Checksummer, FileError, FileRecord, FileSnapshot, Sha256Checksum};
use treesync_store::{RecordStore, StoreError};

const CHANGE_CHANNEL_CAPACITY: usize = 1024;

/// A mutation applied to the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Added(FileRecord),
    Updated(FileRecord),
    Removed(PathBuf),
}

/// Result of a full sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Files found on disk.
    pub scanned: usize,
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    /// Stale records deleted.
    pub removed: usize,
    pub duration_ms: u64,
}

impl SyncReport {
    /// True when the pass did not touch the store.
    pub fn is_noop(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Per-file decision made during a full sync.
enum Plan {
    Insert(FileSnapshot),
    Update(FileSnapshot),
    Keep,
}

pub struct SyncEngine<S: RecordStore> {
    root: PathBuf,
    store: S,
    checksummer: Arc<dyn Checksummer>,
    scanner: Scanner,
    settle_delay: Duration,
    scan_concurrency: usize,
    changes: broadcast::Sender<ChangeEvent>,
}

impl<S: RecordStore> SyncEngine<S> {
    /// Creates an engine for a validated config (see [`SyncConfig::validate`]).
    pub fn new(config: &SyncConfig, store: S) -> Result<Self> {
        let rules = Arc::new(IgnoreRules::from_config(config)?);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);

        Ok(Self {
            root: config.root.clone(),
            store,
            checksummer: Arc::new(Sha256Checksum),
            scanner: Scanner::new(rules, config.follow_symlinks),
            settle_delay: config.settle_delay(),
            scan_concurrency: config.scan_concurrency.max(1),
            changes,
        })
    }

    /// Swaps the digest algorithm. Existing records keep their old
    /// checksums, so the next full sync will update every file.
    pub fn with_checksummer(mut self, checksummer: Arc<dyn Checksummer>) -> Self {
        self.checksummer = checksummer;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn rules(&self) -> Arc<IgnoreRules> {
        Arc::clone(self.scanner.rules())
    }

    /// Stream of every store mutation the engine makes.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    /// Reconciles the store with the whole directory tree.
    ///
    /// New files are inserted, changed files updated and records for
    /// missing files deleted. Deletions only run once every file has been
    /// decided. Any error aborts the pass.
    pub async fn perform_initial_sync(&self) -> Result<SyncReport> {
        let start = Instant::now();
        info!("Starting full sync of {}", self.root.display());

        let scanner = self.scanner.clone();
        let root = self.root.clone();
        let current = tokio::task::spawn_blocking(move || scanner.scan(&root)).await??;

        let mut stored: HashMap<PathBuf, FileRecord> = self
            .store
            .list_all()?
            .into_iter()
            .map(|record| (record.path.clone(), record))
            .collect();

        let mut report = SyncReport {
            scanned: current.len(),
            ..SyncReport::default()
        };

        // Whatever is left in `stored` afterwards no longer exists on disk
        let work: Vec<(PathBuf, Option<FileRecord>)> = current
            .into_iter()
            .map(|path| {
                let previous = stored.remove(&path);
                (path, previous)
            })
            .collect();

        for plan in self.plan_all(work).await? {
            match plan {
                Plan::Insert(snapshot) => {
                    let record = self.store.insert(snapshot)?;
                    debug!("Added {}", record.path.display());
                    self.emit(ChangeEvent::Added(record));
                    report.inserted += 1;
                }
                Plan::Update(snapshot) => {
                    let record = self.store.update(snapshot)?;
                    debug!("Updated {}", record.path.display());
                    self.emit(ChangeEvent::Updated(record));
                    report.updated += 1;
                }
                Plan::Keep => report.unchanged += 1,
            }
        }

        for path in stored.into_keys() {
            if self.store.delete(&path)? {
                debug!("Removed {}", path.display());
                self.emit(ChangeEvent::Removed(path));
                report.removed += 1;
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Synced {} files: {} added, {} updated, {} removed, {} unchanged in {}ms",
            report.scanned,
            report.inserted,
            report.updated,
            report.removed,
            report.unchanged,
            report.duration_ms
        );
        Ok(report)
    }

    /// Inspects files across `scan_concurrency` blocking workers and
    /// waits for every decision before returning.
    async fn plan_all(&self, work: Vec<(PathBuf, Option<FileRecord>)>) -> Result<Vec<Plan>> {
        let total = work.len();
        let mut buckets: Vec<Vec<(PathBuf, Option<FileRecord>)>> =
            (0..self.scan_concurrency.min(total.max(1))).map(|_| Vec::new()).collect();
        let bucket_count = buckets.len();
        for (i, item) in work.into_iter().enumerate() {
            buckets[i % bucket_count].push(item);
        }

        let mut tasks = JoinSet::new();
        for bucket in buckets.into_iter().filter(|b| !b.is_empty()) {
            let checksummer = Arc::clone(&self.checksummer);
            tasks.spawn_blocking(move || {
                bucket
                    .into_iter()
                    .map(|(path, previous)| plan_file(path, previous, checksummer.as_ref()))
                    .collect::<std::result::Result<Vec<_>, FileError>>()
            });
        }

        let mut plans = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next().await {
            plans.extend(joined??);
        }
        Ok(plans)
    }

    /// Dispatches one watch event. Failures are logged, never returned.
    pub async fn handle_event(&self, event: WatchEvent) {
        match event {
            WatchEvent::Add(path) | WatchEvent::Change(path) => {
                self.handle_add_or_change(&path).await
            }
            WatchEvent::Remove(path) => self.handle_remove(&path).await,
            WatchEvent::Error(message) => warn!("Watch error: {}", message),
        }
    }

    /// Best-effort upsert for a created or modified path.
    ///
    /// Waits the settle delay, then runs the change detector against the
    /// stored record. A changed file has its record updated, or inserted
    /// if none exists; an unchanged file is left alone. Symlinks are
    /// skipped unless links are followed. Errors drop the event; the next
    /// full sync is the backstop.
    pub async fn handle_add_or_change(&self, path: &Path) {
        match self.try_add_or_change(path).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                debug!("{} vanished before it could be read", path.display());
            }
            Err(e) => warn!("Dropping event for {}: {}", path.display(), e),
        }
    }

    /// Fallible half of [`handle_add_or_change`](Self::handle_add_or_change).
    /// Returns the mutations applied.
    pub async fn try_add_or_change(&self, path: &Path) -> Result<Vec<ChangeEvent>> {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        // Same link policy as the full scan, or the two would disagree on
        // which files exist
        let is_link = tokio::fs::symlink_metadata(path)
            .await
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);
        if is_link && !self.scanner.follows_symlinks() {
            debug!("Skipping symlink {}", path.display());
            // The path may have been a tracked file or directory before
            let removed = self.remove_records(path)?;
            return Ok(removed.into_iter().map(ChangeEvent::Removed).collect());
        }

        let is_dir = tokio::fs::metadata(path)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false);

        if !is_dir {
            return Ok(self.refresh(path.to_path_buf()).await?.into_iter().collect());
        }

        // A directory appeared in one go (moved in, extracted, ...); its
        // files produce no events of their own
        let scanner = self.scanner.clone();
        let dir = path.to_path_buf();
        let files = tokio::task::spawn_blocking(move || scanner.scan(&dir)).await??;
        debug!("New directory {} with {} files", path.display(), files.len());

        let mut applied = Vec::with_capacity(files.len());
        for file in files {
            applied.extend(self.refresh(file).await?);
        }
        Ok(applied)
    }

    /// Runs the change detector against the stored record and writes only
    /// when the file differs. Returns `None` for an unchanged file.
    async fn refresh(&self, path: PathBuf) -> Result<Option<ChangeEvent>> {
        let previous = self.store.get(&path)?;
        let checksummer = Arc::clone(&self.checksummer);
        let snapshot = tokio::task::spawn_blocking(move || {
            snapshot_if_changed(&path, previous.as_ref(), checksummer.as_ref())
        })
        .await??;

        match snapshot {
            Some(snapshot) => Ok(Some(self.upsert(snapshot)?)),
            None => Ok(None),
        }
    }

    /// Update first, insert only when the store says there is no record.
    /// Any other update failure is a real error.
    fn upsert(&self, snapshot: FileSnapshot) -> Result<ChangeEvent> {
        let event = match self.store.update(snapshot.clone()) {
            Ok(record) => {
                debug!("Updated {}", record.path.display());
                ChangeEvent::Updated(record)
            }
            Err(StoreError::NotFound(_)) => {
                let record = self.store.insert(snapshot)?;
                debug!("Added {}", record.path.display());
                ChangeEvent::Added(record)
            }
            Err(e) => return Err(e.into()),
        };
        self.emit(event.clone());
        Ok(event)
    }

    /// Deletes the record for a removed path. Unknown paths are a no-op.
    pub async fn handle_remove(&self, path: &Path) {
        if let Err(e) = self.try_remove(path) {
            warn!("Dropping removal of {}: {}", path.display(), e);
        }
    }

    /// Fallible half of [`handle_remove`](Self::handle_remove). Returns
    /// the number of records deleted.
    ///
    /// A path with no record of its own may be a directory that was
    /// deleted or moved away, so records beneath it are removed too.
    pub fn try_remove(&self, path: &Path) -> Result<usize> {
        Ok(self.remove_records(path)?.len())
    }

    fn remove_records(&self, path: &Path) -> Result<Vec<PathBuf>> {
        if self.store.delete(path)? {
            debug!("Removed {}", path.display());
            self.emit(ChangeEvent::Removed(path.to_path_buf()));
            return Ok(vec![path.to_path_buf()]);
        }

        let mut removed = Vec::new();
        for record in self.store.list_under(path)? {
            if self.store.delete(&record.path)? {
                debug!("Removed {}", record.path.display());
                self.emit(ChangeEvent::Removed(record.path.clone()));
                removed.push(record.path);
            }
        }
        Ok(removed)
    }

    fn emit(&self, event: ChangeEvent) {
        // No subscribers is fine
        let _ = self.changes.send(event);
    }
}

fn plan_file(
    path: PathBuf,
    previous: Option<FileRecord>,
    checksummer: &dyn Checksummer,
) -> std::result::Result<Plan, FileError> {
    let is_new = previous.is_none();
    Ok(
        match snapshot_if_changed(&path, previous.as_ref(), checksummer)? {
            Some(snapshot) if is_new => Plan::Insert(snapshot),
            Some(snapshot) => Plan::Update(snapshot),
            None => Plan::Keep,
        },
    )
}

/// The per-file decision shared by full sync and event handling: a fresh
/// snapshot when the file is new or differs from `previous`, `None` when
/// it is unchanged.
fn snapshot_if_changed(
    path: &Path,
    previous: Option<&FileRecord>,
    checksummer: &dyn Checksummer,
) -> std::result::Result<Option<FileSnapshot>, FileError> {
    let record = match previous {
        Some(record) => record,
        None => return inspect_file(path, checksummer).map(Some),
    };

    let verdict = detect_change(path, record, checksummer);
    if !verdict.is_changed() {
        return Ok(None);
    }
    debug!("{} changed ({:?})", path.display(), verdict);

    match verdict.into_snapshot() {
        Some(snapshot) => Ok(Some(snapshot)),
        None => inspect_file(path, checksummer).map(Some),
    }
}
