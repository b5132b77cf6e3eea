//! Service lifecycle.
//!
//! [`SyncService`] owns the watcher, the event worker and (through the
//! engine) the record store. `start` brings them up in order and
//! `shutdown` tears them down; both leave nothing half-open on failure.

use crate::config::SyncConfig;
use crate::engine::{ChangeEvent, SyncEngine, SyncReport};
use crate::error::{Result, SyncError};
use crate::watcher::{FileWatcher, WatchEvent};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use treesync_store::{RecordStore, SledStore};

pub struct SyncService<S: RecordStore + 'static> {
    engine: Arc<SyncEngine<S>>,
    report: SyncReport,
    watcher: Option<FileWatcher>,
    stop: Option<watch::Sender<bool>>,
    worker: Option<JoinHandle<()>>,
}

impl SyncService<SledStore> {
    /// Opens the sled store named by the config and starts syncing.
    pub async fn start(config: SyncConfig) -> Result<Self> {
        let config = config.validate()?;
        let store = SledStore::open(config.store_path())?;
        Self::start_with_store(config, store).await
    }
}

impl<S: RecordStore + 'static> SyncService<S> {
    /// Runs a full sync, then handles watch events until shutdown.
    ///
    /// The watcher is armed before the scan so nothing that happens
    /// during it is lost; those events are queued and only handled once
    /// the scan has finished. Fails, with the store closed, if the root
    /// is unusable or the sync fails.
    pub async fn start_with_store(config: SyncConfig, store: S) -> Result<Self> {
        let config = config.validate()?;
        let engine = Arc::new(SyncEngine::new(&config, store)?);

        let (watcher, events) = match FileWatcher::new(engine.rules()) {
            Ok(pair) => pair,
            Err(e) => {
                close_quietly(engine.store());
                return Err(e.into());
            }
        };

        let report = match engine.perform_initial_sync().await {
            Ok(report) => report,
            Err(e) => {
                drop(watcher);
                close_quietly(engine.store());
                return Err(e);
            }
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = tokio::spawn(run_worker(Arc::clone(&engine), events, stop_rx));

        info!("Tracking {}", engine.root().display());

        Ok(Self {
            engine,
            report,
            watcher: Some(watcher),
            stop: Some(stop_tx),
            worker: Some(worker),
        })
    }

    pub fn engine(&self) -> &Arc<SyncEngine<S>> {
        &self.engine
    }

    /// Report of the full sync performed at startup.
    pub fn initial_report(&self) -> &SyncReport {
        &self.report
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.engine.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stops watching, lets the event in flight finish and closes the
    /// store. Calling it again does nothing.
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            debug!("Watcher released");
        }
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(true);
        }
        let joined = match self.worker.take() {
            Some(worker) => worker.await.map_err(SyncError::from),
            None => Ok(()),
        };
        // A crashed worker must not leave the store open
        let closed = self.engine.store().close();
        if let Err(e) = &joined {
            warn!("Event worker failed: {}", e);
        }
        joined?;
        closed?;
        info!("Stopped tracking {}", self.engine.root().display());
        Ok(())
    }
}

/// Single consumer: one event at a time, in arrival order.
async fn run_worker<S: RecordStore>(
    engine: Arc<SyncEngine<S>>,
    mut events: UnboundedReceiver<WatchEvent>,
    mut stop: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop.changed() => break,
            event = events.recv() => match event {
                Some(event) => engine.handle_event(event).await,
                None => break,
            },
        }
    }
    debug!("Event worker stopped");
}

fn close_quietly<S: RecordStore>(store: &S) {
    if let Err(e) = store.close() {
        warn!("Failed to close record store: {}", e);
    }
}
