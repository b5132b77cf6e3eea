//! Treesync Watcher - directory reconciliation and live tracking
//!
//! This crate keeps a record store in step with a directory tree:
//! - Scanning the tree and reconciling it against stored records
//! - Watching for changes
//! - Applying each change to the store as it happens
//!
//! Hidden files are skipped unless configured otherwise.
//!
//! # Example
//!
//! ```no_run
//! use treesync_watcher::{SyncConfig, SyncService};
//!
//! # async fn run() -> Result<(), treesync_watcher::SyncError> {
//! let mut service = SyncService::start(SyncConfig::for_root("/srv/data")).await?;
//! let mut changes = service.subscribe();
//! while let Ok(change) = changes.recv().await {
//!     println!("{:?}", change);
//! }
//! service.shutdown().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod detector;
mod engine;
mod error;
mod filter;
mod scanner;
mod service;
mod watcher;

pub use config::{SyncConfig, CONFIG_DIR, CONFIG_FILE, DEFAULT_SETTLE_DELAY_MS};
pub use detector::{detect_change, ChangeVerdict};
pub use engine::{ChangeEvent, SyncEngine, SyncReport};
pub use error::{Result, SyncError};
pub use filter::IgnoreRules;
pub use scanner::Scanner;
pub use service::SyncService;
pub use watcher::{FileWatcher, WatchEvent};
