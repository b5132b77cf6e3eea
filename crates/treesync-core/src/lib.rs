//! Treesync Core - file records and snapshots
//!
//! This crate holds the pieces every other treesync crate agrees on:
//! what a tracked file looks like, how its content is checksummed,
//! and how a file on disk is turned into a snapshot.
//!
//! # Example
//!
//! ```no_run
//! use treesync_core::{inspect_file, Sha256Checksum};
//! use std::path::Path;
//!
//! let snapshot = inspect_file(Path::new("/srv/data/report.csv"), &Sha256Checksum).unwrap();
//! println!("{} bytes, sha256 {}", snapshot.size, snapshot.checksum);
//! ```

pub mod checksum;
pub mod error;
pub mod inspect;
pub mod record;

pub use checksum::{checksum_bytes, Checksummer, Sha256Checksum};
pub use error::{FileError, Result};
pub use inspect::{inspect_file, stat_file, unix_seconds};
pub use record::{FileRecord, FileSnapshot, FileStat};
