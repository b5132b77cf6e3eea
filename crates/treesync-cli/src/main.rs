//! Treesync CLI - keep a record of every file under a directory
//!
//! Entry point for running a one-off reconciliation, tracking a tree
//! live, or inspecting what the store currently holds.

use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "treesync")]
#[command(author = "Treesync Contributors")]
#[command(version)]
#[command(about = "Keeps a persistent record of every file in a directory tree", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Settings shared by commands that touch the tree. Flags override
/// `.treesync/config.json`.
#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Directory to sync (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Record store location
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Milliseconds to wait before reading a changed file
    #[arg(long)]
    pub settle_ms: Option<u64>,

    /// Track hidden files and directories too
    #[arg(long)]
    pub include_hidden: bool,

    /// Follow symbolic links while scanning
    #[arg(long)]
    pub follow_symlinks: bool,

    /// Extra gitignore-style pattern to skip (repeatable)
    #[arg(long = "ignore", value_name = "PATTERN")]
    pub ignore: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize treesync in a directory
    Init {
        /// Path to initialize (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Reconcile the store with the directory once and exit
    Sync {
        #[command(flatten)]
        args: SyncArgs,
    },

    /// Reconcile, then keep the store up to date until Ctrl-C
    Watch {
        #[command(flatten)]
        args: SyncArgs,
    },

    /// Show what the store currently tracks
    Status {
        /// Path to check (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Record store location
        #[arg(long)]
        store: Option<PathBuf>,

        /// List tracked files
        #[arg(long)]
        files: bool,

        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();

    let result = match cli.command {
        Commands::Init { path } => commands::init(&path),
        Commands::Sync { args } => commands::sync(&args).await,
        Commands::Watch { args } => commands::watch(&args).await,
        Commands::Status {
            path,
            store,
            files,
            json,
        } => commands::status(&path, store, files, json),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}
