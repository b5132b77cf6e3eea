//! CLI command implementations.

use crate::SyncArgs;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use treesync_core::FileRecord;
use treesync_store::{RecordStore, SledStore};
use treesync_watcher::{ChangeEvent, SyncConfig, SyncEngine, SyncReport, SyncService};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

/// Loads the directory's config and applies command-line overrides.
fn load_config(args: &SyncArgs) -> Result<SyncConfig> {
    let mut config = SyncConfig::load(&args.path)?;

    if let Some(store) = &args.store {
        config.store_path = Some(absolute(store)?);
    }
    if let Some(ms) = args.settle_ms {
        config.settle_delay_ms = ms;
    }
    if args.include_hidden {
        config.ignore_hidden = false;
    }
    if args.follow_symlinks {
        config.follow_symlinks = true;
    }
    config.ignore_patterns.extend(args.ignore.iter().cloned());

    let config = config.validate()?;
    debug!(
        "Using store {} with {} ignore patterns",
        config.store_path().display(),
        config.ignore_patterns.len()
    );
    Ok(config)
}

/// Command-line paths are relative to the working directory, not the root.
fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn spinner(message: &'static str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message);
    Ok(spinner)
}

/// Initialize treesync in a directory.
pub fn init(path: &Path) -> Result<()> {
    let config_file = SyncConfig::config_file(path);

    if config_file.exists() {
        println!("{} Already initialized", "✓".green());
        return Ok(());
    }

    SyncConfig::for_root(path).save()?;

    println!("{} Initialized treesync in {}", "✓".green(), path.display());
    println!("  Run {} to record the tree", "treesync sync".cyan());

    Ok(())
}

/// Reconcile once.
pub async fn sync(args: &SyncArgs) -> Result<()> {
    let config = load_config(args)?;
    let store = SledStore::open(config.store_path())?;
    let engine = SyncEngine::new(&config, store)?;

    println!("{}", "Syncing directory...".cyan());
    let spinner = spinner("Scanning files...")?;
    let result = engine.perform_initial_sync().await;
    spinner.finish_and_clear();

    engine.store().close()?;
    print_report(&result?);
    Ok(())
}

/// Reconcile, then track changes until interrupted.
pub async fn watch(args: &SyncArgs) -> Result<()> {
    let config = load_config(args)?;
    let root = config.root.clone();

    let spinner = spinner("Scanning files...")?;
    let started = SyncService::start(config).await;
    spinner.finish_and_clear();
    let mut service = started?;

    print_report(service.initial_report());
    println!(
        "{} Watching {} {}",
        "👀".cyan(),
        root.display(),
        "(Ctrl-C to stop)".dimmed()
    );

    let mut changes = service.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            change = changes.recv() => match change {
                Ok(change) => print_change(&root, &change),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Change feed lagged, {} changes not shown", missed);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    service.shutdown().await?;
    println!("{} Stopped", "✓".green());
    Ok(())
}

/// Show what the store tracks.
pub fn status(path: &Path, store: Option<PathBuf>, show_files: bool, json: bool) -> Result<()> {
    let mut config = SyncConfig::load(path)?;
    if let Some(store) = store {
        config.store_path = Some(absolute(&store)?);
    }
    let config = config.validate()?;
    let store_path = config.store_path();

    if !store_path.exists() {
        println!("{} Nothing recorded for this directory yet", "✗".red());
        println!("  Run {} first", "treesync sync".cyan());
        return Ok(());
    }

    let store = SledStore::open(&store_path)?;
    let mut records = store.list_all()?;
    store.close()?;
    records.sort_by(|a, b| a.path.cmp(&b.path));

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    let total_bytes: u64 = records.iter().map(|r| r.size).sum();
    let last_update = records.iter().map(|r| r.updated_at).max();

    println!("{}", "📊 Treesync Status".cyan().bold());
    println!();
    println!("  {} {}", "Root:".dimmed(), config.root.display());
    println!("  {} {}", "Store:".dimmed(), store_path.display());
    println!("  {} {}", "Files tracked:".dimmed(), records.len());
    println!("  {} {}", "Total size:".dimmed(), human_bytes(total_bytes));
    println!(
        "  {} {}",
        "Last change:".dimmed(),
        last_update
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "(never)".to_string())
    );

    if show_files {
        println!();
        println!("{}", "📁 Tracked Files".cyan().bold());
        for record in records.iter().take(50) {
            print_record(&config.root, record);
        }
        if records.len() > 50 {
            println!("  {} ... and {} more", "".dimmed(), records.len() - 50);
        }
    }

    Ok(())
}

fn print_report(report: &SyncReport) {
    println!(
        "{} Synced {} files in {}ms",
        "✓".green(),
        report.scanned.to_string().cyan(),
        report.duration_ms
    );
    if report.is_noop() {
        println!("  {}", "Store already up to date".dimmed());
        return;
    }
    println!(
        "  {} added, {} updated, {} removed, {} unchanged",
        report.inserted.to_string().green(),
        report.updated.to_string().yellow(),
        report.removed.to_string().red(),
        report.unchanged
    );
}

fn print_change(root: &Path, change: &ChangeEvent) {
    match change {
        ChangeEvent::Added(record) => {
            println!("{} {}", "+".green().bold(), display_path(root, &record.path))
        }
        ChangeEvent::Updated(record) => {
            println!("{} {}", "~".yellow().bold(), display_path(root, &record.path))
        }
        ChangeEvent::Removed(path) => {
            println!("{} {}", "-".red().bold(), display_path(root, path))
        }
    }
}

fn print_record(root: &Path, record: &FileRecord) {
    println!(
        "  {} {} {}",
        display_path(root, &record.path),
        human_bytes(record.size).dimmed(),
        record.checksum.get(..12).unwrap_or(record.checksum.as_str()).dimmed()
    );
}

fn display_path(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
