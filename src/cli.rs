//! Command-line interface for tidywatch.
//!
//! Parses arguments, loads settings, builds the components and runs one of
//! the four commands. All user-facing text goes through [`OutputFormatter`].

use crate::config::Settings;
use crate::destination::DestinationResolver;
use crate::disposal::{HoldingArea, ReversibleDelete, SystemTrash};
use crate::file_organizer::{FileOrganizer, MoveOutcome, OrganizeError};
use crate::output::OutputFormatter;
use crate::retention::RetentionSweeper;
use crate::watcher::{Dispatcher, EventFilter, RootWatcher};
use crate::worker_pool::WorkerPool;
use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use crossbeam::channel::{self, Receiver};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};

/// tidywatch - keeps a downloads folder sorted by year and category
#[derive(Debug, Parser)]
#[command(name = "tidywatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Sorts new arrivals into dated category folders and sweeps old ones")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Use alternate config file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Watch a directory and organize everything that lands in it
    Watch {
        /// Directory to watch (defaults to watch.root from the config)
        root: Option<PathBuf>,

        /// Skip organizing what is already in the directory
        #[arg(long)]
        no_initial_pass: bool,
    },

    /// Organize the current contents of a directory once
    Organize {
        /// Directory to organize (defaults to watch.root from the config)
        root: Option<PathBuf>,

        /// Show what would be moved without moving anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove old entries from the category folders
    Sweep {
        /// Directory to sweep (defaults to watch.root from the config)
        root: Option<PathBuf>,

        /// Maximum age in days (defaults to retention.max_age_days)
        #[arg(long, value_name = "N")]
        days: Option<u64>,

        /// Show what would be removed without removing anything
        #[arg(long)]
        dry_run: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the category of each path
    Classify {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

/// Runs the parsed command line.
///
/// # Errors
///
/// Returns an error if the settings are invalid, the root cannot be used, or
/// a one-shot command finished with per-item failures.
pub fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref()).context("Error loading configuration")?;
    settings.validate().context("Invalid configuration")?;

    match cli.command {
        Command::Watch {
            root,
            no_initial_pass,
        } => {
            let root = resolve_root(root, &settings)?;
            watch(&root, &settings, !no_initial_pass && settings.watch.organize_existing)
        }
        Command::Organize { root, dry_run } => {
            let root = resolve_root(root, &settings)?;
            if dry_run {
                organize_dry_run(&root, &settings)
            } else {
                organize(&root, &settings)
            }
        }
        Command::Sweep {
            root,
            days,
            dry_run,
            json,
        } => {
            let root = resolve_root(root, &settings)?;
            let days = days.unwrap_or(settings.retention.max_age_days);
            sweep(&root, &settings, days, dry_run, json)
        }
        Command::Classify { paths } => classify(&paths, &settings),
    }
}

/// The root argument wins over `watch.root`. The result is canonical so that
/// it compares equal to the paths in notifications.
fn resolve_root(arg: Option<PathBuf>, settings: &Settings) -> Result<PathBuf> {
    let Some(root) = arg.or_else(|| settings.watch.root.clone()) else {
        bail!("No directory given and watch.root is not set in the configuration");
    };
    let root = fs::canonicalize(&root)
        .with_context(|| format!("Cannot access directory {}", root.display()))?;
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    Ok(root)
}

fn build_organizer(root: &Path, settings: &Settings) -> Result<FileOrganizer> {
    let mapper = settings.file_mapper()?;
    Ok(FileOrganizer::new(
        DestinationResolver::new(root, mapper),
        settings.stability_gate(),
    ))
}

fn build_disposer(settings: &Settings) -> Box<dyn ReversibleDelete> {
    match &settings.retention.holding_area {
        Some(dir) => Box::new(HoldingArea::new(dir)),
        None => Box::new(SystemTrash),
    }
}

fn watch(root: &Path, settings: &Settings, initial_pass: bool) -> Result<()> {
    let organizer = build_organizer(root, settings)?;
    let filters = settings.compile_filters()?;
    let dispatcher = Dispatcher::new(root, filters, organizer, settings.watch.workers)?;

    // Dropping the sender disconnects every receiver at once.
    let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
    let mut shutdown_tx = Some(shutdown_tx);
    ctrlc::set_handler(move || {
        shutdown_tx.take();
    })
    .context("Failed to install Ctrl-C handler")?;

    let watcher = RootWatcher::subscribe(root)?;
    if initial_pass {
        let queued = dispatcher.dispatch_existing()?;
        if queued > 0 {
            OutputFormatter::info(&format!("Organizing {queued} existing entries"));
        }
    }

    let sweeper = match settings.sweep_interval() {
        Some(interval) => Some(spawn_scheduled_sweep(
            root.to_path_buf(),
            settings.retention.max_age_days,
            interval,
            build_disposer(settings),
            shutdown_rx.clone(),
        )?),
        None => None,
    };

    OutputFormatter::info(&format!("Watching {} (Ctrl-C to stop)", root.display()));
    watcher.run_until(dispatcher, shutdown_rx);

    if let Some(handle) = sweeper
        && handle.join().is_err()
    {
        warn!("scheduled sweep thread panicked");
    }
    OutputFormatter::success("Stopped");
    Ok(())
}

/// Sweeps `root` every `interval` until `shutdown` disconnects. The first
/// pass runs right away.
fn spawn_scheduled_sweep(
    root: PathBuf,
    max_age_days: u64,
    interval: Duration,
    disposer: Box<dyn ReversibleDelete>,
    shutdown: Receiver<()>,
) -> Result<JoinHandle<()>> {
    let sweeper = RetentionSweeper::new(disposer);
    let ticker = channel::tick(interval);
    let handle = thread::Builder::new()
        .name("tidywatch-sweep".to_string())
        .spawn(move || {
            loop {
                match sweeper.sweep(&root, max_age_days) {
                    Ok(report) => info!(
                        trashed = report.trashed_items.len(),
                        pruned = report.pruned_dirs.len(),
                        failures = report.failures.len(),
                        "scheduled sweep finished"
                    ),
                    Err(e) => warn!(error = %e, "scheduled sweep failed"),
                }
                channel::select! {
                    recv(ticker) -> _ => {}
                    recv(shutdown) -> _ => break,
                }
            }
        })
        .context("Failed to start sweep thread")?;
    Ok(handle)
}

fn organize(root: &Path, settings: &Settings) -> Result<()> {
    let organizer = build_organizer(root, settings)?;
    let filter = EventFilter::new(root, settings.compile_filters()?);
    let entries = filter.existing_entries()?;

    OutputFormatter::info(&format!("Organizing contents of: {}", root.display()));
    if entries.is_empty() {
        OutputFormatter::info("Nothing to organize.");
        return Ok(());
    }

    let (tx, rx) = channel::unbounded::<(PathBuf, Result<MoveOutcome, OrganizeError>)>();
    let pool = WorkerPool::new(settings.watch.workers, move |path: PathBuf| {
        let result = organizer.organize(&path);
        let _ = tx.send((path, result));
    })
    .context("Failed to start worker pool")?;

    let progress = OutputFormatter::spinner("Waiting for entries to settle");
    for path in entries {
        if pool.submit(path).is_err() {
            bail!("Worker pool closed unexpectedly");
        }
    }
    pool.drain();
    progress.finish_and_clear();

    let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut moved = 0;
    let mut failed = 0;
    for (path, result) in rx.try_iter() {
        match result {
            Ok(outcome) => {
                let note = if outcome.renamed { " (renamed)" } else { "" };
                OutputFormatter::success(&format!(
                    "{} -> {}{}",
                    path.display(),
                    outcome.category,
                    note
                ));
                info!(from = %path.display(), to = %outcome.new_path.display(), "organized");
                *category_counts.entry(outcome.category.to_string()).or_insert(0) += 1;
                moved += 1;
            }
            Err(e) => {
                OutputFormatter::error(&e.to_string());
                failed += 1;
            }
        }
    }

    OutputFormatter::summary_table(&category_counts, moved);
    if failed > 0 {
        bail!("{failed} entries could not be organized");
    }
    Ok(())
}

fn organize_dry_run(root: &Path, settings: &Settings) -> Result<()> {
    let organizer = build_organizer(root, settings)?;
    let filter = EventFilter::new(root, settings.compile_filters()?);

    OutputFormatter::dry_run_notice(&format!("Organizing contents of: {}", root.display()));
    let mut category_counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut planned = 0;
    for path in filter.existing_entries()? {
        match organizer.plan(&path) {
            Ok(plan) => {
                let dest = plan
                    .destination_dir
                    .strip_prefix(root)
                    .unwrap_or(plan.destination_dir.as_path());
                OutputFormatter::dry_run_notice(&format!(
                    "Would move {} to {}",
                    path.display(),
                    dest.display()
                ));
                *category_counts.entry(plan.category.to_string()).or_insert(0) += 1;
                planned += 1;
            }
            Err(e) => OutputFormatter::warning(&e.to_string()),
        }
    }

    OutputFormatter::summary_table(&category_counts, planned);
    OutputFormatter::dry_run_notice("No files were moved");
    Ok(())
}

fn sweep(root: &Path, settings: &Settings, days: u64, dry_run: bool, json: bool) -> Result<()> {
    let sweeper = RetentionSweeper::new(build_disposer(settings));

    if dry_run {
        let plan = sweeper.plan_at(root, days, SystemTime::now())?;
        if json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            OutputFormatter::sweep_plan(root, &plan);
        }
        return Ok(());
    }

    let report = if json {
        sweeper.sweep(root, days)?
    } else {
        let progress = OutputFormatter::spinner(&format!("Sweeping {}", root.display()));
        let report = sweeper.sweep(root, days);
        progress.finish_and_clear();
        report?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        OutputFormatter::sweep_report(root, &report);
    }
    if !report.failures.is_empty() {
        bail!("{} entries could not be removed", report.failures.len());
    }
    Ok(())
}

fn classify(paths: &[PathBuf], settings: &Settings) -> Result<()> {
    let mapper = settings.file_mapper()?;
    let resolver = settings
        .watch
        .root
        .as_ref()
        .map(|root| DestinationResolver::new(root, mapper.clone()));

    for path in paths {
        let category = mapper.classify_name(path, path.is_dir());
        let destination = resolver
            .as_ref()
            .filter(|_| path.exists())
            .and_then(|r| r.resolve_with(path, category).ok());
        match destination {
            Some(dest) => OutputFormatter::plain(&format!(
                "{}: {} -> {}",
                path.display(),
                category,
                dest.display()
            )),
            None => OutputFormatter::plain(&format!("{}: {}", path.display(), category)),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_sweep_arguments() {
        let cli = Cli::try_parse_from([
            "tidywatch", "-vv", "sweep", "/tmp/dl", "--days", "7", "--dry-run", "--json",
        ])
        .expect("Failed to parse");
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Sweep {
                root,
                days,
                dry_run,
                json,
            } => {
                assert_eq!(root, Some(PathBuf::from("/tmp/dl")));
                assert_eq!(days, Some(7));
                assert!(dry_run);
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_classify_requires_a_path() {
        assert!(Cli::try_parse_from(["tidywatch", "classify"]).is_err());
    }

    #[test]
    fn test_config_flag_is_global() {
        let cli = Cli::try_parse_from(["tidywatch", "watch", "--config", "/etc/tw.toml"])
            .expect("Failed to parse");
        assert_eq!(cli.config, Some(PathBuf::from("/etc/tw.toml")));
        assert!(matches!(
            cli.command,
            Command::Watch {
                root: None,
                no_initial_pass: false
            }
        ));
    }

    #[test]
    fn test_resolve_root_prefers_argument() {
        let arg_dir = TempDir::new().expect("Failed to create temp directory");
        let cfg_dir = TempDir::new().expect("Failed to create temp directory");
        let mut settings = Settings::default();
        settings.watch.root = Some(cfg_dir.path().to_path_buf());

        let root = resolve_root(Some(arg_dir.path().to_path_buf()), &settings)
            .expect("Failed to resolve root");
        assert_eq!(
            root,
            fs::canonicalize(arg_dir.path()).expect("Failed to canonicalize")
        );

        let root = resolve_root(None, &settings).expect("Failed to resolve root");
        assert_eq!(
            root,
            fs::canonicalize(cfg_dir.path()).expect("Failed to canonicalize")
        );
    }

    #[test]
    fn test_resolve_root_without_any_root_fails() {
        assert!(resolve_root(None, &Settings::default()).is_err());
    }
}
