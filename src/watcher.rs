//! Watching the root and dispatching new arrivals.
//!
//! The OS notification stream is reduced to two event shapes, filtered, and
//! every surviving path becomes a [`MoveTask`] for the worker pool. The
//! dispatcher itself only enqueues.

use crate::config::CompiledFilters;
use crate::file_category::FolderTag;
use crate::file_organizer::{FileOrganizer, OrganizeError};
use crate::worker_pool::WorkerPool;
use crossbeam::channel::{self, Receiver};
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("Watched root {} is not a directory", .0.display())]
    NotADirectory(PathBuf),
    #[error("Failed to read watched root {}: {source}", .path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to start worker pool: {0}")]
    Pool(#[source] io::Error),
    #[error("Failed to subscribe to {}: {source}", .path.display())]
    Subscribe {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// One unit of move work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveTask {
    pub path: PathBuf,
}

/// The subset of notifications the dispatcher reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created {
        path: PathBuf,
        is_dir: bool,
    },
    /// `from` is `None` when the entry came from outside the watched scope.
    Renamed {
        from: Option<PathBuf>,
        to: PathBuf,
        is_dir: bool,
    },
}

impl WatchEvent {
    /// Reduces a `notify` event. Anything that is neither a creation nor the
    /// arriving side of a rename yields `None`.
    pub fn from_notify(event: &Event) -> Option<WatchEvent> {
        match event.kind {
            EventKind::Create(kind) => {
                let path = event.paths.first()?.clone();
                let is_dir = matches!(kind, CreateKind::Folder) || path.is_dir();
                Some(WatchEvent::Created { path, is_dir })
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let [from, to] = event.paths.as_slice() else {
                    return None;
                };
                Some(WatchEvent::Renamed {
                    from: Some(from.clone()),
                    is_dir: to.is_dir(),
                    to: to.clone(),
                })
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
                let to = event.paths.first()?.clone();
                Some(WatchEvent::Renamed {
                    from: None,
                    is_dir: to.is_dir(),
                    to,
                })
            }
            // FSEvents reports both sides of a rename as `Any`; only the side
            // that still exists is an arrival.
            EventKind::Modify(ModifyKind::Name(RenameMode::Any)) => {
                let to = event.paths.first()?.clone();
                fs::symlink_metadata(&to).ok()?;
                Some(WatchEvent::Renamed {
                    from: None,
                    is_dir: to.is_dir(),
                    to,
                })
            }
            _ => None,
        }
    }
}

/// Decides which events become move tasks.
#[derive(Debug, Clone)]
pub struct EventFilter {
    root: PathBuf,
    filters: CompiledFilters,
}

impl EventFilter {
    pub fn new(root: impl Into<PathBuf>, filters: CompiledFilters) -> Self {
        Self {
            root: root.into(),
            filters,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lists the entries already in the root that a creation event would
    /// have dispatched. Category folders are never listed.
    pub fn existing_entries(&self) -> Result<Vec<PathBuf>, WatchError> {
        let entries = fs::read_dir(&self.root).map_err(|e| WatchError::RootUnreadable {
            path: self.root.clone(),
            source: e,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
                if is_dir && FolderTag::from_path(&path).is_some() {
                    return None;
                }
                self.eligible(&WatchEvent::Created { path, is_dir })
            })
            .collect();
        paths.sort();
        Ok(paths)
    }

    /// Returns the path to organize, or `None` if the event is noise.
    pub fn eligible(&self, event: &WatchEvent) -> Option<PathBuf> {
        match event {
            WatchEvent::Created { path, is_dir } => self.arrival(path, *is_dir),
            WatchEvent::Renamed { from, to, is_dir } => {
                if let Some(from) = from
                    && !self.is_staged(from)
                {
                    return None;
                }
                self.arrival(to, *is_dir)
            }
        }
    }

    /// Checks the entry that appeared in the root.
    fn arrival(&self, path: &Path, is_dir: bool) -> Option<PathBuf> {
        if path.parent() != Some(self.root.as_path()) {
            return None;
        }
        if !self.filters.should_include(path) {
            return None;
        }
        if is_dir && FolderTag::from_path(path).is_some_and(|tag| tag.is_sentinel()) {
            return None;
        }
        Some(path.to_path_buf())
    }

    /// True if `from` looks like a download staging location: outside the
    /// root, or an in-progress artifact (or inside one). Entries leaving a
    /// category folder were put there by the user and stay out.
    fn is_staged(&self, from: &Path) -> bool {
        let Some(parent) = from.parent() else {
            return false;
        };
        if self.is_in_progress(from) || self.is_in_progress(parent) {
            return true;
        }
        if parent == self.root {
            return false;
        }
        !parent.starts_with(&self.root) || !self.inside_category(parent)
    }

    fn inside_category(&self, dir: &Path) -> bool {
        dir.strip_prefix(&self.root)
            .ok()
            .and_then(|rel| rel.components().next())
            .and_then(|first| FolderTag::from_name(&first.as_os_str().to_string_lossy()))
            .is_some()
    }

    fn is_in_progress(&self, path: &Path) -> bool {
        path.file_name()
            .is_some_and(|n| self.filters.is_in_progress(&n.to_string_lossy()))
    }
}

/// Remembered rename sources, by `notify` tracker.
///
/// inotify reports a rename inside the watched directory as `From`, then
/// `To`, then `Both` with the same tracker. Only the `Both` event carries the
/// source, so a `To` whose `From` was seen is left to it. A `To` without a
/// `From` came from outside the watch. Moves out of the root never get their
/// `To`, so only the most recent trackers are kept.
#[derive(Debug, Default)]
pub struct RenamePairing {
    pending: VecDeque<usize>,
}

impl RenamePairing {
    const CAPACITY: usize = 256;

    /// Returns false if `event` is one half of a rename that a later event
    /// will report in full.
    pub fn observe(&mut self, event: &Event) -> bool {
        let EventKind::Modify(ModifyKind::Name(mode)) = event.kind else {
            return true;
        };
        let Some(tracker) = event.tracker() else {
            return true;
        };

        match mode {
            RenameMode::From => {
                if self.pending.len() == Self::CAPACITY {
                    self.pending.pop_front();
                }
                self.pending.push_back(tracker);
                true
            }
            RenameMode::To => !self.pending.contains(&tracker),
            RenameMode::Both => {
                self.pending.retain(|t| *t != tracker);
                true
            }
            _ => true,
        }
    }
}

/// Owns the worker pool and the event filter for one watched root.
pub struct Dispatcher {
    filter: EventFilter,
    pool: WorkerPool<MoveTask>,
    renames: RenamePairing,
}

impl Dispatcher {
    /// Validates `root` and starts `workers` threads running `organizer`.
    pub fn new(
        root: &Path,
        filters: CompiledFilters,
        organizer: FileOrganizer,
        workers: usize,
    ) -> Result<Self, WatchError> {
        let metadata = fs::metadata(root).map_err(|e| WatchError::RootUnreadable {
            path: root.to_path_buf(),
            source: e,
        })?;
        if !metadata.is_dir() {
            return Err(WatchError::NotADirectory(root.to_path_buf()));
        }

        let organizer = Arc::new(organizer);
        let pool = WorkerPool::new(workers, move |task: MoveTask| {
            run_task(&organizer, &task);
        })
        .map_err(WatchError::Pool)?;

        Ok(Self {
            filter: EventFilter::new(root, filters),
            pool,
            renames: RenamePairing::default(),
        })
    }

    pub fn root(&self) -> &Path {
        self.filter.root()
    }

    pub fn filter(&self) -> &EventFilter {
        &self.filter
    }

    /// Filters one notification and queues it if eligible. Returns whether a
    /// task was queued.
    pub fn handle(&mut self, event: &Event) -> bool {
        if !self.renames.observe(event) {
            debug!(paths = ?event.paths, "waiting for the paired rename event");
            return false;
        }
        let Some(watch_event) = WatchEvent::from_notify(event) else {
            return false;
        };
        match self.filter.eligible(&watch_event) {
            Some(path) => self.submit(path),
            None => {
                debug!(event = ?watch_event, "ignored event");
                false
            }
        }
    }

    /// Queues every eligible entry already present in the root.
    pub fn dispatch_existing(&self) -> Result<usize, WatchError> {
        let mut queued = 0;
        for path in self.filter.existing_entries()? {
            if self.submit(path) {
                queued += 1;
            }
        }
        Ok(queued)
    }

    fn submit(&self, path: PathBuf) -> bool {
        debug!(path = %path.display(), "queueing move task");
        match self.pool.submit(MoveTask { path }) {
            Ok(()) => true,
            Err(_) => {
                warn!("worker pool closed, dropping task");
                false
            }
        }
    }

    /// Waits for queued and running tasks to finish.
    pub fn drain(self) {
        self.pool.drain();
    }
}

fn run_task(organizer: &FileOrganizer, task: &MoveTask) {
    match organizer.organize(&task.path) {
        Ok(outcome) => {
            info!(
                from = %outcome.original_path.display(),
                to = %outcome.new_path.display(),
                category = %outcome.category,
                renamed = outcome.renamed,
                "organized"
            );
        }
        Err(OrganizeError::MetadataUnavailable { .. }) if !task.path.exists() => {
            debug!(path = %task.path.display(), "entry vanished before it could be moved");
        }
        Err(e) => {
            error!(path = %task.path.display(), error = %e, "failed to organize");
        }
    }
}

/// A live non-recursive subscription on the root.
pub struct RootWatcher {
    _watcher: RecommendedWatcher,
    events: Receiver<notify::Result<Event>>,
}

impl RootWatcher {
    pub fn subscribe(root: &Path) -> Result<Self, WatchError> {
        let (tx, events) = channel::unbounded();
        let subscribe_err = |e| WatchError::Subscribe {
            path: root.to_path_buf(),
            source: e,
        };

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let _ = tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(subscribe_err)?;
        watcher
            .watch(root, RecursiveMode::NonRecursive)
            .map_err(subscribe_err)?;

        Ok(Self {
            _watcher: watcher,
            events,
        })
    }

    /// Feeds notifications to `dispatcher` until `shutdown` fires or is
    /// disconnected, then drains the pool.
    pub fn run_until(self, mut dispatcher: Dispatcher, shutdown: Receiver<()>) {
        info!(root = %dispatcher.root().display(), "watching");
        loop {
            channel::select! {
                recv(self.events) -> msg => match msg {
                    Ok(Ok(event)) => {
                        dispatcher.handle(&event);
                    }
                    Ok(Err(e)) => warn!(error = %e, "watcher error"),
                    Err(_) => break,
                },
                recv(shutdown) -> _ => break,
            }
        }

        info!("stopping; waiting for in-flight moves");
        drop(self);
        dispatcher.drain();
    }
}
