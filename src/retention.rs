//! Age-based cleanup of category folders.
//!
//! A sweep trashes every entry under a category folder that is at least
//! `max_age_days` old, then prunes the folders that were left with nothing
//! visible in them. Only folders recognized by [`FolderTag`] are touched.

use crate::destination::creation_time;
use crate::disposal::ReversibleDelete;
use crate::file_category::FolderTag;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

pub const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Failed to read watched root {}: {source}", .path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A direct child of the root that the system manages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryFolder {
    pub path: PathBuf,
    pub tag: FolderTag,
}

/// An entry eligible for age-based removal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingItem {
    pub path: PathBuf,
    pub created: SystemTime,
}

/// What a sweep did.
#[derive(Debug, Default, Serialize)]
pub struct SweepReport {
    /// Expired entries handed to the delete primitive.
    pub trashed_items: Vec<PathBuf>,
    /// Empty folders handed to the delete primitive.
    pub pruned_dirs: Vec<PathBuf>,
    /// Entries whose age could not be determined.
    pub skipped: Vec<(PathBuf, String)>,
    /// Entries the delete primitive refused.
    pub failures: Vec<(PathBuf, String)>,
}

impl SweepReport {
    pub fn total_removed(&self) -> usize {
        self.trashed_items.len() + self.pruned_dirs.len()
    }

    pub fn is_clean(&self) -> bool {
        self.skipped.is_empty() && self.failures.is_empty()
    }
}

/// What a sweep would do right now.
#[derive(Debug, Default, Serialize)]
pub struct SweepPlan {
    pub expired_items: Vec<PathBuf>,
    /// Folders that are already empty. Folders emptied by removing the
    /// expired items are not predicted.
    pub empty_dirs: Vec<PathBuf>,
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

fn is_bundle(entry: &DirEntry) -> bool {
    entry.file_type().is_dir() && entry.file_name().to_string_lossy().ends_with(".app")
}

/// Returns true if `age` has reached `max_age_days`. The boundary counts as
/// expired; a creation time in the future never does.
pub fn is_expired(created: SystemTime, now: SystemTime, max_age_days: u64) -> bool {
    let threshold = Duration::from_secs(max_age_days.saturating_mul(SECONDS_PER_DAY));
    now.duration_since(created)
        .map(|age| age >= threshold)
        .unwrap_or(false)
}

/// Lists the direct children of `root` that are category folders.
pub fn category_folders(root: &Path) -> Result<Vec<CategoryFolder>, SweepError> {
    let entries = fs::read_dir(root).map_err(|e| SweepError::RootUnreadable {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut folders: Vec<CategoryFolder> = entries
        .flatten()
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| {
            let path = entry.path();
            FolderTag::from_path(&path).map(|tag| CategoryFolder { path, tag })
        })
        .collect();
    folders.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(folders)
}

/// Lists the entries under `folder` that are subject to retention: visible
/// files, and `.app` bundles as a whole.
pub fn pending_paths(folder: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut walker = WalkDir::new(folder).min_depth(1).into_iter();

    while let Some(next) = walker.next() {
        let entry = match next {
            Ok(entry) => entry,
            Err(e) => {
                warn!(folder = %folder.display(), error = %e, "skipping unreadable entry");
                continue;
            }
        };

        if is_bundle(&entry) {
            paths.push(entry.into_path());
            walker.skip_current_dir();
        } else if !entry.file_type().is_dir() && !is_hidden(&entry.file_name().to_string_lossy())
        {
            paths.push(entry.into_path());
        }
    }
    paths
}

/// Returns true if `dir` contains nothing visible anywhere below it.
///
/// Hidden entries do not count; a visible subdirectory only counts if it has
/// visible content itself. Bundles and files always count.
pub fn is_empty_dir(dir: &Path) -> bool {
    !has_visible_content(dir)
}

fn has_visible_content(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        // Unreadable: leave it alone.
        return true;
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if is_hidden(&name) {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if !is_dir || name.ends_with(".app") || has_visible_content(&entry.path()) {
            return true;
        }
    }
    false
}

/// Bottom-up list of the empty directories in `folder`, the folder included.
fn empty_dirs_bottom_up(folder: &Path) -> Vec<PathBuf> {
    WalkDir::new(folder)
        .contents_first(true)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_bundle(e))
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .filter(|p| is_empty_dir(p))
        .collect()
}

/// Runs retention passes against a reversible delete primitive.
#[derive(Debug)]
pub struct RetentionSweeper<D> {
    disposer: D,
}

impl<D: ReversibleDelete> RetentionSweeper<D> {
    pub fn new(disposer: D) -> Self {
        Self { disposer }
    }

    pub fn disposer(&self) -> &D {
        &self.disposer
    }

    /// Sweeps `root` using the current time.
    pub fn sweep(&self, root: &Path, max_age_days: u64) -> Result<SweepReport, SweepError> {
        self.sweep_at(root, max_age_days, SystemTime::now())
    }

    /// Sweeps `root` as if the current time were `now`.
    ///
    /// # Errors
    ///
    /// Only an unreadable root is an error. Per-entry problems are collected in
    /// the report and the pass continues.
    pub fn sweep_at(
        &self,
        root: &Path,
        max_age_days: u64,
        now: SystemTime,
    ) -> Result<SweepReport, SweepError> {
        let folders = category_folders(root)?;
        let mut report = SweepReport::default();

        for folder in &folders {
            for item in Self::collect_items(&folder.path, &mut report.skipped) {
                if !is_expired(item.created, now, max_age_days) {
                    continue;
                }
                match self.disposer.discard(&item.path) {
                    Ok(()) => {
                        info!(path = %item.path.display(), "trashed expired item");
                        report.trashed_items.push(item.path);
                    }
                    Err(e) => {
                        warn!(path = %item.path.display(), error = %e, "failed to trash item");
                        report.failures.push((item.path, e.to_string()));
                    }
                }
            }
        }

        for folder in &folders {
            let mut refused: Vec<PathBuf> = Vec::new();
            for dir in empty_dirs_bottom_up(&folder.path) {
                // Keep the ancestors of a folder the delete primitive refused,
                // and anything that gained content since the walk.
                if refused.iter().any(|r| r.starts_with(&dir)) || !is_empty_dir(&dir) {
                    continue;
                }
                match self.disposer.discard(&dir) {
                    Ok(()) => {
                        info!(path = %dir.display(), "pruned empty folder");
                        report.pruned_dirs.push(dir);
                    }
                    Err(e) => {
                        warn!(path = %dir.display(), error = %e, "failed to prune folder");
                        report.failures.push((dir.clone(), e.to_string()));
                        refused.push(dir);
                    }
                }
            }
        }

        debug!(
            root = %root.display(),
            trashed = report.trashed_items.len(),
            pruned = report.pruned_dirs.len(),
            "sweep finished"
        );
        Ok(report)
    }

    /// Reports what [`sweep_at`](Self::sweep_at) would remove, without
    /// removing anything.
    pub fn plan_at(
        &self,
        root: &Path,
        max_age_days: u64,
        now: SystemTime,
    ) -> Result<SweepPlan, SweepError> {
        let mut plan = SweepPlan::default();
        let mut skipped = Vec::new();

        for folder in category_folders(root)? {
            plan.expired_items.extend(
                Self::collect_items(&folder.path, &mut skipped)
                    .into_iter()
                    .filter(|item| is_expired(item.created, now, max_age_days))
                    .map(|item| item.path),
            );
            plan.empty_dirs.extend(empty_dirs_bottom_up(&folder.path));
        }
        Ok(plan)
    }

    fn collect_items(folder: &Path, skipped: &mut Vec<(PathBuf, String)>) -> Vec<PendingItem> {
        pending_paths(folder)
            .into_iter()
            .filter_map(|path| match creation_time(&path) {
                Ok(created) => Some(PendingItem { path, created }),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "skipping item without creation time");
                    skipped.push((path, e.to_string()));
                    None
                }
            })
            .collect()
    }
}
