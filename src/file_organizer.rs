//! Moving entries of the watched root into their category folders.
//!
//! A move is a single `rename`. It never overwrites: when the destination name
//! is taken the entry is retried once under a `name(1).ext` variant, and a
//! second clash is reported to the caller with the source left untouched.

use crate::destination::DestinationResolver;
use crate::file_category::Category;
use crate::stability::{Stability, StabilityGate};
use std::ffi::{OsStr, OsString};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while organizing a single entry.
#[derive(Debug, Error)]
pub enum OrganizeError {
    /// Metadata (size or creation time) could not be read.
    #[error("Failed to read metadata for {}: {source}", .path.display())]
    MetadataUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// Failed to create a destination folder.
    #[error("Failed to create directory {}: {source}", .path.display())]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// An entry with the destination name already exists.
    #[error("Cannot move {} to {}: destination already exists", .from.display(), .to.display())]
    DestinationCollision { from: PathBuf, to: PathBuf },
    /// The rename itself failed (permissions, another volume, vanished source).
    #[error("Failed to move {} to {}: {source}", .from.display(), .to.display())]
    FileMoveFailure {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The entry was still changing when the stability timeout ran out.
    #[error("{} was still being written after {waited:?}", .path.display())]
    Unstable { path: PathBuf, waited: Duration },
    /// The path has no final component to carry over.
    #[error("{} has no file name", .path.display())]
    NoFileName { path: PathBuf },
}

/// Result type for file organization operations.
pub type OrganizeResult<T> = Result<T, OrganizeError>;

/// Where an entry ended up after [`move_into`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedFile {
    pub new_path: PathBuf,
    /// True when the entry had to take a disambiguated name.
    pub renamed: bool,
}

/// Record of one completed organize step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub original_path: PathBuf,
    pub new_path: PathBuf,
    pub category: Category,
    pub renamed: bool,
}

/// Where an entry would go, computed without touching it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedMove {
    pub path: PathBuf,
    pub category: Category,
    pub destination_dir: PathBuf,
}

/// Returns `name` with `(n)` inserted before its extension.
///
/// # Examples
///
/// ```
/// use std::ffi::OsStr;
/// use tidywatch::file_organizer::disambiguated_name;
///
/// assert_eq!(disambiguated_name(OsStr::new("a.txt"), 1), "a(1).txt");
/// assert_eq!(disambiguated_name(OsStr::new("Photos"), 1), "Photos(1)");
/// assert_eq!(disambiguated_name(OsStr::new("Tool.app"), 2), "Tool(2).app");
/// ```
pub fn disambiguated_name(name: &OsStr, n: u32) -> OsString {
    let as_path = Path::new(name);
    let stem = as_path.file_stem().unwrap_or(name);
    let mut renamed = stem.to_os_string();
    renamed.push(format!("({n})"));
    if let Some(ext) = as_path.extension() {
        renamed.push(".");
        renamed.push(ext);
    }
    renamed
}

/// Renames `from` to `to`, refusing to replace an existing entry.
///
/// Regular files are linked under the new name and then unlinked, so an entry
/// that appears at `to` concurrently makes the link fail instead of being
/// replaced. Directories and filesystems without hard links fall back to an
/// existence check followed by `rename`, which leaves a short window in which
/// a file created at `to` by another process would be replaced.
fn rename_no_clobber(from: &Path, to: &Path) -> OrganizeResult<()> {
    let collision = || OrganizeError::DestinationCollision {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
    };
    let move_failure = |e| OrganizeError::FileMoveFailure {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source: e,
    };

    let metadata = fs::symlink_metadata(from).map_err(move_failure)?;
    if metadata.is_file() {
        match fs::hard_link(from, to) {
            Ok(()) => {
                return fs::remove_file(from).map_err(|e| {
                    // Leave exactly one name behind.
                    let _ = fs::remove_file(to);
                    move_failure(e)
                });
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Err(collision()),
            Err(e) => {
                debug!(from = %from.display(), error = %e, "hard link unavailable, renaming");
            }
        }
    }

    if fs::symlink_metadata(to).is_ok() {
        return Err(collision());
    }
    fs::rename(from, to).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists | io::ErrorKind::DirectoryNotEmpty => collision(),
        _ => move_failure(e),
    })
}

/// Moves `file_path` into `destination_dir`, creating the folder if needed.
///
/// # Errors
///
/// * `DirectoryCreationFailed` if the folder cannot be created
/// * `DestinationCollision` if both the original and the `(1)` name are taken
/// * `FileMoveFailure` for any other rename failure
///
/// In every error case the source is left where it was.
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use tidywatch::file_organizer::move_into;
///
/// let placed = move_into(
///     Path::new("/downloads/a.txt"),
///     Path::new("/downloads/*2024*/Documents"),
/// );
/// match placed {
///     Ok(p) => println!("Moved to {}", p.new_path.display()),
///     Err(e) => eprintln!("Move failed: {}", e),
/// }
/// ```
pub fn move_into(file_path: &Path, destination_dir: &Path) -> OrganizeResult<PlacedFile> {
    fs::create_dir_all(destination_dir).map_err(|e| OrganizeError::DirectoryCreationFailed {
        path: destination_dir.to_path_buf(),
        source: e,
    })?;

    let file_name = file_path
        .file_name()
        .ok_or_else(|| OrganizeError::NoFileName {
            path: file_path.to_path_buf(),
        })?;

    let target = destination_dir.join(file_name);
    match rename_no_clobber(file_path, &target) {
        Ok(()) => {
            return Ok(PlacedFile {
                new_path: target,
                renamed: false,
            });
        }
        Err(OrganizeError::DestinationCollision { .. }) => {
            debug!(target = %target.display(), "destination taken, retrying with suffix");
        }
        Err(e) => return Err(e),
    }

    let retry_target = destination_dir.join(disambiguated_name(file_name, 1));
    rename_no_clobber(file_path, &retry_target)?;
    Ok(PlacedFile {
        new_path: retry_target,
        renamed: true,
    })
}

/// Runs one entry through the stability gate, the resolver and the mover.
#[derive(Debug, Clone)]
pub struct FileOrganizer {
    resolver: DestinationResolver,
    gate: StabilityGate,
}

impl FileOrganizer {
    pub fn new(resolver: DestinationResolver, gate: StabilityGate) -> Self {
        Self { resolver, gate }
    }

    pub fn resolver(&self) -> &DestinationResolver {
        &self.resolver
    }

    /// Waits for `path` to settle, then moves it into its dated category
    /// folder.
    ///
    /// # Errors
    ///
    /// Returns `Unstable` when the gate times out, `MetadataUnavailable` when
    /// the entry vanished or its creation time cannot be read, and the
    /// [`move_into`] errors otherwise.
    pub fn organize(&self, path: &Path) -> OrganizeResult<MoveOutcome> {
        if let Stability::Unsettled { waited, .. } = self.gate.await_stable(path)? {
            return Err(OrganizeError::Unstable {
                path: path.to_path_buf(),
                waited,
            });
        }

        let planned = self.plan(path)?;
        let placed = move_into(path, &planned.destination_dir)?;
        Ok(MoveOutcome {
            original_path: planned.path,
            new_path: placed.new_path,
            category: planned.category,
            renamed: placed.renamed,
        })
    }

    /// Computes where `path` would be moved without waiting or moving.
    pub fn plan(&self, path: &Path) -> OrganizeResult<PlannedMove> {
        let category = self.resolver.mapper().classify(path);
        let destination_dir = self.resolver.resolve_with(path, category)?;
        Ok(PlannedMove {
            path: path.to_path_buf(),
            category,
            destination_dir,
        })
    }
}
