//! Reversible deletion.
//!
//! Nothing the sweeper removes is freed right away. Entries go either to the
//! desktop trash or to a plain holding directory the user can restore from.

use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DisposalError {
    #[error("Failed to move {} to the trash: {source}", .path.display())]
    Trash {
        path: PathBuf,
        #[source]
        source: trash::Error,
    },
    #[error("Failed to move {} into holding area {}: {source}", .path.display(), .holding.display())]
    Holding {
        path: PathBuf,
        holding: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Moves an entry somewhere recoverable.
///
/// Implementations must return `Ok(())` for a path that no longer exists.
pub trait ReversibleDelete: Send + Sync {
    fn discard(&self, path: &Path) -> Result<(), DisposalError>;
}

fn is_gone(path: &Path) -> bool {
    matches!(fs::symlink_metadata(path), Err(e) if e.kind() == io::ErrorKind::NotFound)
}

/// The platform trash (Finder Trash, freedesktop trash, Recycle Bin).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTrash;

impl ReversibleDelete for SystemTrash {
    fn discard(&self, path: &Path) -> Result<(), DisposalError> {
        if is_gone(path) {
            return Ok(());
        }
        trash::delete(path).map_err(|e| DisposalError::Trash {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// A directory that discarded entries are renamed into.
///
/// Must live on the same volume as the watched root, since entries are
/// renamed rather than copied.
#[derive(Debug, Clone)]
pub struct HoldingArea {
    dir: PathBuf,
}

impl HoldingArea {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Picks a free name inside the holding area.
    ///
    /// Example: a second `report.pdf` becomes `report.pdf.20251109-143052`,
    /// and a third within the same second `report.pdf.20251109-143052.1`.
    fn free_slot(&self, path: &Path) -> PathBuf {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "entry".to_string());

        let plain = self.dir.join(&name);
        if is_gone(&plain) {
            return plain;
        }

        let stamped = format!("{}.{}", name, Local::now().format("%Y%m%d-%H%M%S"));
        let mut candidate = self.dir.join(&stamped);
        let mut n = 1;
        while !is_gone(&candidate) {
            candidate = self.dir.join(format!("{stamped}.{n}"));
            n += 1;
        }
        candidate
    }
}

impl ReversibleDelete for HoldingArea {
    fn discard(&self, path: &Path) -> Result<(), DisposalError> {
        if is_gone(path) {
            return Ok(());
        }
        let holding_err = |e| DisposalError::Holding {
            path: path.to_path_buf(),
            holding: self.dir.clone(),
            source: e,
        };
        fs::create_dir_all(&self.dir).map_err(holding_err)?;
        let target = self.free_slot(path);
        fs::rename(path, &target).map_err(holding_err)
    }
}

impl<T: ReversibleDelete + ?Sized> ReversibleDelete for &T {
    fn discard(&self, path: &Path) -> Result<(), DisposalError> {
        (**self).discard(path)
    }
}

impl<T: ReversibleDelete + ?Sized> ReversibleDelete for Box<T> {
    fn discard(&self, path: &Path) -> Result<(), DisposalError> {
        (**self).discard(path)
    }
}
