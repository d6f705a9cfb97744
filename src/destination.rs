//! Dated destination folders.
//!
//! Every organized entry lands in `root/*YEAR*/Category`, where `YEAR` is the
//! local calendar year of the entry's creation time.

use crate::file_category::{Category, FileMapper, FolderTag};
use crate::file_organizer::{OrganizeError, OrganizeResult};
use chrono::{DateTime, Datelike, Local};
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Returns the creation ("birth") time of `path`.
///
/// Filesystems without birth time fall back to the last status change time on
/// Unix, which moves forward on renames and permission changes.
pub fn creation_time(path: &Path) -> OrganizeResult<SystemTime> {
    let metadata = fs::metadata(path).map_err(|e| OrganizeError::MetadataUnavailable {
        path: path.to_path_buf(),
        source: e,
    })?;
    birth_time(&metadata).map_err(|e| OrganizeError::MetadataUnavailable {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(unix)]
fn birth_time(metadata: &Metadata) -> io::Result<SystemTime> {
    use std::os::unix::fs::MetadataExt;
    use std::time::Duration;

    match metadata.created() {
        Ok(created) => Ok(created),
        Err(_) => {
            let secs = metadata.ctime();
            let nanos = metadata.ctime_nsec().clamp(0, 999_999_999) as u32;
            let offset = Duration::new(secs.unsigned_abs(), nanos);
            if secs >= 0 {
                Ok(SystemTime::UNIX_EPOCH + offset)
            } else {
                Ok(SystemTime::UNIX_EPOCH - offset)
            }
        }
    }
}

#[cfg(not(unix))]
fn birth_time(metadata: &Metadata) -> io::Result<SystemTime> {
    metadata.created()
}

/// Returns the local calendar year in which `path` was created.
pub fn creation_year(path: &Path) -> OrganizeResult<i32> {
    let created: DateTime<Local> = creation_time(path)?.into();
    Ok(created.year())
}

/// Builds destination folders below a watched root.
#[derive(Debug, Clone)]
pub struct DestinationResolver {
    root: PathBuf,
    mapper: FileMapper,
}

impl DestinationResolver {
    pub fn new(root: impl Into<PathBuf>, mapper: FileMapper) -> Self {
        Self {
            root: root.into(),
            mapper,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn mapper(&self) -> &FileMapper {
        &self.mapper
    }

    /// Classifies `path` and returns its destination folder.
    pub fn resolve(&self, path: &Path) -> OrganizeResult<PathBuf> {
        let category = self.mapper.classify(path);
        self.resolve_with(path, category)
    }

    /// Returns the destination folder of `path` for an already known category.
    ///
    /// # Errors
    ///
    /// Returns `OrganizeError::MetadataUnavailable` if the creation time of
    /// `path` cannot be read.
    pub fn resolve_with(&self, path: &Path, category: Category) -> OrganizeResult<PathBuf> {
        let year = creation_year(path)?;
        Ok(self.dated_folder(year, category))
    }

    /// `root/*YEAR*/Category`, with the year zero-padded to four digits.
    pub fn dated_folder(&self, year: i32, category: Category) -> PathBuf {
        self.root
            .join(FolderTag::sentinel(&format!("{year:04}")))
            .join(category.dir_name())
    }
}
