//! Detection of files that are still being written.
//!
//! A file counts as settled once two size samples taken one interval apart
//! agree. Only the calling thread sleeps.

use crate::file_organizer::{OrganizeError, OrganizeResult};
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};
use tracing::trace;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_STABILITY_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Result of waiting on a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
    /// Two consecutive samples matched.
    Stable { size: u64 },
    /// The timeout expired while the size was still changing.
    Unsettled { last_size: u64, waited: Duration },
}

/// Size-polling gate run by a worker before it moves a file.
#[derive(Debug, Clone, Copy)]
pub struct StabilityGate {
    interval: Duration,
    timeout: Option<Duration>,
}

impl StabilityGate {
    /// `timeout: None` waits for as long as the file keeps changing.
    pub fn new(interval: Duration, timeout: Option<Duration>) -> Self {
        Self { interval, timeout }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Blocks until `path` stops growing or the timeout runs out.
    ///
    /// # Errors
    ///
    /// Returns `OrganizeError::MetadataUnavailable` if the file disappears or
    /// cannot be read between samples.
    pub fn await_stable(&self, path: &Path) -> OrganizeResult<Stability> {
        let started = Instant::now();
        let mut previous = Self::sample(path)?;

        loop {
            thread::sleep(self.interval);
            let current = Self::sample(path)?;
            if current == previous {
                return Ok(Stability::Stable { size: current });
            }

            trace!(path = %path.display(), previous, current, "size still changing");

            if let Some(timeout) = self.timeout
                && started.elapsed() >= timeout
            {
                return Ok(Stability::Unsettled {
                    last_size: current,
                    waited: started.elapsed(),
                });
            }
            previous = current;
        }
    }

    fn sample(path: &Path) -> OrganizeResult<u64> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| OrganizeError::MetadataUnavailable {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

impl Default for StabilityGate {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, Some(DEFAULT_STABILITY_TIMEOUT))
    }
}
