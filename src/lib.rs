//! tidywatch - keeps a watched directory sorted
//!
//! Entries that land in the watched root are moved into `*YEAR*/Category`
//! folders once they stop changing, and a retention sweep sends anything older
//! than a configured age to a reversible delete, pruning folders it empties.

pub mod cli;
pub mod config;
pub mod destination;
pub mod disposal;
pub mod file_category;
pub mod file_organizer;
pub mod output;
pub mod retention;
pub mod stability;
pub mod watcher;
pub mod worker_pool;

pub use config::{CompiledFilters, ConfigError, Settings};
pub use destination::DestinationResolver;
pub use disposal::{DisposalError, HoldingArea, ReversibleDelete, SystemTrash};
pub use file_category::{Category, FileMapper, FolderTag};
pub use file_organizer::{FileOrganizer, MoveOutcome, OrganizeError, OrganizeResult};
pub use retention::{RetentionSweeper, SweepReport};
pub use stability::{Stability, StabilityGate};
pub use watcher::{
    Dispatcher, EventFilter, RenamePairing, RootWatcher, WatchError, WatchEvent,
};
pub use worker_pool::WorkerPool;
