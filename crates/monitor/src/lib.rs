//! Release manifest monitoring.
//!
//! Polls each channel's manifest on its own interval, detects marker
//! changes, persists the new marker, then archives the raw manifest and
//! dispatches notifications.

pub mod archive;
pub mod detect;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod scheduler;
pub mod store;
pub mod watcher;

#[cfg(test)]
mod testing;

pub use archive::{ArchiveOutcome, ArchiveWriter};
pub use detect::detect;
pub use error::{ArchiveError, FetchError, ParseError, PersistenceError, PollError};
pub use fetch::{HttpManifestFetcher, ManifestSource};
pub use manifest::parse_manifest;
pub use scheduler::Scheduler;
pub use store::{JsonStateStore, StateStore};
pub use watcher::{ChannelWatcher, Pipeline, PollOutcome, ReleaseReport};
