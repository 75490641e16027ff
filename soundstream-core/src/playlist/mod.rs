//! Play Queue
//!
//! Queue entries, the host-authoritative queue replica, and the background
//! loader that fetches song bytes for queued entries.

mod entry;
mod loader;
mod queue;

pub use entry::*;
pub use loader::{LoadedEntry, Loader, LoaderHandle, SongCache};
pub use queue::QueueReplica;
