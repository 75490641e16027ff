//! SoundStream - Core Library
//!
//! Replicates a shared music catalog and play queue across nearby devices.
//! One device hosts: it owns the queue, loads songs and plays them. The others
//! are guests that mirror the host and send their requests upstream.

pub mod ffi;
pub mod library;
pub mod network;
pub mod playback;
pub mod playlist;
pub mod sync;

// Re-exports for convenience
pub use library::{CatalogReplica, SongMetadata};
pub use playlist::{PlaylistEntry, QueueReplica};
pub use sync::{spawn_engine, EngineHandle, SessionConfig, SyncMessage};

// Setup uniffi scaffolding
uniffi::setup_scaffolding!();
