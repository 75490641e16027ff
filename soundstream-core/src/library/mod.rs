//! Song Library
//!
//! The merged catalog of every peer's songs, and the local media collaborator.

mod catalog;
mod media;
mod types;

pub use catalog::CatalogReplica;
pub use media::{MediaError, MediaLibrary, MemoryLibrary};
pub use types::*;
