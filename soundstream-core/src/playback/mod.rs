//! Playback
//!
//! Queue-driven playback on the host and remote control on guests.

mod coordinator;
mod player;

pub use coordinator::PlaybackCoordinator;
pub use player::{AudioPlayer, RemoteControl, SilentPlayer};
