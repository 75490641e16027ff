//! Local event fan-out
//!
//! UI collaborators subscribe to a broadcast of `SessionEvent`s.

use tokio::sync::broadcast;
use tracing::debug;

use super::state::Role;
use crate::library::SongMetadata;
use crate::network::FoundDevice;
use crate::playlist::PlaylistEntry;

/// Events published to local subscribers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The catalog gained or lost songs
    LibraryUpdated(Vec<SongMetadata>),
    /// The queue changed; carries the full ordered queue
    PlaylistUpdated(Vec<PlaylistEntry>),
    SongAdded(PlaylistEntry),
    SongRemoved(PlaylistEntry),
    CurrentSongChanged(Option<PlaylistEntry>),
    PlayingAudio,
    PausedAudio,
    SkippingAudio,
    /// Play requested with nothing queued
    QueueEmpty,
    /// Songs are queued but none is loaded yet
    NoSongsReady,
    /// Every entry was played; the queue starts over
    PlaylistFinished,
    RoleChanged(Role),
    DiscoveryFinished {
        devices: Vec<FoundDevice>,
        remote_initiated: bool,
    },
}

/// Cloneable publisher for session events
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("No subscribers for session event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}
