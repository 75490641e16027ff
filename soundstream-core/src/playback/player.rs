//! Playback sinks
//!
//! The host drives a local `AudioPlayer`; a guest drives the host instead,
//! forwarding its commands as messages.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::library::SongMetadata;
use crate::network::PeerHandle;
use crate::sync::SyncMessage;

/// Local audio output, provided by the platform.
///
/// The platform reports the end of a song back through the engine's
/// "song finished" input.
pub trait AudioPlayer: Send {
    /// Start a new song from its bytes
    fn play(&mut self, song: &SongMetadata, data: Arc<Vec<u8>>);
    fn pause(&mut self);
    fn resume(&mut self);
    fn stop(&mut self);
    /// Take audio focus without producing sound
    fn request_audio_focus(&mut self) {}
}

/// Player that does nothing, for devices that never host
#[derive(Debug, Default)]
pub struct SilentPlayer;

impl AudioPlayer for SilentPlayer {
    fn play(&mut self, song: &SongMetadata, _data: Arc<Vec<u8>>) {
        debug!("SilentPlayer: play {}", song.title);
    }
    fn pause(&mut self) {}
    fn resume(&mut self) {}
    fn stop(&mut self) {}
}

/// Remote control of the host's player
#[derive(Clone)]
pub struct RemoteControl {
    host_address: String,
    peers: PeerHandle,
}

impl RemoteControl {
    pub fn new(host_address: &str, peers: PeerHandle) -> Self {
        Self {
            host_address: host_address.to_string(),
            peers,
        }
    }

    pub fn play(&self) {
        self.send(SyncMessage::Play);
    }

    pub fn pause(&self) {
        self.send(SyncMessage::Pause);
    }

    pub fn skip(&self) {
        self.send(SyncMessage::Skip);
    }

    /// Forward any request to the host
    pub fn send(&self, message: SyncMessage) {
        debug!("Sending {} to host {}", message.kind(), self.host_address);
        if let Err(e) = self.peers.send(&self.host_address, message) {
            warn!("Failed to reach host {}: {}", self.host_address, e);
        }
    }
}

/// Where playback commands go
pub(crate) enum Sink {
    Local,
    Remote(RemoteControl),
}
