//! Bridges between the engine and the native callbacks

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::library::{MediaError, MediaLibrary, SongMetadata};
use crate::network::PeerCommand;
use crate::playback::AudioPlayer;
use crate::sync::SessionEvent;

use super::types::{
    AudioOutput, DiscoveredDevice, MediaSource, Notice, PeerTransport, PlaybackStatus, PlaylistItem,
    SessionCallback, Song,
};

pub type SharedCallback = Arc<RwLock<Option<Arc<dyn SessionCallback>>>>;

/// `MediaLibrary` backed by the native media source
pub struct NativeMedia {
    source: Box<dyn MediaSource>,
}

impl NativeMedia {
    pub fn new(source: Box<dyn MediaSource>) -> Self {
        Self { source }
    }
}

impl MediaLibrary for NativeMedia {
    fn list_local_songs(&self) -> Vec<SongMetadata> {
        self.source
            .list_songs()
            .into_iter()
            .map(SongMetadata::from)
            .collect()
    }

    fn load_song_bytes(&self, song_id: i64) -> Result<Vec<u8>, MediaError> {
        self.source
            .read_song(song_id)
            .ok_or(MediaError::NotFound(song_id))
    }
}

/// `AudioPlayer` backed by the native audio output
pub struct NativePlayer {
    output: Box<dyn AudioOutput>,
}

impl NativePlayer {
    pub fn new(output: Box<dyn AudioOutput>) -> Self {
        Self { output }
    }
}

impl AudioPlayer for NativePlayer {
    fn play(&mut self, song: &SongMetadata, data: Arc<Vec<u8>>) {
        self.output.play(Song::from(song.clone()), data.as_ref().clone());
    }

    fn pause(&mut self) {
        self.output.pause();
    }

    fn resume(&mut self) {
        self.output.resume();
    }

    fn stop(&mut self) {
        self.output.stop();
    }

    fn request_audio_focus(&mut self) {
        self.output.request_focus();
    }
}

/// Encode outbound commands and hand them to the native transport
pub async fn run_outbound(
    mut command_rx: mpsc::UnboundedReceiver<PeerCommand>,
    transport: Box<dyn PeerTransport>,
) {
    while let Some(command) = command_rx.recv().await {
        match command {
            PeerCommand::Send { to, message } => match message.encode() {
                Ok(payload) => {
                    debug!("Sending {} ({} bytes) to {}", message.kind(), payload.len(), to);
                    transport.send(to, payload);
                }
                Err(e) => warn!("Dropping {}: {}", message.kind(), e),
            },
            PeerCommand::Broadcast { message } => match message.encode() {
                Ok(payload) => {
                    debug!("Broadcasting {} ({} bytes)", message.kind(), payload.len());
                    transport.broadcast(payload);
                }
                Err(e) => warn!("Dropping {}: {}", message.kind(), e),
            },
        }
    }
    debug!("Outbound channel closed");
}

/// Forward session events to the native callback until cancelled
pub async fn run_event_forwarder(
    mut events_rx: broadcast::Receiver<SessionEvent>,
    callback: SharedCallback,
    mut cancel_rx: oneshot::Receiver<()>,
) {
    info!("Event forwarder started");
    loop {
        tokio::select! {
            _ = &mut cancel_rx => {
                info!("Event forwarder cancelled");
                break;
            }
            received = events_rx.recv() => match received {
                Ok(event) => {
                    let cb = callback.read().clone();
                    if let Some(cb) = cb {
                        forward_event(event, cb.as_ref());
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Event forwarder lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

/// Translate one session event into a callback
pub fn forward_event(event: SessionEvent, cb: &dyn SessionCallback) {
    match event {
        SessionEvent::LibraryUpdated(songs) => {
            cb.on_library_changed(songs.into_iter().map(Song::from).collect());
        }
        SessionEvent::PlaylistUpdated(entries) => {
            cb.on_playlist_changed(entries.into_iter().map(PlaylistItem::from).collect());
        }
        SessionEvent::SongAdded(entry) => cb.on_song_added(entry.into()),
        SessionEvent::SongRemoved(entry) => cb.on_song_removed(entry.into()),
        SessionEvent::CurrentSongChanged(entry) => {
            cb.on_current_song_changed(entry.map(PlaylistItem::from));
        }
        SessionEvent::PlayingAudio => cb.on_playback_changed(PlaybackStatus::Playing),
        SessionEvent::PausedAudio => cb.on_playback_changed(PlaybackStatus::Paused),
        SessionEvent::SkippingAudio => cb.on_notice(Notice::Skipping),
        SessionEvent::QueueEmpty => cb.on_notice(Notice::QueueEmpty),
        SessionEvent::NoSongsReady => cb.on_notice(Notice::NoSongsReady),
        SessionEvent::PlaylistFinished => cb.on_notice(Notice::PlaylistFinished),
        SessionEvent::RoleChanged(role) => cb.on_role_changed(role.into()),
        SessionEvent::DiscoveryFinished {
            devices,
            remote_initiated,
        } => cb.on_discovery_finished(
            devices.into_iter().map(DiscoveredDevice::from).collect(),
            remote_initiated,
        ),
    }
}
