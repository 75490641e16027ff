//! Sync Controller
//!
//! Dispatches transport events, peer messages and user commands onto the
//! catalog and the playback coordinator. Runs in the engine's serial domain;
//! the only work it sends elsewhere is reading song bytes for a peer.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use super::events::{EventBus, SessionEvent};
use super::protocol::SyncMessage;
use super::state::{Role, SessionSnapshot};
use crate::library::{CatalogReplica, MediaLibrary, SongMetadata};
use crate::network::{PeerHandle, TransportEvent};
use crate::playback::PlaybackCoordinator;
use crate::playlist::{EntryId, PlaylistEntry};

/// Actions requested by the local user
#[derive(Debug, Clone)]
pub enum UserCommand {
    Play,
    Pause,
    PlayPause,
    Skip,
    Stop,
    AddSong(SongMetadata),
    RemoveSong(PlaylistEntry),
    BumpSong(PlaylistEntry),
    ClearPlaylist,
}

pub struct SyncController {
    local_address: String,
    catalog: Arc<CatalogReplica>,
    playback: PlaybackCoordinator,
    media: Arc<dyn MediaLibrary>,
    peers: PeerHandle,
    events: EventBus,
}

impl SyncController {
    pub fn new(
        local_address: String,
        catalog: Arc<CatalogReplica>,
        playback: PlaybackCoordinator,
        media: Arc<dyn MediaLibrary>,
        peers: PeerHandle,
        events: EventBus,
    ) -> Self {
        Self {
            local_address,
            catalog,
            playback,
            media,
            peers,
            events,
        }
    }

    pub fn role(&self) -> Role {
        self.playback.role()
    }

    pub fn catalog(&self) -> &Arc<CatalogReplica> {
        &self.catalog
    }

    pub fn playback(&self) -> &PlaybackCoordinator {
        &self.playback
    }

    pub fn playback_mut(&mut self) -> &mut PlaybackCoordinator {
        &mut self.playback
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            role: self.playback.role(),
            transport: self.playback.transport(),
            current: self.playback.current_entry().cloned(),
            playlist: self.playback.queue().to_ordered_list(),
            library: self.catalog.snapshot(),
        }
    }

    /// Handle a connection change or an inbound message
    pub fn handle_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Message { from, message } => {
                self.handle_message(&from, message);
            }

            TransportEvent::HostConnected { address } => {
                info!("Host connected: {}", address);
                self.playback.become_guest(&address);

                // The host builds its catalog from what guests upload
                let songs = self.catalog.my_entries(&self.local_address);
                debug!("Uploading {} local songs to {}", songs.len(), address);
                self.send(&address, SyncMessage::Library { songs });
            }

            TransportEvent::HostDisconnected => {
                info!("Host disconnected, taking over");
                self.playback.become_host();
                if self.catalog.clear_external(&self.local_address) {
                    self.publish_library();
                }
            }

            TransportEvent::GuestConnected { address } => {
                if !self.role().is_host() {
                    error!("Protocol violation: guest {} connected while we are a guest", address);
                    return;
                }
                info!("Guest connected: {}", address);
                self.send(
                    &address,
                    SyncMessage::Library {
                        songs: self.catalog.snapshot(),
                    },
                );
                self.playback.guest_connected(&address);
            }

            TransportEvent::GuestDisconnected { address } => {
                info!("Guest disconnected: {}", address);
                if self.catalog.remove_by_owner(&address) {
                    self.publish_library();
                    if self.role().is_host() {
                        self.broadcast_library();
                    }
                }
                self.playback.owner_disconnected(&address);
            }
        }
    }

    /// Apply a message from a peer. Messages meant for the other role are
    /// logged and dropped.
    pub fn handle_message(&mut self, from: &str, message: SyncMessage) {
        let role = self.role();
        if let Some(required) = message.required_role() {
            if required != role {
                error!(
                    "Protocol violation: {} from {} is for the {} but we are the {}",
                    message.kind(),
                    from,
                    required,
                    role
                );
                return;
            }
        }
        debug!("Received {} from {}", message.kind(), from);

        match message {
            SyncMessage::Library { songs } => self.merge_library(songs),

            SyncMessage::RequestSong { song_id } => self.serve_song(from, song_id),

            SyncMessage::TransferSong { song_id, data } => {
                debug!("Received {} bytes for {}#{}", data.len(), from, song_id);
                self.playback.song_received(from, song_id, data);
            }

            SyncMessage::PlayStatus {
                owner_address,
                song_id,
                entry_id,
                is_playing,
            } => {
                self.playback
                    .on_play_status(&owner_address, song_id, entry_id, is_playing);
            }

            SyncMessage::Play => self.playback.play(),
            SyncMessage::Pause => self.playback.pause(),
            SyncMessage::Skip => self.playback.skip(),

            SyncMessage::AddToPlaylist {
                owner_address,
                song_id,
            } => match self.catalog.lookup(&owner_address, song_id) {
                Some(song) => self.playback.add_song(song),
                None => warn!(
                    "{} asked to queue {}#{} which is not in the catalog",
                    from, owner_address, song_id
                ),
            },

            SyncMessage::BumpSongOnPlaylist {
                owner_address,
                song_id,
                entry_id,
            } => {
                if let Some(entry) = self.resolve_entry(&owner_address, song_id, entry_id) {
                    self.playback.bump_song(&entry);
                }
            }

            SyncMessage::RemoveFromPlaylist {
                owner_address,
                song_id,
                entry_id,
            } => {
                if let Some(entry) = self.resolve_entry(&owner_address, song_id, entry_id) {
                    self.playback.remove_song(&entry);
                }
            }

            SyncMessage::PlaylistUpdated { entries } => self.playback.apply_snapshot(entries),

            SyncMessage::SongStatus {
                owner_address,
                song_id,
                entry_id,
                loaded,
                played,
            } => {
                self.playback
                    .apply_song_status(&owner_address, song_id, entry_id, loaded, played);
            }
        }
    }

    pub fn handle_command(&mut self, command: UserCommand) {
        debug!("User command: {:?}", command);
        match command {
            UserCommand::Play => self.playback.play(),
            UserCommand::Pause => self.playback.pause(),
            UserCommand::PlayPause => self.playback.play_pause(),
            UserCommand::Skip => self.playback.skip(),
            UserCommand::Stop => self.playback.stop(),
            UserCommand::AddSong(song) => self.playback.add_song(song),
            UserCommand::RemoveSong(entry) => self.playback.remove_song(&entry),
            UserCommand::BumpSong(entry) => self.playback.bump_song(&entry),
            UserCommand::ClearPlaylist => self.playback.clear_playlist(),
        }
    }

    /// The local library finished loading into the catalog
    pub fn local_library_loaded(&mut self) {
        self.publish_library();
        match self.role() {
            Role::Host => self.broadcast_library(),
            Role::Guest => {
                let songs = self.catalog.my_entries(&self.local_address);
                self.playback.send_to_host(SyncMessage::Library { songs });
            }
        }
    }

    fn merge_library(&self, songs: Vec<SongMetadata>) {
        if !self.catalog.merge(songs) {
            debug!("Library message brought nothing new");
            return;
        }
        self.publish_library();
        if self.role().is_host() {
            self.broadcast_library();
        }
    }

    /// Read a local song off the serial domain and send it to `to`
    fn serve_song(&self, to: &str, song_id: i64) {
        let media = Arc::clone(&self.media);
        let peers = self.peers.clone();
        let to = to.to_string();
        tokio::task::spawn_blocking(move || match media.load_song_bytes(song_id) {
            Ok(data) => {
                info!("Sending song {} ({} bytes) to {}", song_id, data.len(), to);
                if let Err(e) = peers.send(&to, SyncMessage::TransferSong { song_id, data }) {
                    warn!("Failed to send song {} to {}: {}", song_id, to, e);
                }
            }
            Err(e) => warn!("Could not load song {} for {}: {}", song_id, to, e),
        });
    }

    fn resolve_entry(&self, owner_address: &str, song_id: i64, entry_id: EntryId) -> Option<PlaylistEntry> {
        let entry = self
            .playback
            .queue()
            .find_by_identity(owner_address, song_id, entry_id)
            .cloned();
        if entry.is_none() {
            warn!(
                "Entry {} ({}#{}) is not in the queue",
                entry_id, owner_address, song_id
            );
        }
        entry
    }

    fn publish_library(&self) {
        self.events
            .publish(SessionEvent::LibraryUpdated(self.catalog.snapshot()));
    }

    fn broadcast_library(&self) {
        let message = SyncMessage::Library {
            songs: self.catalog.snapshot(),
        };
        if let Err(e) = self.peers.broadcast(message) {
            debug!("Broadcast error: {}", e);
        }
    }

    fn send(&self, to: &str, message: SyncMessage) {
        if let Err(e) = self.peers.send(to, message) {
            debug!("Send to {} failed: {}", to, e);
        }
    }
}
