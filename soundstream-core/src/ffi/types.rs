//! FFI types exposed via uniffi

use crate::library::SongMetadata;
use crate::network::FoundDevice;
use crate::playlist::PlaylistEntry;
use crate::sync::{Role, SessionSnapshot, Transport};

/// Error types exposed via FFI
#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum CoreError {
    #[error("Session is not started")]
    NotStarted,

    #[error("Session is already started")]
    AlreadyStarted,

    #[error("Engine stopped")]
    EngineStopped,

    #[error("Invalid message: {0}")]
    InvalidMessage(String),
}

/// Song metadata exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct Song {
    pub owner_address: String,
    pub song_id: i64,
    pub title: String,
    pub artist: String,
    pub album: String,
}

impl From<SongMetadata> for Song {
    fn from(s: SongMetadata) -> Self {
        Self {
            owner_address: s.owner_address,
            song_id: s.song_id,
            title: s.title,
            artist: s.artist,
            album: s.album,
        }
    }
}

impl From<Song> for SongMetadata {
    fn from(s: Song) -> Self {
        Self {
            owner_address: s.owner_address,
            song_id: s.song_id,
            title: s.title,
            artist: s.artist,
            album: s.album,
        }
    }
}

/// Queue entry exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct PlaylistItem {
    pub entry_id: i32,
    pub song: Song,
    pub loaded: bool,
    pub played: bool,
}

impl From<PlaylistEntry> for PlaylistItem {
    fn from(e: PlaylistEntry) -> Self {
        Self {
            entry_id: e.entry_id,
            song: Song::from(e.song),
            loaded: e.loaded,
            played: e.played,
        }
    }
}

impl From<PlaylistItem> for PlaylistEntry {
    fn from(item: PlaylistItem) -> Self {
        Self {
            entry_id: item.entry_id,
            song: SongMetadata::from(item.song),
            loaded: item.loaded,
            played: item.played,
        }
    }
}

/// Device seen during discovery
#[derive(Debug, Clone, uniffi::Record)]
pub struct DiscoveredDevice {
    pub name: String,
    pub address: String,
    pub known: bool,
}

impl From<FoundDevice> for DiscoveredDevice {
    fn from(d: FoundDevice) -> Self {
        Self {
            name: d.name,
            address: d.address,
            known: d.known,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum SessionRole {
    Host,
    Guest,
}

impl From<Role> for SessionRole {
    fn from(r: Role) -> Self {
        match r {
            Role::Host => SessionRole::Host,
            Role::Guest => SessionRole::Guest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum PlaybackStatus {
    Stopped,
    Playing,
    Paused,
}

impl From<Transport> for PlaybackStatus {
    fn from(t: Transport) -> Self {
        match t {
            Transport::Stopped => PlaybackStatus::Stopped,
            Transport::Playing => PlaybackStatus::Playing,
            Transport::Paused => PlaybackStatus::Paused,
        }
    }
}

/// One-off notices for the UI (toasts)
#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum Notice {
    QueueEmpty,
    /// Songs are queued but none is loaded yet
    NoSongsReady,
    PlaylistFinished,
    Skipping,
}

/// Session state (for polling) exposed via FFI
#[derive(Debug, Clone, uniffi::Record)]
pub struct SessionState {
    pub role: SessionRole,
    pub status: PlaybackStatus,
    pub current: Option<PlaylistItem>,
    pub playlist: Vec<PlaylistItem>,
    pub library: Vec<Song>,
}

impl From<SessionSnapshot> for SessionState {
    fn from(s: SessionSnapshot) -> Self {
        Self {
            role: s.role.into(),
            status: s.transport.into(),
            current: s.current.map(PlaylistItem::from),
            playlist: s.playlist.into_iter().map(PlaylistItem::from).collect(),
            library: s.library.into_iter().map(Song::from).collect(),
        }
    }
}

/// Callback interface for session events
#[uniffi::export(callback_interface)]
pub trait SessionCallback: Send + Sync {
    fn on_library_changed(&self, songs: Vec<Song>);
    fn on_playlist_changed(&self, playlist: Vec<PlaylistItem>);
    fn on_song_added(&self, item: PlaylistItem);
    fn on_song_removed(&self, item: PlaylistItem);
    fn on_current_song_changed(&self, item: Option<PlaylistItem>);
    fn on_playback_changed(&self, status: PlaybackStatus);
    fn on_role_changed(&self, role: SessionRole);
    fn on_notice(&self, notice: Notice);
    fn on_discovery_finished(&self, devices: Vec<DiscoveredDevice>, remote_initiated: bool);
}

/// Songs stored on this device
#[uniffi::export(callback_interface)]
pub trait MediaSource: Send + Sync {
    /// Every local song; owner addresses are filled in by the core
    fn list_songs(&self) -> Vec<Song>;
    /// Bytes of one local song, or None if it cannot be read
    fn read_song(&self, song_id: i64) -> Option<Vec<u8>>;
}

/// The device's audio output
#[uniffi::export(callback_interface)]
pub trait AudioOutput: Send + Sync {
    fn play(&self, song: Song, data: Vec<u8>);
    fn pause(&self);
    fn resume(&self);
    fn stop(&self);
    /// Take audio focus without playing anything
    fn request_focus(&self);
}

/// Byte transport to the other devices
#[uniffi::export(callback_interface)]
pub trait PeerTransport: Send + Sync {
    fn send(&self, address: String, payload: Vec<u8>);
    fn broadcast(&self, payload: Vec<u8>);
}
