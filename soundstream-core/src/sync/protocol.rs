//! Sync Protocol Messages

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::Role;
use crate::library::SongMetadata;
use crate::playlist::{EntryId, PlaylistEntry};

/// Wire codec errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to encode message: {0}")]
    Encode(serde_json::Error),

    #[error("Failed to decode message: {0}")]
    Decode(serde_json::Error),
}

/// Messages exchanged between peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    // === Catalog ===
    /// Songs known to the sender (a guest's own songs, or the host's full catalog)
    Library { songs: Vec<SongMetadata> },

    /// Ask the owner of a song for its bytes
    RequestSong { song_id: i64 },

    /// Song bytes, answering a RequestSong
    TransferSong { song_id: i64, data: Vec<u8> },

    // === Playback ===
    /// Host's current entry and whether it is playing
    PlayStatus {
        owner_address: String,
        song_id: i64,
        entry_id: EntryId,
        is_playing: bool,
    },

    /// Start or resume playback
    Play,

    /// Pause playback
    Pause,

    /// Skip the current song
    Skip,

    // === Queue requests (guest -> host) ===
    AddToPlaylist { owner_address: String, song_id: i64 },

    BumpSongOnPlaylist {
        owner_address: String,
        song_id: i64,
        entry_id: EntryId,
    },

    RemoveFromPlaylist {
        owner_address: String,
        song_id: i64,
        entry_id: EntryId,
    },

    // === Queue replication (host -> guest) ===
    /// Full queue contents
    PlaylistUpdated { entries: Vec<PlaylistEntry> },

    /// Flags of one entry changed
    SongStatus {
        owner_address: String,
        song_id: i64,
        entry_id: EntryId,
        loaded: bool,
        played: bool,
    },
}

impl SyncMessage {
    /// Role the receiver must be in to apply this message, if any
    pub fn required_role(&self) -> Option<Role> {
        match self {
            SyncMessage::TransferSong { .. }
            | SyncMessage::AddToPlaylist { .. }
            | SyncMessage::BumpSongOnPlaylist { .. }
            | SyncMessage::RemoveFromPlaylist { .. } => Some(Role::Host),

            SyncMessage::PlayStatus { .. }
            | SyncMessage::PlaylistUpdated { .. }
            | SyncMessage::SongStatus { .. } => Some(Role::Guest),

            SyncMessage::Library { .. }
            | SyncMessage::RequestSong { .. }
            | SyncMessage::Play
            | SyncMessage::Pause
            | SyncMessage::Skip => None,
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Library { .. } => "Library",
            SyncMessage::RequestSong { .. } => "RequestSong",
            SyncMessage::TransferSong { .. } => "TransferSong",
            SyncMessage::PlayStatus { .. } => "PlayStatus",
            SyncMessage::Play => "Play",
            SyncMessage::Pause => "Pause",
            SyncMessage::Skip => "Skip",
            SyncMessage::AddToPlaylist { .. } => "AddToPlaylist",
            SyncMessage::BumpSongOnPlaylist { .. } => "BumpSongOnPlaylist",
            SyncMessage::RemoveFromPlaylist { .. } => "RemoveFromPlaylist",
            SyncMessage::PlaylistUpdated { .. } => "PlaylistUpdated",
            SyncMessage::SongStatus { .. } => "SongStatus",
        }
    }

    pub fn play_status(entry: &PlaylistEntry, is_playing: bool) -> Self {
        SyncMessage::PlayStatus {
            owner_address: entry.song.owner_address.clone(),
            song_id: entry.song.song_id,
            entry_id: entry.entry_id,
            is_playing,
        }
    }

    pub fn song_status(entry: &PlaylistEntry) -> Self {
        SyncMessage::SongStatus {
            owner_address: entry.song.owner_address.clone(),
            song_id: entry.song.song_id,
            entry_id: entry.entry_id,
            loaded: entry.loaded,
            played: entry.played,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(ProtocolError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_role() {
        assert_eq!(
            SyncMessage::AddToPlaylist {
                owner_address: "A".to_string(),
                song_id: 1
            }
            .required_role(),
            Some(Role::Host)
        );
        assert_eq!(
            SyncMessage::PlaylistUpdated { entries: vec![] }.required_role(),
            Some(Role::Guest)
        );
        assert_eq!(SyncMessage::Skip.required_role(), None);
        assert_eq!(SyncMessage::RequestSong { song_id: 3 }.required_role(), None);
    }

    #[test]
    fn test_playlist_snapshot_survives_the_wire() {
        let mut entry = PlaylistEntry::new(SongMetadata::new(
            "AA:BB:CC:DD:EE:FF",
            i64::MAX,
            "Title",
            "Artist",
            "Album",
        ));
        entry.entry_id = i32::MAX;
        entry.loaded = true;

        let message = SyncMessage::PlaylistUpdated {
            entries: vec![entry],
        };
        let decoded = SyncMessage::decode(&message.encode().unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            SyncMessage::decode(b"not json"),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_status_helpers_copy_identity() {
        let mut entry = PlaylistEntry::new(SongMetadata::new("A", 5, "t", "a", "b"));
        entry.entry_id = 3;
        entry.played = true;

        assert_eq!(
            SyncMessage::song_status(&entry),
            SyncMessage::SongStatus {
                owner_address: "A".to_string(),
                song_id: 5,
                entry_id: 3,
                loaded: false,
                played: true,
            }
        );
        assert_eq!(
            SyncMessage::play_status(&entry, true),
            SyncMessage::PlayStatus {
                owner_address: "A".to_string(),
                song_id: 5,
                entry_id: 3,
                is_playing: true,
            }
        );
    }
}
