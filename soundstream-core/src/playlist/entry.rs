//! Play queue entries

use serde::{Deserialize, Serialize};

use crate::library::SongMetadata;

/// Host-assigned entry id. 0 means "not yet assigned".
pub type EntryId = i32;

/// One slot in the play queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// Id assigned by the host when the entry was appended
    pub entry_id: EntryId,
    /// The queued song
    pub song: SongMetadata,
    /// Whether the host has the song's bytes ready
    pub loaded: bool,
    /// Whether the entry was played in the current pass
    pub played: bool,
}

impl PlaylistEntry {
    pub fn new(song: SongMetadata) -> Self {
        Self {
            entry_id: 0,
            song,
            loaded: false,
            played: false,
        }
    }

    /// Match on (owner, song id, entry id)
    pub fn is_same_entry(&self, owner_address: &str, song_id: i64, entry_id: EntryId) -> bool {
        self.entry_id == entry_id
            && self.song.song_id == song_id
            && self.song.owner_address == owner_address
    }

    /// Ready to be picked by the host
    pub fn is_available(&self) -> bool {
        self.loaded && !self.played
    }
}

impl std::fmt::Display for PlaylistEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}] {} - {} ({})",
            self.entry_id,
            self.song.artist,
            self.song.title,
            self.song.key()
        )
    }
}
