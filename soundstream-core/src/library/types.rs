//! Song metadata shared by the catalog and the play queue

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Metadata for a song available somewhere in the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SongMetadata {
    /// Address of the device holding the song's bytes
    pub owner_address: String,
    /// Id of the song on the owning device
    pub song_id: i64,
    /// Song title
    pub title: String,
    /// Artist name
    pub artist: String,
    /// Album name
    pub album: String,
}

/// Identity of a song across the whole session: (owner, song id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SongKey {
    pub owner_address: String,
    pub song_id: i64,
}

impl SongKey {
    pub fn new(owner_address: &str, song_id: i64) -> Self {
        Self {
            owner_address: owner_address.to_string(),
            song_id,
        }
    }
}

impl std::fmt::Display for SongKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.owner_address, self.song_id)
    }
}

impl SongMetadata {
    pub fn new(
        owner_address: &str,
        song_id: i64,
        title: &str,
        artist: &str,
        album: &str,
    ) -> Self {
        Self {
            owner_address: owner_address.to_string(),
            song_id,
            title: title.to_string(),
            artist: artist.to_string(),
            album: album.to_string(),
        }
    }

    pub fn key(&self) -> SongKey {
        SongKey::new(&self.owner_address, self.song_id)
    }

    /// Reassign the owner; only done when local songs enter the catalog
    pub fn with_owner(mut self, owner_address: &str) -> Self {
        self.owner_address = owner_address.to_string();
        self
    }

    pub fn is_owned_by(&self, address: &str) -> bool {
        self.owner_address == address
    }
}

/// Catalog ordering: artist, then album, then title.
///
/// Plain byte-wise string comparison, case-sensitive. Peers sort the same way,
/// so this must not become locale-aware.
pub fn alphabetical(a: &SongMetadata, b: &SongMetadata) -> Ordering {
    a.artist
        .cmp(&b.artist)
        .then_with(|| a.album.cmp(&b.album))
        .then_with(|| a.title.cmp(&b.title))
}
