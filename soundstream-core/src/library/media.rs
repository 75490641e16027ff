//! Local media collaborator
//!
//! Enumerating device storage is platform work; the core only needs the list
//! of local songs and the bytes of one song on request.

use parking_lot::RwLock;
use thiserror::Error;

use super::types::SongMetadata;

/// Errors reading local media
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Song not found: {0}")]
    NotFound(i64),
}

/// Access to songs stored on this device
pub trait MediaLibrary: Send + Sync {
    /// Metadata for every song on the device. Owner addresses are assigned by
    /// the caller.
    fn list_local_songs(&self) -> Vec<SongMetadata>;

    /// Raw bytes of a local song
    fn load_song_bytes(&self, song_id: i64) -> Result<Vec<u8>, MediaError>;
}

/// In-memory media library, for embedding hosts without device storage
#[derive(Debug, Default)]
pub struct MemoryLibrary {
    songs: RwLock<Vec<(SongMetadata, Vec<u8>)>>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, song: SongMetadata, data: Vec<u8>) {
        self.songs.write().push((song, data));
    }

    pub fn with_songs(songs: impl IntoIterator<Item = (SongMetadata, Vec<u8>)>) -> Self {
        Self {
            songs: RwLock::new(songs.into_iter().collect()),
        }
    }
}

impl MediaLibrary for MemoryLibrary {
    fn list_local_songs(&self) -> Vec<SongMetadata> {
        self.songs.read().iter().map(|(song, _)| song.clone()).collect()
    }

    fn load_song_bytes(&self, song_id: i64) -> Result<Vec<u8>, MediaError> {
        self.songs
            .read()
            .iter()
            .find(|(song, _)| song.song_id == song_id)
            .map(|(_, data)| data.clone())
            .ok_or(MediaError::NotFound(song_id))
    }
}
