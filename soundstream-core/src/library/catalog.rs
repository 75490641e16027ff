//! Merged song catalog
//!
//! Holds every song known to the session, keyed by (owner, song id) and kept
//! in alphabetical order. Local library loading and inbound library messages
//! both mutate it, possibly at the same time, so every read-modify-write runs
//! under one mutex.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use super::types::{alphabetical, SongKey, SongMetadata};

/// Catalog state: ordered songs plus a key -> position index.
///
/// The index always covers exactly the keys present in `songs`.
#[derive(Debug, Default)]
struct CatalogInner {
    index: HashMap<SongKey, usize>,
    songs: Vec<SongMetadata>,
}

impl CatalogInner {
    /// Stable sort followed by a full reindex
    fn order_alphabetically(&mut self) {
        self.songs.sort_by(alphabetical);
        self.reindex();
    }

    fn reindex(&mut self) {
        self.index = self
            .songs
            .iter()
            .enumerate()
            .map(|(i, song)| (song.key(), i))
            .collect();
    }
}

/// The session-wide song catalog
#[derive(Debug, Default)]
pub struct CatalogReplica {
    inner: Mutex<CatalogInner>,
}

impl CatalogReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert songs by identity, then re-sort the whole catalog.
    ///
    /// Returns true if any song was added or replaced with a different value.
    pub fn merge(&self, songs: impl IntoIterator<Item = SongMetadata>) -> bool {
        let mut inner = self.inner.lock();
        let mut changed = false;

        for song in songs {
            let key = song.key();
            match inner.index.get(&key).copied() {
                Some(position) => {
                    if inner.songs[position] != song {
                        inner.songs[position] = song;
                        changed = true;
                    }
                }
                None => {
                    let position = inner.songs.len();
                    inner.songs.push(song);
                    inner.index.insert(key, position);
                    changed = true;
                }
            }
        }

        inner.order_alphabetically();
        debug!("Catalog merge: {} songs, changed={}", inner.songs.len(), changed);
        changed
    }

    /// Drop every song owned by `address`
    pub fn remove_by_owner(&self, address: &str) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.songs.len();
        inner.songs.retain(|song| !song.is_owned_by(address));
        let removed = before - inner.songs.len();
        if removed == 0 {
            return false;
        }
        inner.reindex();
        debug!("Removed {} songs owned by {}", removed, address);
        true
    }

    /// Keep only songs owned by `my_address`
    pub fn clear_external(&self, my_address: &str) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.songs.len();
        inner.songs.retain(|song| song.is_owned_by(my_address));
        if inner.songs.len() == before {
            return false;
        }
        inner.order_alphabetically();
        true
    }

    pub fn lookup(&self, owner_address: &str, song_id: i64) -> Option<SongMetadata> {
        let inner = self.inner.lock();
        inner
            .index
            .get(&SongKey::new(owner_address, song_id))
            .map(|&position| inner.songs[position].clone())
    }

    /// Ordered copy of the catalog
    pub fn snapshot(&self) -> Vec<SongMetadata> {
        self.inner.lock().songs.clone()
    }

    /// Ordered copy of the songs owned by `my_address`
    pub fn my_entries(&self, my_address: &str) -> Vec<SongMetadata> {
        self.inner
            .lock()
            .songs
            .iter()
            .filter(|song| song.is_owned_by(my_address))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().songs.is_empty()
    }
}
