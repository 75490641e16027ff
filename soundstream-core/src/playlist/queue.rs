//! Play Queue Replica
//!
//! Entries live in an arena keyed by entry id; `order` holds the queue order.
//! The host mutates the queue and assigns ids; guests replace it wholesale from
//! playlist snapshots.

use std::collections::HashMap;

use tracing::{debug, error, warn};

use super::entry::{EntryId, PlaylistEntry};
use crate::library::SongMetadata;

#[derive(Debug, Default)]
pub struct QueueReplica {
    order: Vec<EntryId>,
    entries: HashMap<EntryId, PlaylistEntry>,
    /// Last id handed out (or seen in a snapshot)
    last_entry_id: EntryId,
}

impl QueueReplica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next id and append to the tail.
    ///
    /// Returns `None` without queueing anything once the id space is used up.
    pub fn append(&mut self, mut entry: PlaylistEntry) -> Option<EntryId> {
        let Some(entry_id) = self.last_entry_id.checked_add(1) else {
            error!("Entry ids exhausted at {}, not queueing {}", self.last_entry_id, entry);
            return None;
        };
        self.last_entry_id = entry_id;
        entry.entry_id = entry_id;
        debug!("Queue append {}", entry);
        self.order.push(entry_id);
        self.entries.insert(entry_id, entry);
        Some(entry_id)
    }

    /// Remove by (owner, song id, entry id)
    pub fn remove(&mut self, entry: &PlaylistEntry) -> Option<PlaylistEntry> {
        if self.find_by_song_and_entry_id(&entry.song, entry.entry_id).is_none() {
            warn!("Attempting to remove an entry that is not in the queue: {}", entry);
            return None;
        }
        self.order.retain(|&id| id != entry.entry_id);
        self.entries.remove(&entry.entry_id)
    }

    /// Move `entry` to play next: right after `current`, or to the head if
    /// nothing is current. Bumping the current entry does nothing.
    pub fn bump(&mut self, entry: &PlaylistEntry, current: Option<EntryId>) -> bool {
        let entry_id = entry.entry_id;
        if current == Some(entry_id) {
            debug!("Not bumping the current entry {}", entry);
            return false;
        }
        let Some(from) = self.position(entry_id) else {
            warn!("Attempting to bump an entry that is not in the queue: {}", entry);
            return false;
        };

        self.order.remove(from);
        let target = current
            .and_then(|id| self.position(id))
            .map(|position| position + 1)
            .unwrap_or(0);
        self.order.insert(target, entry_id);
        true
    }

    pub fn find_by_identity(
        &self,
        owner_address: &str,
        song_id: i64,
        entry_id: EntryId,
    ) -> Option<&PlaylistEntry> {
        self.entries
            .get(&entry_id)
            .filter(|entry| entry.is_same_entry(owner_address, song_id, entry_id))
    }

    pub fn find_by_song_and_entry_id(
        &self,
        song: &SongMetadata,
        entry_id: EntryId,
    ) -> Option<&PlaylistEntry> {
        self.find_by_identity(&song.owner_address, song.song_id, entry_id)
    }

    pub fn get(&self, entry_id: EntryId) -> Option<&PlaylistEntry> {
        self.entries.get(&entry_id)
    }

    pub fn get_mut(&mut self, entry_id: EntryId) -> Option<&mut PlaylistEntry> {
        self.entries.get_mut(&entry_id)
    }

    pub fn contains(&self, entry_id: EntryId) -> bool {
        self.entries.contains_key(&entry_id)
    }

    /// Replace the queue with a host snapshot.
    ///
    /// Returns the highest entry id seen; the id counter is advanced to at
    /// least that value so a later host takeover never reuses an id.
    pub fn apply_snapshot(&mut self, snapshot: Vec<PlaylistEntry>) -> EntryId {
        self.order.clear();
        self.entries.clear();

        let mut highest = 0;
        for entry in snapshot {
            if self.entries.contains_key(&entry.entry_id) {
                warn!("Duplicate entry id in playlist snapshot: {}", entry);
                continue;
            }
            highest = highest.max(entry.entry_id);
            self.order.push(entry.entry_id);
            self.entries.insert(entry.entry_id, entry);
        }

        self.fast_forward(highest);
        highest
    }

    /// Make sure the next assigned id is greater than `entry_id`
    pub fn fast_forward(&mut self, entry_id: EntryId) {
        self.last_entry_id = self.last_entry_id.max(entry_id);
    }

    pub fn last_entry_id(&self) -> EntryId {
        self.last_entry_id
    }

    /// Drop every entry whose song belongs to `address`
    pub fn remove_by_owner(&mut self, address: &str) -> Vec<PlaylistEntry> {
        let removed_ids: Vec<EntryId> = self
            .order
            .iter()
            .copied()
            .filter(|id| {
                self.entries
                    .get(id)
                    .map(|entry| entry.song.is_owned_by(address))
                    .unwrap_or(false)
            })
            .collect();
        if removed_ids.is_empty() {
            return Vec::new();
        }

        self.order.retain(|id| !removed_ids.contains(id));
        removed_ids
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .collect()
    }

    /// First available entry after `current`, wrapping around once.
    ///
    /// `current` itself is never returned. Available means loaded and not yet
    /// played.
    pub fn next_available(&self, current: Option<EntryId>) -> Option<EntryId> {
        let len = self.order.len();
        let (start, scan) = match current.and_then(|id| self.position(id)) {
            Some(position) => (position + 1, len - 1),
            None => (0, len),
        };

        (0..scan)
            .map(|offset| self.order[(start + offset) % len])
            .find(|id| {
                self.entries
                    .get(id)
                    .map(PlaylistEntry::is_available)
                    .unwrap_or(false)
            })
    }

    /// Every entry has been played
    pub fn all_played(&self) -> bool {
        !self.entries.is_empty() && self.entries.values().all(|entry| entry.played)
    }

    /// Clear the played flag on every entry
    pub fn reset(&mut self) {
        for entry in self.entries.values_mut() {
            entry.played = false;
        }
    }

    /// Drop everything, including the id counter
    pub fn clear(&mut self) {
        self.order.clear();
        self.entries.clear();
        self.last_entry_id = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Entry ids in queue order
    pub fn ids(&self) -> &[EntryId] {
        &self.order
    }

    pub fn to_ordered_list(&self) -> Vec<PlaylistEntry> {
        self.order
            .iter()
            .filter_map(|id| self.entries.get(id).cloned())
            .collect()
    }

    fn position(&self, entry_id: EntryId) -> Option<usize> {
        self.order.iter().position(|&id| id == entry_id)
    }
}
