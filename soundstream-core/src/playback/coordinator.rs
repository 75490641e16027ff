//! Playback Coordinator
//!
//! Owns the play queue, the current-entry pointer and the playback sink.
//! On the host it picks songs and drives the local player; on a guest it
//! forwards requests to the host and mirrors the host's status.
//!
//! Everything here runs in the engine's serial domain.

use tracing::{debug, info, warn};

use super::player::{AudioPlayer, RemoteControl, Sink};
use crate::library::{SongKey, SongMetadata};
use crate::network::PeerHandle;
use crate::playlist::{EntryId, LoadedEntry, Loader, LoaderHandle, PlaylistEntry, QueueReplica, SongCache};
use crate::sync::{EventBus, Role, SessionEvent, SyncMessage, Transport};

pub struct PlaybackCoordinator {
    sink: Sink,
    transport: Transport,
    /// None before playback starts and between songs
    current: Option<EntryId>,
    /// `current` was picked while paused and has not reached the player yet
    preselected: bool,
    queue: QueueReplica,
    local: Box<dyn AudioPlayer>,
    peers: PeerHandle,
    events: EventBus,
    loader: Loader,
    loader_handle: Option<LoaderHandle>,
}

impl PlaybackCoordinator {
    /// Starts out as host with the local player; the loader is started
    /// separately with `start_loader`.
    pub fn new(local: Box<dyn AudioPlayer>, peers: PeerHandle, events: EventBus, loader: Loader) -> Self {
        Self {
            sink: Sink::Local,
            transport: Transport::Stopped,
            current: None,
            preselected: false,
            queue: QueueReplica::new(),
            local,
            peers,
            events,
            loader,
            loader_handle: None,
        }
    }

    pub fn role(&self) -> Role {
        match self.sink {
            Sink::Local => Role::Host,
            Sink::Remote(_) => Role::Guest,
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn is_playing(&self) -> bool {
        self.transport == Transport::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.transport == Transport::Paused
    }

    pub fn current_entry(&self) -> Option<&PlaylistEntry> {
        self.current.and_then(|id| self.queue.get(id))
    }

    pub fn queue(&self) -> &QueueReplica {
        &self.queue
    }

    pub fn queue_mut(&mut self) -> &mut QueueReplica {
        &mut self.queue
    }

    pub fn cache(&self) -> &SongCache {
        self.loader.cache()
    }

    // === Role transitions ===

    /// A host appeared: stop local playback and control the host remotely
    pub fn become_guest(&mut self, host_address: &str) {
        if self.role().is_host() && self.transport != Transport::Stopped {
            self.local.stop();
        }
        self.stop_loader();
        self.current = None;
        self.preselected = false;
        self.transport = Transport::Stopped;
        self.sink = Sink::Remote(RemoteControl::new(host_address, self.peers.clone()));

        info!("Now a guest of {}", host_address);
        self.events.publish(SessionEvent::RoleChanged(Role::Guest));
        self.events.publish(SessionEvent::CurrentSongChanged(None));
    }

    /// Our host went away: take over with the local player
    pub fn become_host(&mut self) {
        self.sink = Sink::Local;
        self.current = None;
        self.preselected = false;
        self.transport = Transport::Stopped;
        self.start_loader();

        info!("Now the host ({} entries queued)", self.queue.len());
        self.events.publish(SessionEvent::RoleChanged(Role::Host));
        self.events.publish(SessionEvent::CurrentSongChanged(None));
        self.publish_playlist();
    }

    /// Start the loader if it is not running and queue every entry whose
    /// bytes are not cached yet
    pub fn start_loader(&mut self) {
        if self.loader_handle.as_ref().is_some_and(LoaderHandle::is_running) {
            return;
        }
        let handle = self.loader.spawn();
        let cache = self.loader.cache().clone();
        for id in self.queue.ids().to_vec() {
            if let Some(entry) = self.queue.get_mut(id) {
                entry.loaded = cache.contains(&entry.song.key());
                if !entry.loaded {
                    handle.enqueue(id, entry.song.clone());
                }
            }
        }
        self.loader_handle = Some(handle);
    }

    pub fn stop_loader(&mut self) {
        if let Some(mut handle) = self.loader_handle.take() {
            handle.stop();
        }
    }

    // === Transport ===

    pub fn play(&mut self) {
        if self.queue.is_empty() {
            info!("Play requested but the queue is empty");
            self.events.publish(SessionEvent::QueueEmpty);
            return;
        }

        match (self.role(), self.transport) {
            (_, Transport::Paused) => self.resume(),
            (Role::Host, Transport::Playing) if self.current.is_some() => {
                debug!("Already playing");
            }
            (Role::Host, _) => {
                if self.current_is_available() || self.select_next() {
                    self.start_current();
                }
            }
            // The host picks the song and pushes its status back
            (Role::Guest, _) => self.with_remote(RemoteControl::play),
        }
    }

    pub fn pause(&mut self) {
        match self.role() {
            Role::Host => {
                if self.transport != Transport::Playing {
                    debug!("Pause ignored, not playing");
                    return;
                }
                self.local.pause();
                self.transport = Transport::Paused;
                self.events.publish(SessionEvent::PausedAudio);
                self.broadcast_play_status();
            }
            Role::Guest => self.with_remote(RemoteControl::pause),
        }
    }

    pub fn resume(&mut self) {
        match self.role() {
            Role::Host => {
                if self.transport != Transport::Paused {
                    debug!("Resume ignored, not paused");
                    return;
                }
                if std::mem::take(&mut self.preselected) {
                    if self.current_is_available() || self.select_next() {
                        self.start_current();
                    }
                    return;
                }
                self.local.resume();
                self.transport = Transport::Playing;
                self.events.publish(SessionEvent::PlayingAudio);
                self.broadcast_play_status();
            }
            Role::Guest => self.with_remote(RemoteControl::play),
        }
    }

    pub fn play_pause(&mut self) {
        if self.transport == Transport::Playing {
            self.pause();
        } else {
            self.play();
        }
    }

    pub fn skip(&mut self) {
        match self.role() {
            Role::Host => {
                if self.current.is_none() {
                    debug!("Nothing to skip");
                    return;
                }
                self.events.publish(SessionEvent::SkippingAudio);
                self.local.stop();
                self.song_finished();
            }
            Role::Guest => {
                self.events.publish(SessionEvent::SkippingAudio);
                self.with_remote(RemoteControl::skip);
            }
        }
    }

    /// Stop playback and forget the current entry. Only for running out of
    /// songs or clearing the queue; otherwise pause.
    pub fn stop(&mut self) {
        let was_active = self.transport != Transport::Stopped;
        let had_current = self.current.take().is_some();
        self.preselected = false;
        self.transport = Transport::Stopped;
        if self.role().is_host() {
            self.local.stop();
        }
        if had_current {
            self.events.publish(SessionEvent::CurrentSongChanged(None));
        }
        if was_active {
            self.events.publish(SessionEvent::PausedAudio);
        }
    }

    /// The local player reached the end of the current song.
    ///
    /// While paused the next entry is only picked; playback stays paused and
    /// the next `play` starts it.
    pub fn song_finished(&mut self) {
        if !self.role().is_host() {
            debug!("Ignoring song finished while a guest");
            return;
        }

        // A preselected entry never played, so it keeps its flag
        let preselected = std::mem::take(&mut self.preselected);
        if let Some(id) = self.current.filter(|_| !preselected) {
            let status = self.queue.get_mut(id).map(|entry| {
                entry.played = true;
                SyncMessage::song_status(entry)
            });
            if let Some(status) = status {
                self.broadcast(status);
            }
        }

        if self.transport != Transport::Paused {
            self.transport = Transport::Stopped;
            if self.queue.is_empty() {
                self.current = None;
            }
            self.play();
        } else if self.queue.is_empty() {
            self.stop();
            self.events.publish(SessionEvent::QueueEmpty);
        } else if self.select_next() {
            self.preselected = true;
            self.events
                .publish(SessionEvent::CurrentSongChanged(self.current_entry().cloned()));
            self.broadcast_play_status();
        }
        self.publish_playlist();
    }

    /// Guest: the host reported its current entry
    pub fn on_play_status(&mut self, owner_address: &str, song_id: i64, entry_id: EntryId, is_playing: bool) {
        match self.queue.find_by_identity(owner_address, song_id, entry_id) {
            Some(entry) => self.current = Some(entry.entry_id),
            None => warn!(
                "Play status for entry {} ({}#{}) which is not in the queue",
                entry_id, owner_address, song_id
            ),
        }

        // Focus only; the audio comes out of the host
        self.local.request_audio_focus();
        self.transport = if is_playing {
            Transport::Playing
        } else {
            Transport::Paused
        };

        self.events
            .publish(SessionEvent::CurrentSongChanged(self.current_entry().cloned()));
        self.events.publish(if is_playing {
            SessionEvent::PlayingAudio
        } else {
            SessionEvent::PausedAudio
        });
    }

    // === Queue mutations ===

    pub fn add_song(&mut self, song: SongMetadata) {
        match self.role() {
            Role::Host => {
                let Some(entry_id) = self.queue.append(PlaylistEntry::new(song.clone())) else {
                    return;
                };
                self.enqueue_load(entry_id, song);
                if let Some(entry) = self.queue.get(entry_id).cloned() {
                    self.events.publish(SessionEvent::SongAdded(entry));
                }
                self.publish_playlist();
                self.broadcast_playlist();
            }
            Role::Guest => self.send_to_host(SyncMessage::AddToPlaylist {
                owner_address: song.owner_address,
                song_id: song.song_id,
            }),
        }
    }

    /// Remove an entry. Applied locally in both roles so the user sees the
    /// result right away; a guest also asks the host to do it.
    pub fn remove_song(&mut self, entry: &PlaylistEntry) {
        let was_current = self.current == Some(entry.entry_id);
        let Some(removed) = self.queue.remove(entry) else {
            return;
        };
        self.events.publish(SessionEvent::SongRemoved(removed.clone()));
        self.publish_playlist();

        match self.role() {
            Role::Host => {
                if self.queue.is_empty() {
                    self.stop();
                } else if was_current {
                    self.skip();
                }
                self.broadcast_playlist();
            }
            Role::Guest => {
                if was_current {
                    self.current = None;
                }
                self.send_to_host(SyncMessage::RemoveFromPlaylist {
                    owner_address: removed.song.owner_address,
                    song_id: removed.song.song_id,
                    entry_id: removed.entry_id,
                });
            }
        }
    }

    pub fn bump_song(&mut self, entry: &PlaylistEntry) {
        match self.role() {
            Role::Host => {
                if self.queue.bump(entry, self.current) {
                    self.publish_playlist();
                    self.broadcast_playlist();
                }
            }
            Role::Guest => self.send_to_host(SyncMessage::BumpSongOnPlaylist {
                owner_address: entry.song.owner_address.clone(),
                song_id: entry.song.song_id,
                entry_id: entry.entry_id,
            }),
        }
    }

    pub fn clear_playlist(&mut self) {
        self.stop();
        self.queue.clear();
        self.publish_playlist();
        if self.role().is_host() {
            self.broadcast_playlist();
        }
    }

    /// Guest: replace the queue with the host's
    pub fn apply_snapshot(&mut self, entries: Vec<PlaylistEntry>) {
        let highest = self.queue.apply_snapshot(entries);
        debug!(
            "Applied playlist snapshot: {} entries, highest id {}",
            self.queue.len(),
            highest
        );

        if let Some(id) = self.current {
            if !self.queue.contains(id) {
                self.current = None;
            }
        }
        if self.queue.is_empty() {
            self.stop();
        }
        self.publish_playlist();
    }

    /// Guest: the host changed the flags of one entry
    pub fn apply_song_status(
        &mut self,
        owner_address: &str,
        song_id: i64,
        entry_id: EntryId,
        loaded: bool,
        played: bool,
    ) {
        match self.queue.get_mut(entry_id) {
            Some(entry) if entry.is_same_entry(owner_address, song_id, entry_id) => {
                entry.loaded = loaded;
                entry.played = played;
            }
            _ => {
                warn!(
                    "Song status for entry {} ({}#{}) which is not in the queue",
                    entry_id, owner_address, song_id
                );
                return;
            }
        }
        self.publish_playlist();
    }

    /// Host: the loader finished fetching an entry's bytes
    pub fn entry_loaded(&mut self, loaded: LoadedEntry) {
        if !self.role().is_host() {
            debug!("Ignoring load completion while a guest");
            return;
        }
        let status = match self.queue.get_mut(loaded.entry_id) {
            Some(entry) if entry.song.key() == loaded.key => {
                entry.loaded = true;
                SyncMessage::song_status(entry)
            }
            _ => {
                debug!("Loaded entry {} is no longer queued", loaded.entry_id);
                return;
            }
        };
        self.broadcast(status);
        self.publish_playlist();
    }

    /// Host: bytes for a song we requested arrived
    pub fn song_received(&mut self, from: &str, song_id: i64, data: Vec<u8>) {
        let key = SongKey::new(from, song_id);
        match &self.loader_handle {
            Some(handle) => handle.song_received(key, data),
            None => self.loader.cache().insert(key, data),
        }
    }

    /// A peer left: drop its entries and cached bytes. If its song was
    /// playing, playback moves on.
    pub fn owner_disconnected(&mut self, address: &str) {
        let dropped = self.loader.cache().remove_owner(address);
        if let Some(handle) = &self.loader_handle {
            handle.forget_owner(address);
        }

        let current_removed = self
            .current_entry()
            .is_some_and(|entry| entry.song.is_owned_by(address));
        let removed = self.queue.remove_by_owner(address);
        if removed.is_empty() {
            return;
        }
        info!(
            "Dropped {} queue entries and {} cached songs from {}",
            removed.len(),
            dropped,
            address
        );

        if current_removed {
            match self.role() {
                Role::Host if self.queue.is_empty() => self.stop(),
                Role::Host => self.skip(),
                Role::Guest => self.current = None,
            }
        }
        self.publish_playlist();
        if self.role().is_host() {
            self.broadcast_playlist();
        }
    }

    /// Host: bring a new guest up to date with the queue and current song
    pub fn guest_connected(&self, address: &str) {
        self.send(
            address,
            SyncMessage::PlaylistUpdated {
                entries: self.queue.to_ordered_list(),
            },
        );
        if let Some(entry) = self.current_entry() {
            self.send(address, SyncMessage::play_status(entry, self.is_playing()));
        }
    }

    // === Helpers ===

    fn current_is_available(&self) -> bool {
        self.current_entry().is_some_and(PlaylistEntry::is_available)
    }

    /// Host: point `current` at the next available entry, starting the queue
    /// over once if everything was played
    fn select_next(&mut self) -> bool {
        let mut next = self.queue.next_available(self.current);
        if next.is_none() && self.queue.all_played() {
            info!("Every entry played, starting the queue over");
            self.reset_playlist();
            self.events.publish(SessionEvent::PlaylistFinished);
            next = self.queue.next_available(None);
        }

        match next {
            Some(id) => {
                self.current = Some(id);
                true
            }
            None => {
                warn!("No loaded songs ready to play");
                self.stop();
                self.events.publish(SessionEvent::NoSongsReady);
                false
            }
        }
    }

    /// Host: hand the current entry to the local player
    fn start_current(&mut self) {
        let Some(entry) = self.current_entry().cloned() else {
            return;
        };
        let Some(data) = self.loader.cache().get(&entry.song.key()) else {
            warn!("Bytes for {} are not cached, reloading", entry);
            if let Some(queued) = self.queue.get_mut(entry.entry_id) {
                queued.loaded = false;
            }
            self.enqueue_load(entry.entry_id, entry.song.clone());
            self.stop();
            self.events.publish(SessionEvent::NoSongsReady);
            return;
        };

        info!("Playing {}", entry);
        self.preselected = false;
        self.local.play(&entry.song, data);
        self.transport = Transport::Playing;
        self.events
            .publish(SessionEvent::CurrentSongChanged(Some(entry.clone())));
        self.events.publish(SessionEvent::PlayingAudio);
        self.broadcast(SyncMessage::play_status(&entry, true));
    }

    fn reset_playlist(&mut self) {
        self.queue.reset();
        let unloaded: Vec<(EntryId, SongMetadata)> = self
            .queue
            .to_ordered_list()
            .into_iter()
            .filter(|entry| !entry.loaded)
            .map(|entry| (entry.entry_id, entry.song))
            .collect();
        for (entry_id, song) in unloaded {
            self.enqueue_load(entry_id, song);
        }
        self.broadcast_playlist();
    }

    fn enqueue_load(&self, entry_id: EntryId, song: SongMetadata) {
        match &self.loader_handle {
            Some(handle) => handle.enqueue(entry_id, song),
            None => debug!("Loader not running, entry {} not queued for loading", entry_id),
        }
    }

    fn broadcast_play_status(&self) {
        if let Some(entry) = self.current_entry() {
            self.broadcast(SyncMessage::play_status(entry, self.is_playing()));
        }
    }

    fn publish_playlist(&self) {
        self.events
            .publish(SessionEvent::PlaylistUpdated(self.queue.to_ordered_list()));
    }

    fn broadcast_playlist(&self) {
        self.broadcast(SyncMessage::PlaylistUpdated {
            entries: self.queue.to_ordered_list(),
        });
    }

    fn broadcast(&self, message: SyncMessage) {
        if let Err(e) = self.peers.broadcast(message) {
            debug!("Broadcast error: {}", e);
        }
    }

    fn send(&self, to: &str, message: SyncMessage) {
        if let Err(e) = self.peers.send(to, message) {
            debug!("Send to {} failed: {}", to, e);
        }
    }

    pub(crate) fn send_to_host(&self, message: SyncMessage) {
        match &self.sink {
            Sink::Remote(remote) => remote.send(message),
            Sink::Local => warn!("No host to send {} to", message.kind()),
        }
    }

    fn with_remote(&self, f: impl FnOnce(&RemoteControl)) {
        match &self.sink {
            Sink::Remote(remote) => f(remote),
            Sink::Local => warn!("Not a guest, no host to control"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::MemoryLibrary;
    use crate::network::PeerCommand;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tokio::sync::{broadcast, mpsc};

    const ME: &str = "ME";

    struct RecordingPlayer {
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl AudioPlayer for RecordingPlayer {
        fn play(&mut self, song: &SongMetadata, _data: Arc<Vec<u8>>) {
            self.calls.lock().push(format!("play {}", song.title));
        }
        fn pause(&mut self) {
            self.calls.lock().push("pause".to_string());
        }
        fn resume(&mut self) {
            self.calls.lock().push("resume".to_string());
        }
        fn stop(&mut self) {
            self.calls.lock().push("stop".to_string());
        }
        fn request_audio_focus(&mut self) {
            self.calls.lock().push("focus".to_string());
        }
    }

    struct Fixture {
        coordinator: PlaybackCoordinator,
        peer_rx: mpsc::UnboundedReceiver<PeerCommand>,
        events_rx: broadcast::Receiver<SessionEvent>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let (peers, peer_rx) = PeerHandle::channel();
            let events = EventBus::new(256);
            let events_rx = events.subscribe();
            let (loaded_tx, _) = mpsc::unbounded_channel();
            let loader = Loader::new(
                ME.to_string(),
                Arc::new(MemoryLibrary::new()),
                peers.clone(),
                SongCache::new(),
                loaded_tx,
            );
            let calls = Arc::new(Mutex::new(Vec::new()));
            let player = RecordingPlayer {
                calls: Arc::clone(&calls),
            };
            Self {
                coordinator: PlaybackCoordinator::new(Box::new(player), peers, events, loader),
                peer_rx,
                events_rx,
                calls,
            }
        }

        /// Queue a song on the host and make it ready to play
        fn add_ready(&mut self, owner: &str, song_id: i64) -> EntryId {
            let song = SongMetadata::new(owner, song_id, &format!("Song{}", song_id), "Artist", "Album");
            self.coordinator.add_song(song.clone());
            let entry_id = self.coordinator.queue().last_entry_id();
            self.coordinator.queue_mut().get_mut(entry_id).unwrap().loaded = true;
            self.coordinator.cache().insert(song.key(), vec![0; 4]);
            entry_id
        }

        fn sent(&mut self) -> Vec<PeerCommand> {
            let mut sent = Vec::new();
            while let Ok(command) = self.peer_rx.try_recv() {
                sent.push(command);
            }
            sent
        }

        fn events(&mut self) -> Vec<SessionEvent> {
            let mut events = Vec::new();
            while let Ok(event) = self.events_rx.try_recv() {
                events.push(event);
            }
            events
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().clone()
        }
    }

    fn has_event(events: &[SessionEvent], wanted: fn(&SessionEvent) -> bool) -> bool {
        events.iter().any(wanted)
    }

    #[test]
    fn test_play_empty_queue_signals_queue_empty() {
        let mut f = Fixture::new();
        f.coordinator.play();

        let events = f.events();
        assert!(has_event(&events, |e| matches!(e, SessionEvent::QueueEmpty)));
        assert!(!has_event(&events, |e| matches!(e, SessionEvent::NoSongsReady)));
        assert!(f.calls().is_empty());
    }

    #[test]
    fn test_play_with_nothing_loaded_signals_no_songs_ready() {
        let mut f = Fixture::new();
        f.coordinator
            .add_song(SongMetadata::new("GUEST", 1, "Remote", "Artist", "Album"));
        f.events();

        f.coordinator.play();

        let events = f.events();
        assert!(has_event(&events, |e| matches!(e, SessionEvent::NoSongsReady)));
        assert!(!has_event(&events, |e| matches!(e, SessionEvent::QueueEmpty)));
        assert_eq!(f.coordinator.transport(), Transport::Stopped);
        assert!(f.coordinator.current_entry().is_none());
    }

    #[test]
    fn test_song_finished_advances_to_next() {
        let mut f = Fixture::new();
        let first = f.add_ready("A", 1);
        let second = f.add_ready("B", 2);

        f.coordinator.play();
        assert_eq!(f.coordinator.current_entry().map(|e| e.entry_id), Some(first));
        f.sent();

        f.coordinator.song_finished();

        assert!(f.coordinator.queue().get(first).unwrap().played);
        assert_eq!(f.coordinator.current_entry().map(|e| e.entry_id), Some(second));
        assert!(f.coordinator.is_playing());
        assert_eq!(f.calls(), vec!["play Song1", "play Song2"]);

        let sent = f.sent();
        assert!(sent.iter().any(|c| matches!(
            c,
            PeerCommand::Broadcast { message: SyncMessage::SongStatus { entry_id, played: true, .. } }
                if *entry_id == first
        )));
        assert!(sent.iter().any(|c| matches!(
            c,
            PeerCommand::Broadcast { message: SyncMessage::PlayStatus { entry_id, is_playing: true, .. } }
                if *entry_id == second
        )));
    }

    #[test]
    fn test_song_finished_while_paused_preselects_next() {
        let mut f = Fixture::new();
        f.add_ready("A", 1);
        let second = f.add_ready("A", 2);

        f.coordinator.play();
        f.coordinator.pause();
        f.coordinator.song_finished();

        assert_eq!(f.coordinator.current_entry().map(|e| e.entry_id), Some(second));
        assert!(!f.coordinator.is_playing());
        assert_eq!(f.calls(), vec!["play Song1", "pause"]);

        // Play starts the preselected entry
        f.coordinator.play();
        assert_eq!(f.calls().last().map(String::as_str), Some("play Song2"));
        assert_eq!(f.coordinator.current_entry().map(|e| e.entry_id), Some(second));
    }

    #[test]
    fn test_skip_while_paused_stays_paused() {
        let mut f = Fixture::new();
        let first = f.add_ready("A", 1);
        let second = f.add_ready("A", 2);
        let third = f.add_ready("A", 3);

        f.coordinator.play();
        f.coordinator.pause();
        f.coordinator.skip();
        f.coordinator.skip();

        assert!(f.coordinator.is_paused());
        assert_eq!(f.coordinator.current_entry().map(|e| e.entry_id), Some(third));
        assert!(f.coordinator.queue().get(first).unwrap().played);
        assert!(!f.coordinator.queue().get(second).unwrap().played);
        assert_eq!(f.calls(), vec!["play Song1", "pause", "stop", "stop"]);

        f.coordinator.play();
        assert!(f.coordinator.is_playing());
        assert_eq!(f.calls().last().map(String::as_str), Some("play Song3"));
    }

    #[test]
    fn test_all_played_starts_over_once() {
        let mut f = Fixture::new();
        let first = f.add_ready("A", 1);
        let second = f.add_ready("A", 2);
        for id in [first, second] {
            f.coordinator.queue_mut().get_mut(id).unwrap().played = true;
        }
        f.events();

        f.coordinator.play();

        let events = f.events();
        let finished = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::PlaylistFinished))
            .count();
        assert_eq!(finished, 1);
        assert_eq!(f.coordinator.current_entry().map(|e| e.entry_id), Some(first));
        assert!(!f.coordinator.queue().get(second).unwrap().played);
    }

    #[test]
    fn test_pause_and_resume_push_status() {
        let mut f = Fixture::new();
        let entry_id = f.add_ready("A", 1);
        f.coordinator.play();
        f.sent();

        f.coordinator.pause();
        assert!(f.coordinator.is_paused());
        f.coordinator.play();
        assert!(f.coordinator.is_playing());

        let statuses: Vec<bool> = f
            .sent()
            .into_iter()
            .filter_map(|c| match c {
                PeerCommand::Broadcast {
                    message: SyncMessage::PlayStatus { entry_id: id, is_playing, .. },
                } if id == entry_id => Some(is_playing),
                _ => None,
            })
            .collect();
        assert_eq!(statuses, vec![false, true]);
        assert_eq!(f.calls(), vec!["play Song1", "pause", "resume"]);
    }

    #[test]
    fn test_remove_current_skips_to_next() {
        let mut f = Fixture::new();
        let first = f.add_ready("A", 1);
        let second = f.add_ready("A", 2);
        f.coordinator.play();

        let current = f.coordinator.queue().get(first).cloned().unwrap();
        f.coordinator.remove_song(&current);

        assert_eq!(f.coordinator.current_entry().map(|e| e.entry_id), Some(second));
        assert_eq!(f.coordinator.queue().len(), 1);
        assert!(f.sent().iter().any(|c| matches!(
            c,
            PeerCommand::Broadcast { message: SyncMessage::PlaylistUpdated { entries } } if entries.len() == 1
        )));
    }

    #[test]
    fn test_remove_last_entry_stops() {
        let mut f = Fixture::new();
        let only = f.add_ready("A", 1);
        f.coordinator.play();

        let entry = f.coordinator.queue().get(only).cloned().unwrap();
        f.coordinator.remove_song(&entry);

        assert!(f.coordinator.queue().is_empty());
        assert_eq!(f.coordinator.transport(), Transport::Stopped);
        assert!(f.coordinator.current_entry().is_none());
        assert_eq!(f.calls().last().map(String::as_str), Some("stop"));
    }

    #[test]
    fn test_bump_plays_next() {
        let mut f = Fixture::new();
        let first = f.add_ready("A", 1);
        f.add_ready("A", 2);
        let third = f.add_ready("A", 3);
        f.coordinator.play();

        let entry = f.coordinator.queue().get(third).cloned().unwrap();
        f.coordinator.bump_song(&entry);
        assert_eq!(f.coordinator.queue().ids(), &[first, third, 2]);

        f.coordinator.song_finished();
        assert_eq!(f.coordinator.current_entry().map(|e| e.entry_id), Some(third));
    }

    #[test]
    fn test_guest_requests_go_upstream() {
        let mut f = Fixture::new();
        f.coordinator.become_guest("HOST");
        f.sent();

        f.coordinator
            .add_song(SongMetadata::new(ME, 4, "Mine", "Artist", "Album"));
        f.coordinator.play();
        f.coordinator.skip();
        f.coordinator.pause();

        // Nothing is added locally, and play on an empty queue sends nothing
        assert!(f.coordinator.queue().is_empty());
        let sent = f.sent();
        assert_eq!(sent.len(), 3, "{:?}", sent);
        assert!(matches!(
            &sent[0],
            PeerCommand::Send { to, message: SyncMessage::AddToPlaylist { owner_address, song_id: 4 } }
                if to == "HOST" && owner_address == ME
        ));
        assert!(matches!(
            &sent[1],
            PeerCommand::Send { to, message: SyncMessage::Skip } if to == "HOST"
        ));
        assert!(matches!(
            &sent[2],
            PeerCommand::Send { to, message: SyncMessage::Pause } if to == "HOST"
        ));
    }

    #[test]
    fn test_guest_remove_applies_locally_and_requests() {
        let mut f = Fixture::new();
        f.coordinator.become_guest("HOST");
        let mut remote = PlaylistEntry::new(SongMetadata::new("HOST", 1, "t", "a", "b"));
        remote.entry_id = 7;
        f.coordinator.apply_snapshot(vec![remote.clone()]);
        f.sent();

        f.coordinator.remove_song(&remote);

        assert!(f.coordinator.queue().is_empty());
        assert!(matches!(
            f.sent().as_slice(),
            [PeerCommand::Send { to, message: SyncMessage::RemoveFromPlaylist { entry_id: 7, .. } }]
                if to == "HOST"
        ));
    }

    #[test]
    fn test_on_play_status_mirrors_host() {
        let mut f = Fixture::new();
        f.coordinator.become_guest("HOST");
        let mut remote = PlaylistEntry::new(SongMetadata::new("HOST", 1, "t", "a", "b"));
        remote.entry_id = 2;
        f.coordinator.apply_snapshot(vec![remote]);
        f.events();

        f.coordinator.on_play_status("HOST", 1, 2, true);

        assert_eq!(f.coordinator.current_entry().map(|e| e.entry_id), Some(2));
        assert!(f.coordinator.is_playing());
        assert_eq!(f.calls(), vec!["focus"]);
        let events = f.events();
        assert!(has_event(&events, |e| matches!(
            e,
            SessionEvent::CurrentSongChanged(Some(entry)) if entry.entry_id == 2
        )));
        assert!(has_event(&events, |e| matches!(e, SessionEvent::PlayingAudio)));
    }

    #[test]
    fn test_apply_song_status() {
        let mut f = Fixture::new();
        f.coordinator.become_guest("HOST");
        let mut remote = PlaylistEntry::new(SongMetadata::new("HOST", 1, "t", "a", "b"));
        remote.entry_id = 2;
        f.coordinator.apply_snapshot(vec![remote]);

        f.coordinator.apply_song_status("HOST", 1, 2, true, true);
        let entry = f.coordinator.queue().get(2).unwrap();
        assert!(entry.loaded && entry.played);

        // Unknown entries are ignored
        f.coordinator.apply_song_status("HOST", 9, 2, false, false);
        assert!(f.coordinator.queue().get(2).unwrap().loaded);
    }

    #[test]
    fn test_empty_snapshot_stops() {
        let mut f = Fixture::new();
        f.coordinator.become_guest("HOST");
        let mut remote = PlaylistEntry::new(SongMetadata::new("HOST", 1, "t", "a", "b"));
        remote.entry_id = 1;
        f.coordinator.apply_snapshot(vec![remote]);
        f.coordinator.on_play_status("HOST", 1, 1, true);

        f.coordinator.apply_snapshot(vec![]);

        assert_eq!(f.coordinator.transport(), Transport::Stopped);
        assert!(f.coordinator.current_entry().is_none());
    }

    #[test]
    fn test_owner_disconnected_releases_current_song() {
        let mut f = Fixture::new();
        f.add_ready("GONE", 1);
        let kept = f.add_ready("STAY", 1);
        f.coordinator.play();

        f.coordinator.owner_disconnected("GONE");

        assert_eq!(f.coordinator.queue().ids(), &[kept]);
        assert_eq!(f.coordinator.current_entry().map(|e| e.entry_id), Some(kept));
        assert!(f.coordinator.cache().get(&SongKey::new("GONE", 1)).is_none());
        assert_eq!(f.calls(), vec!["play Song1", "stop", "play Song1"]);
    }

    #[test]
    fn test_entry_loaded_broadcasts_status() {
        let mut f = Fixture::new();
        let song = SongMetadata::new("A", 1, "t", "a", "b");
        f.coordinator.add_song(song.clone());
        f.sent();

        f.coordinator.entry_loaded(LoadedEntry {
            entry_id: 1,
            key: song.key(),
        });

        assert!(f.coordinator.queue().get(1).unwrap().loaded);
        assert!(matches!(
            f.sent().as_slice(),
            [PeerCommand::Broadcast { message: SyncMessage::SongStatus { entry_id: 1, loaded: true, .. } }]
        ));

        // A stale report for a different song is ignored
        f.coordinator.entry_loaded(LoadedEntry {
            entry_id: 1,
            key: SongKey::new("B", 1),
        });
        assert!(f.sent().is_empty());
    }

    #[test]
    fn test_guest_connected_gets_queue_and_status() {
        let mut f = Fixture::new();
        let entry_id = f.add_ready("A", 1);
        f.coordinator.play();
        f.sent();

        f.coordinator.guest_connected("NEW");

        let sent = f.sent();
        assert!(matches!(
            sent.as_slice(),
            [
                PeerCommand::Send { message: SyncMessage::PlaylistUpdated { .. }, .. },
                PeerCommand::Send { message: SyncMessage::PlayStatus { entry_id: id, is_playing: true, .. }, .. },
            ] if *id == entry_id
        ));
    }

    #[tokio::test]
    async fn test_host_takeover_continues_after_snapshot_ids() {
        let mut f = Fixture::new();
        f.coordinator.queue_mut().append(PlaylistEntry::new(SongMetadata::new(ME, 1, "t", "a", "b")));
        f.coordinator.become_guest("HOST");

        let mut remote = PlaylistEntry::new(SongMetadata::new("A", 5, "t", "a", "b"));
        remote.entry_id = 3;
        f.coordinator.apply_snapshot(vec![remote]);

        f.coordinator.become_host();
        f.coordinator
            .add_song(SongMetadata::new(ME, 2, "New", "Artist", "Album"));

        assert_eq!(f.coordinator.role(), Role::Host);
        assert_eq!(f.coordinator.queue().ids(), &[3, 4]);
        f.coordinator.stop_loader();
    }

    #[tokio::test]
    async fn test_host_takeover_with_exhausted_ids_refuses_add() {
        let mut f = Fixture::new();
        f.coordinator.become_guest("HOST");

        let mut remote = PlaylistEntry::new(SongMetadata::new("A", 5, "t", "a", "b"));
        remote.entry_id = EntryId::MAX;
        f.coordinator.apply_snapshot(vec![remote]);

        f.coordinator.become_host();
        f.events();
        f.coordinator
            .add_song(SongMetadata::new(ME, 2, "New", "Artist", "Album"));

        assert_eq!(f.coordinator.queue().ids(), &[EntryId::MAX]);
        assert!(!has_event(&f.events(), |e| matches!(e, SessionEvent::SongAdded(_))));
        f.coordinator.stop_loader();
    }
}
