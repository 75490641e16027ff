//! Background song loader
//!
//! Runs on its own task on the host. Songs owned by this device are read from
//! the media library; songs owned by guests are requested from their owner and
//! arrive later as transfers. Loaded bytes go into the shared `SongCache` and
//! completions are reported by entry id, so the serial domain flips the
//! `loaded` flag itself.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::entry::EntryId;
use crate::library::{MediaLibrary, SongKey, SongMetadata};
use crate::network::PeerHandle;
use crate::sync::SyncMessage;

/// Song bytes shared between the loader and the player
#[derive(Clone, Default)]
pub struct SongCache {
    inner: Arc<Mutex<HashMap<SongKey, Arc<Vec<u8>>>>>,
}

impl SongCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &SongKey) -> Option<Arc<Vec<u8>>> {
        self.inner.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &SongKey) -> bool {
        self.inner.lock().contains_key(key)
    }

    pub fn insert(&self, key: SongKey, data: Vec<u8>) {
        self.inner.lock().insert(key, Arc::new(data));
    }

    /// Drop every song owned by `address`, returning how many were dropped
    pub fn remove_owner(&self, address: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.len();
        inner.retain(|key, _| key.owner_address != address);
        before - inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// A queue entry whose song is now in the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedEntry {
    pub entry_id: EntryId,
    pub key: SongKey,
}

#[derive(Debug)]
enum LoaderCommand {
    Load { entry_id: EntryId, song: SongMetadata },
    Received { key: SongKey, data: Vec<u8> },
    ForgetOwner { address: String },
}

/// Everything needed to (re)start the loader task
#[derive(Clone)]
pub struct Loader {
    local_address: String,
    media: Arc<dyn MediaLibrary>,
    peers: PeerHandle,
    cache: SongCache,
    loaded_tx: mpsc::UnboundedSender<LoadedEntry>,
}

impl Loader {
    pub fn new(
        local_address: String,
        media: Arc<dyn MediaLibrary>,
        peers: PeerHandle,
        cache: SongCache,
        loaded_tx: mpsc::UnboundedSender<LoadedEntry>,
    ) -> Self {
        Self {
            local_address,
            media,
            peers,
            cache,
            loaded_tx,
        }
    }

    pub fn cache(&self) -> &SongCache {
        &self.cache
    }

    /// Spawn the loader task. Must be called from within a tokio runtime.
    pub fn spawn(&self) -> LoaderHandle {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let worker = self.clone();
        tokio::spawn(async move {
            worker.run(command_rx, cancel_rx).await;
        });

        info!("Loader started");
        LoaderHandle {
            command_tx,
            cancel: Some(cancel_tx),
        }
    }

    async fn run(
        self,
        mut command_rx: mpsc::UnboundedReceiver<LoaderCommand>,
        mut cancel_rx: oneshot::Receiver<()>,
    ) {
        // Remote songs we asked for, and the entries waiting on them
        let mut waiting: HashMap<SongKey, Vec<EntryId>> = HashMap::new();

        loop {
            let command = tokio::select! {
                _ = &mut cancel_rx => break,
                command = command_rx.recv() => match command {
                    Some(command) => command,
                    None => break,
                },
            };

            match command {
                LoaderCommand::Load { entry_id, song } => {
                    let key = song.key();
                    if self.cache.contains(&key) {
                        self.report(entry_id, key);
                    } else if song.is_owned_by(&self.local_address) {
                        self.load_local(entry_id, song).await;
                    } else {
                        let waiters = waiting.entry(key.clone()).or_default();
                        let first_request = waiters.is_empty();
                        waiters.push(entry_id);
                        if first_request {
                            debug!("Requesting {} from its owner", key);
                            let request = SyncMessage::RequestSong {
                                song_id: song.song_id,
                            };
                            if let Err(e) = self.peers.send(&key.owner_address, request) {
                                warn!("Failed to request {}: {}", key, e);
                            }
                        }
                    }
                }
                LoaderCommand::Received { key, data } => {
                    debug!("Received {} ({} bytes)", key, data.len());
                    self.cache.insert(key.clone(), data);
                    for entry_id in waiting.remove(&key).unwrap_or_default() {
                        self.report(entry_id, key.clone());
                    }
                }
                LoaderCommand::ForgetOwner { address } => {
                    waiting.retain(|key, _| key.owner_address != address);
                }
            }
        }

        info!("Loader stopped");
    }

    async fn load_local(&self, entry_id: EntryId, song: SongMetadata) {
        let media = Arc::clone(&self.media);
        let song_id = song.song_id;
        match tokio::task::spawn_blocking(move || media.load_song_bytes(song_id)).await {
            Ok(Ok(data)) => {
                self.cache.insert(song.key(), data);
                self.report(entry_id, song.key());
            }
            Ok(Err(e)) => warn!("Failed to load local song {}: {}", song.key(), e),
            Err(e) => warn!("Load task for {} failed: {}", song.key(), e),
        }
    }

    fn report(&self, entry_id: EntryId, key: SongKey) {
        let _ = self.loaded_tx.send(LoadedEntry { entry_id, key });
    }
}

/// Handle to a running loader task. Stopping is idempotent, and dropping the
/// handle stops the task too.
pub struct LoaderHandle {
    command_tx: mpsc::UnboundedSender<LoaderCommand>,
    cancel: Option<oneshot::Sender<()>>,
}

impl LoaderHandle {
    pub fn enqueue(&self, entry_id: EntryId, song: SongMetadata) {
        let _ = self.command_tx.send(LoaderCommand::Load { entry_id, song });
    }

    /// Bytes for a song we requested arrived from its owner
    pub fn song_received(&self, key: SongKey, data: Vec<u8>) {
        let _ = self.command_tx.send(LoaderCommand::Received { key, data });
    }

    /// Stop waiting on songs from a peer that went away
    pub fn forget_owner(&self, address: &str) {
        let _ = self.command_tx.send(LoaderCommand::ForgetOwner {
            address: address.to_string(),
        });
    }

    pub fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some() && !self.command_tx.is_closed()
    }
}

impl Drop for LoaderHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::MemoryLibrary;
    use crate::network::PeerCommand;
    use std::time::Duration;

    const ME: &str = "ME";

    fn setup() -> (
        Loader,
        mpsc::UnboundedReceiver<LoadedEntry>,
        mpsc::UnboundedReceiver<PeerCommand>,
    ) {
        let media = MemoryLibrary::with_songs(vec![(
            SongMetadata::new("", 1, "Local", "Artist", "Album"),
            vec![7; 16],
        )]);
        let (peers, peer_rx) = PeerHandle::channel();
        let (loaded_tx, loaded_rx) = mpsc::unbounded_channel();
        let loader = Loader::new(
            ME.to_string(),
            Arc::new(media),
            peers,
            SongCache::new(),
            loaded_tx,
        );
        (loader, loaded_rx, peer_rx)
    }

    async fn next_loaded(rx: &mut mpsc::UnboundedReceiver<LoadedEntry>) -> Option<LoadedEntry> {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .ok()
            .flatten()
    }

    #[tokio::test]
    async fn test_loads_local_song() {
        let (loader, mut loaded_rx, _peer_rx) = setup();
        let handle = loader.spawn();

        handle.enqueue(3, SongMetadata::new(ME, 1, "Local", "Artist", "Album"));

        let loaded = next_loaded(&mut loaded_rx).await.unwrap();
        assert_eq!(loaded.entry_id, 3);
        assert_eq!(loader.cache().get(&SongKey::new(ME, 1)).unwrap().len(), 16);
    }

    #[tokio::test]
    async fn test_requests_remote_song_once() {
        let (loader, mut loaded_rx, mut peer_rx) = setup();
        let handle = loader.spawn();
        let remote = SongMetadata::new("GUEST", 9, "Remote", "Artist", "Album");

        handle.enqueue(1, remote.clone());
        handle.enqueue(2, remote.clone());

        match tokio::time::timeout(Duration::from_secs(2), peer_rx.recv()).await {
            Ok(Some(PeerCommand::Send { to, message })) => {
                assert_eq!(to, "GUEST");
                assert_eq!(message, SyncMessage::RequestSong { song_id: 9 });
            }
            other => panic!("expected a song request, got {:?}", other),
        }

        handle.song_received(remote.key(), vec![1, 2, 3]);
        let first = next_loaded(&mut loaded_rx).await.unwrap();
        let second = next_loaded(&mut loaded_rx).await.unwrap();
        assert_eq!((first.entry_id, second.entry_id), (1, 2));
        assert!(peer_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_missing_local_song_is_not_reported() {
        let (loader, mut loaded_rx, _peer_rx) = setup();
        let handle = loader.spawn();

        handle.enqueue(1, SongMetadata::new(ME, 42, "Gone", "Artist", "Album"));
        handle.enqueue(2, SongMetadata::new(ME, 1, "Local", "Artist", "Album"));

        let loaded = next_loaded(&mut loaded_rx).await.unwrap();
        assert_eq!(loaded.entry_id, 2);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let (loader, mut loaded_rx, _peer_rx) = setup();
        let mut handle = loader.spawn();
        handle.stop();
        handle.stop();
        assert!(!handle.is_running());

        // Give the task a moment to exit, then make sure it no longer loads
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.enqueue(1, SongMetadata::new(ME, 1, "Local", "Artist", "Album"));
        assert!(tokio::time::timeout(Duration::from_millis(100), loaded_rx.recv())
            .await
            .is_err());
    }

    #[test]
    fn test_cache_remove_owner() {
        let cache = SongCache::new();
        cache.insert(SongKey::new("A", 1), vec![1]);
        cache.insert(SongKey::new("A", 2), vec![2]);
        cache.insert(SongKey::new("B", 1), vec![3]);

        assert_eq!(cache.remove_owner("A"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&SongKey::new("B", 1)));
    }
}
