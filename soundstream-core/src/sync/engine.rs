//! Session engine
//!
//! One task owns the `SyncController` and applies inputs strictly in arrival
//! order. Transport, UI and player callbacks only send `EngineInput`s.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info};

use super::controller::{SyncController, UserCommand};
use super::events::{EventBus, SessionEvent};
use super::protocol::SyncMessage;
use super::state::SessionSnapshot;
use crate::library::{CatalogReplica, MediaLibrary};
use crate::network::{PeerHandle, TransportEvent};
use crate::playback::{AudioPlayer, PlaybackCoordinator};
use crate::playlist::{LoadedEntry, Loader, SongCache};

/// Engine configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// This device's address; owner of its local songs
    pub local_address: String,
    /// Capacity of the local event broadcast
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            local_address: "00:00:00:00:00:00".to_string(),
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine is not running")]
    Stopped,
}

enum EngineInput {
    Transport(TransportEvent),
    Command(UserCommand),
    SongFinished,
    LibraryLoaded,
    Snapshot(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Handle for feeding the engine
#[derive(Clone)]
pub struct EngineHandle {
    input_tx: mpsc::UnboundedSender<EngineInput>,
    catalog: Arc<CatalogReplica>,
    events: EventBus,
}

/// Start the engine and begin loading the local library.
///
/// Must be called from within a tokio runtime. Subscribe to `events` before
/// calling to see the first library update.
pub fn spawn_engine(
    config: SessionConfig,
    events: EventBus,
    media: Arc<dyn MediaLibrary>,
    player: Box<dyn AudioPlayer>,
    peers: PeerHandle,
) -> EngineHandle {
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let (loaded_tx, loaded_rx) = mpsc::unbounded_channel();

    let catalog = Arc::new(CatalogReplica::new());
    let loader = Loader::new(
        config.local_address.clone(),
        Arc::clone(&media),
        peers.clone(),
        SongCache::new(),
        loaded_tx,
    );
    let mut playback = PlaybackCoordinator::new(player, peers.clone(), events.clone(), loader);
    playback.start_loader();

    let controller = SyncController::new(
        config.local_address.clone(),
        Arc::clone(&catalog),
        playback,
        Arc::clone(&media),
        peers,
        events.clone(),
    );

    info!("Starting engine for {}", config.local_address);
    tokio::spawn(run(controller, input_rx, loaded_rx));

    load_local_library(
        config.local_address,
        media,
        Arc::clone(&catalog),
        input_tx.clone(),
    );

    EngineHandle {
        input_tx,
        catalog,
        events,
    }
}

/// Scan the local library off the serial domain and merge it straight into
/// the catalog; the engine only hears that it finished
fn load_local_library(
    local_address: String,
    media: Arc<dyn MediaLibrary>,
    catalog: Arc<CatalogReplica>,
    input_tx: mpsc::UnboundedSender<EngineInput>,
) {
    tokio::spawn(async move {
        let scan = tokio::task::spawn_blocking(move || {
            let songs: Vec<_> = media
                .list_local_songs()
                .into_iter()
                .map(|song| song.with_owner(&local_address))
                .collect();
            let count = songs.len();
            catalog.merge(songs);
            count
        });

        match scan.await {
            Ok(count) => {
                info!("Loaded {} local songs", count);
                let _ = input_tx.send(EngineInput::LibraryLoaded);
            }
            Err(e) => error!("Local library scan failed: {}", e),
        }
    });
}

async fn run(
    mut controller: SyncController,
    mut input_rx: mpsc::UnboundedReceiver<EngineInput>,
    mut loaded_rx: mpsc::UnboundedReceiver<LoadedEntry>,
) {
    loop {
        tokio::select! {
            input = input_rx.recv() => {
                let Some(input) = input else {
                    debug!("All engine handles dropped");
                    break;
                };
                match input {
                    EngineInput::Transport(event) => controller.handle_transport_event(event),
                    EngineInput::Command(command) => controller.handle_command(command),
                    EngineInput::SongFinished => controller.playback_mut().song_finished(),
                    EngineInput::LibraryLoaded => controller.local_library_loaded(),
                    EngineInput::Snapshot(reply) => {
                        let _ = reply.send(controller.snapshot());
                    }
                    EngineInput::Shutdown => break,
                }
            }
            Some(loaded) = loaded_rx.recv() => {
                controller.playback_mut().entry_loaded(loaded);
            }
        }
    }

    controller.playback_mut().stop();
    controller.playback_mut().stop_loader();
    info!("Engine stopped");
}

impl EngineHandle {
    fn send(&self, input: EngineInput) -> Result<(), EngineError> {
        self.input_tx.send(input).map_err(|_| EngineError::Stopped)
    }

    pub fn transport_event(&self, event: TransportEvent) -> Result<(), EngineError> {
        self.send(EngineInput::Transport(event))
    }

    /// A message arrived from `from`
    pub fn deliver(&self, from: &str, message: SyncMessage) -> Result<(), EngineError> {
        self.transport_event(TransportEvent::Message {
            from: from.to_string(),
            message,
        })
    }

    pub fn command(&self, command: UserCommand) -> Result<(), EngineError> {
        self.send(EngineInput::Command(command))
    }

    /// The local player reached the end of its song
    pub fn song_finished(&self) -> Result<(), EngineError> {
        self.send(EngineInput::SongFinished)
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(EngineInput::Snapshot(reply_tx))?;
        reply_rx.await.map_err(|_| EngineError::Stopped)
    }

    pub fn catalog(&self) -> &Arc<CatalogReplica> {
        &self.catalog
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn shutdown(&self) {
        let _ = self.send(EngineInput::Shutdown);
    }
}
