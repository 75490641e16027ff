//! Session implementation for FFI

use std::sync::{Arc, Once};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Runtime;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::network::{DiscoveryAccumulator, PeerHandle, TransportEvent};
use crate::playlist::PlaylistEntry;
use crate::sync::{spawn_engine, EngineHandle, EventBus, SessionConfig, SyncMessage, UserCommand};

use super::handlers::{run_event_forwarder, run_outbound, NativeMedia, NativePlayer, SharedCallback};
use super::types::*;

static TRACING_INIT: Once = Once::new();

/// Main session interface
#[derive(uniffi::Object)]
pub struct Session {
    runtime: Runtime,
    config: SessionConfig,
    events: EventBus,
    engine: RwLock<Option<EngineHandle>>,
    callback: SharedCallback,
    discovery: Mutex<DiscoveryAccumulator>,
    /// Handle for cancelling the event forwarder
    forwarder_cancel: Mutex<Option<oneshot::Sender<()>>>,
}

#[uniffi::export]
impl Session {
    /// Create a session for the device at `local_address`
    #[uniffi::constructor]
    pub fn new(local_address: String) -> Self {
        TRACING_INIT.call_once(|| {
            let filter = tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("soundstream_core=debug"));
            let _ = tracing_subscriber::fmt()
                .with_ansi(false)
                .with_target(false)
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        });

        info!("Initializing soundstream-core session for {}", local_address);

        let runtime = Runtime::new().expect("Failed to create tokio runtime");
        let config = SessionConfig {
            local_address,
            ..Default::default()
        };
        let events = EventBus::new(config.event_capacity);

        Self {
            runtime,
            discovery: Mutex::new(DiscoveryAccumulator::new(events.clone())),
            config,
            events,
            engine: RwLock::new(None),
            callback: Arc::new(RwLock::new(None)),
            forwarder_cancel: Mutex::new(None),
        }
    }

    /// Set the event callback
    pub fn set_callback(&self, callback: Box<dyn SessionCallback>) {
        *self.callback.write() = Some(Arc::from(callback));
    }

    /// Start the engine as host of an empty session
    pub fn start(
        &self,
        media: Box<dyn MediaSource>,
        output: Box<dyn AudioOutput>,
        transport: Box<dyn PeerTransport>,
    ) -> Result<(), CoreError> {
        let mut engine = self.engine.write();
        if engine.is_some() {
            return Err(CoreError::AlreadyStarted);
        }

        self.start_event_forwarder();

        let (peers, command_rx) = PeerHandle::channel();
        self.runtime.spawn(run_outbound(command_rx, transport));

        let _guard = self.runtime.enter();
        let handle = spawn_engine(
            self.config.clone(),
            self.events.clone(),
            Arc::new(NativeMedia::new(media)),
            Box::new(NativePlayer::new(output)),
            peers,
        );
        *engine = Some(handle);

        info!("Session started");
        Ok(())
    }

    /// Stop the engine and the event forwarder
    pub fn stop(&self) {
        if let Some(handle) = self.engine.write().take() {
            handle.shutdown();
        }
        self.stop_event_forwarder();
        info!("Session stopped");
    }

    pub fn is_running(&self) -> bool {
        self.engine.read().is_some()
    }

    // === Transport input ===

    /// A payload arrived from a peer
    pub fn receive(&self, from: String, payload: Vec<u8>) -> Result<(), CoreError> {
        let message = SyncMessage::decode(&payload).map_err(|e| {
            warn!("Undecodable payload from {}: {}", from, e);
            CoreError::InvalidMessage(e.to_string())
        })?;
        self.with_engine(|engine| engine.deliver(&from, message))
    }

    /// We joined a host
    pub fn host_connected(&self, address: String) -> Result<(), CoreError> {
        self.transport_event(TransportEvent::HostConnected { address })
    }

    /// Our host went away
    pub fn host_disconnected(&self) -> Result<(), CoreError> {
        self.transport_event(TransportEvent::HostDisconnected)
    }

    pub fn guest_connected(&self, address: String) -> Result<(), CoreError> {
        self.transport_event(TransportEvent::GuestConnected { address })
    }

    pub fn guest_disconnected(&self, address: String) -> Result<(), CoreError> {
        self.transport_event(TransportEvent::GuestDisconnected { address })
    }

    /// The audio output reached the end of the current song
    pub fn song_finished(&self) -> Result<(), CoreError> {
        self.with_engine(|engine| engine.song_finished())
    }

    // === User actions ===

    pub fn play(&self) -> Result<(), CoreError> {
        self.command(UserCommand::Play)
    }

    pub fn pause(&self) -> Result<(), CoreError> {
        self.command(UserCommand::Pause)
    }

    pub fn play_pause(&self) -> Result<(), CoreError> {
        self.command(UserCommand::PlayPause)
    }

    pub fn skip(&self) -> Result<(), CoreError> {
        self.command(UserCommand::Skip)
    }

    pub fn stop_playback(&self) -> Result<(), CoreError> {
        self.command(UserCommand::Stop)
    }

    pub fn add_song(&self, song: Song) -> Result<(), CoreError> {
        self.command(UserCommand::AddSong(song.into()))
    }

    pub fn remove_song(&self, item: PlaylistItem) -> Result<(), CoreError> {
        self.command(UserCommand::RemoveSong(PlaylistEntry::from(item)))
    }

    pub fn bump_song(&self, item: PlaylistItem) -> Result<(), CoreError> {
        self.command(UserCommand::BumpSong(PlaylistEntry::from(item)))
    }

    pub fn clear_playlist(&self) -> Result<(), CoreError> {
        self.command(UserCommand::ClearPlaylist)
    }

    // === Polling ===

    /// Current session state
    pub fn get_state(&self) -> Result<SessionState, CoreError> {
        let engine = self.engine.read().clone().ok_or(CoreError::NotStarted)?;
        let snapshot = self
            .runtime
            .block_on(engine.snapshot())
            .map_err(|_| CoreError::EngineStopped)?;
        Ok(SessionState::from(snapshot))
    }

    /// Catalog contents, without going through the engine
    pub fn get_library(&self) -> Vec<Song> {
        self.engine
            .read()
            .as_ref()
            .map(|engine| engine.catalog().snapshot().into_iter().map(Song::from).collect())
            .unwrap_or_default()
    }

    // === Discovery ===

    /// Devices already paired with this one
    pub fn set_paired_devices(&self, devices: Vec<DiscoveredDevice>) {
        let paired = devices.into_iter().map(|d| (d.name, d.address)).collect();
        self.discovery.lock().set_paired_devices(paired);
    }

    pub fn start_discovery(&self, remote_initiated: bool) {
        self.discovery.lock().start(remote_initiated);
    }

    pub fn device_found(&self, name: String, address: String) {
        self.discovery.lock().found(&name, &address);
    }

    /// End the discovery pass. The devices also go to `on_discovery_finished`.
    pub fn finish_discovery(&self) -> Vec<DiscoveredDevice> {
        self.discovery
            .lock()
            .finish()
            .map(|report| report.devices.into_iter().map(DiscoveredDevice::from).collect())
            .unwrap_or_default()
    }
}

impl Session {
    fn with_engine<F, E>(&self, f: F) -> Result<(), CoreError>
    where
        F: FnOnce(&EngineHandle) -> Result<(), E>,
        E: std::fmt::Display,
    {
        let engine = self.engine.read();
        let engine = engine.as_ref().ok_or(CoreError::NotStarted)?;
        f(engine).map_err(|e| {
            warn!("Engine input rejected: {}", e);
            CoreError::EngineStopped
        })
    }

    fn transport_event(&self, event: TransportEvent) -> Result<(), CoreError> {
        debug!("Transport event: {:?}", event);
        self.with_engine(|engine| engine.transport_event(event))
    }

    fn command(&self, command: UserCommand) -> Result<(), CoreError> {
        self.with_engine(|engine| engine.command(command))
    }

    /// Start forwarding session events to the callback
    fn start_event_forwarder(&self) {
        self.stop_event_forwarder();

        let (cancel_tx, cancel_rx) = oneshot::channel();
        *self.forwarder_cancel.lock() = Some(cancel_tx);

        let events_rx = self.events.subscribe();
        let callback = Arc::clone(&self.callback);
        self.runtime
            .spawn(run_event_forwarder(events_rx, callback, cancel_rx));
    }

    fn stop_event_forwarder(&self) {
        if let Some(tx) = self.forwarder_cancel.lock().take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop();
    }
}
