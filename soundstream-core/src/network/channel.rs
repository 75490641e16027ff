//! Peer channel plumbing
//!
//! The byte transport (discovery, pairing, connections) lives outside the
//! core. The core hands it outbound commands through a `PeerHandle` and gets
//! inbound traffic and topology changes back as `TransportEvent`s.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::sync::SyncMessage;

/// Network-related errors
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Peer channel closed")]
    ChannelClosed,
}

/// Events delivered by the transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Received a sync message from a peer
    Message { from: String, message: SyncMessage },
    /// We joined a host; this device becomes a guest
    HostConnected { address: String },
    /// Our host went away; this device becomes the host
    HostDisconnected,
    /// A guest joined us
    GuestConnected { address: String },
    /// A guest left
    GuestDisconnected { address: String },
}

/// Commands sent to the transport
#[derive(Debug, Clone)]
pub enum PeerCommand {
    /// Send a message to one connected peer
    Send { to: String, message: SyncMessage },
    /// Send a message to every connected peer
    Broadcast { message: SyncMessage },
}

/// Handle used by the core to push messages out to peers
#[derive(Clone)]
pub struct PeerHandle {
    command_tx: mpsc::UnboundedSender<PeerCommand>,
}

impl PeerHandle {
    /// Create a handle and the receiver the transport drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PeerCommand>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        (Self { command_tx }, command_rx)
    }

    pub fn send(&self, to: &str, message: SyncMessage) -> Result<(), NetworkError> {
        self.command_tx
            .send(PeerCommand::Send {
                to: to.to_string(),
                message,
            })
            .map_err(|_| NetworkError::ChannelClosed)
    }

    pub fn broadcast(&self, message: SyncMessage) -> Result<(), NetworkError> {
        self.command_tx
            .send(PeerCommand::Broadcast { message })
            .map_err(|_| NetworkError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_broadcast_reach_transport() {
        let (peers, mut rx) = PeerHandle::channel();
        peers.send("AA", SyncMessage::Play).unwrap();
        peers.broadcast(SyncMessage::Pause).unwrap();

        assert!(matches!(
            rx.try_recv(),
            Ok(PeerCommand::Send { to, message: SyncMessage::Play }) if to == "AA"
        ));
        assert!(matches!(
            rx.try_recv(),
            Ok(PeerCommand::Broadcast { message: SyncMessage::Pause })
        ));
    }

    #[test]
    fn test_closed_channel_is_an_error() {
        let (peers, rx) = PeerHandle::channel();
        drop(rx);
        assert!(matches!(
            peers.broadcast(SyncMessage::Skip),
            Err(NetworkError::ChannelClosed)
        ));
    }
}
