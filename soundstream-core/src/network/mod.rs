//! Peer Networking
//!
//! The transport itself is provided by the platform; this module holds the
//! channel the core talks to it through, and the discovery accumulator.

mod channel;
mod discovery;

pub use channel::{NetworkError, PeerCommand, PeerHandle, TransportEvent};
pub use discovery::{DiscoveryAccumulator, DiscoveryReport, FoundDevice};
