//! Sync Engine
//!
//! Wire protocol, session state, local events and the serial engine that
//! keeps the catalog and queue replicas in step with the other peers.

mod controller;
mod engine;
mod events;
mod protocol;
mod state;

pub use controller::{SyncController, UserCommand};
pub use engine::{spawn_engine, EngineError, EngineHandle, SessionConfig};
pub use events::{EventBus, SessionEvent};
pub use protocol::*;
pub use state::*;
