//! Session role and state snapshots

use serde::{Deserialize, Serialize};

use crate::library::SongMetadata;
use crate::playlist::PlaylistEntry;

/// Which side of the session this device is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Role {
    /// Authoritative for the queue and the catalog; plays audio locally
    #[default]
    Host,
    /// Mirrors the host and sends requests upstream
    Guest,
}

impl Role {
    pub fn is_host(&self) -> bool {
        matches!(self, Role::Host)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Host => write!(f, "host"),
            Role::Guest => write!(f, "guest"),
        }
    }
}

/// Transport state of the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Transport {
    #[default]
    Stopped,
    Playing,
    Paused,
}

/// Point-in-time copy of the session, for polling callers
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub role: Role,
    pub transport: Transport,
    pub current: Option<PlaylistEntry>,
    pub playlist: Vec<PlaylistEntry>,
    pub library: Vec<SongMetadata>,
}
