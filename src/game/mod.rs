//! Match state and lifecycle modules

pub mod broadcast;
pub mod r#match;
pub mod table;

pub use r#match::{JoinError, Match, MatchStatus, PlayerSlot};
pub use table::MatchTable;

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a single transport connection.
///
/// Minted when the WebSocket upgrades; the core never looks inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
