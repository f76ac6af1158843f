//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

use crate::game::ConnectionId;

/// Which seat a player holds in a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Open a new match; the creator takes the left seat
    CreateGame { username: String },

    /// Join an existing match by its 4-character code
    JoinGame { code: String, username: String },

    /// Tear down a match before it starts
    CancelGame { code: String },

    /// New vertical position. Arrives as raw JSON so a non-numeric payload
    /// can be dropped without ever looking like a protocol error.
    PlayerMove { y: serde_json::Value },

    /// Fire. Reserved; the server accepts it and does nothing.
    PlayerShoot,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Ack after connection
    Connected {
        connection_id: ConnectionId,
        server_time: u64,
    },

    /// Match allocated, creator seated
    GameCreated {
        code: String,
        username: String,
        side: Side,
    },

    GameCreationError {
        message: String,
    },

    /// Ack to the joiner
    GameJoined {
        code: String,
        username: String,
        side: Side,
    },

    JoinError {
        message: String,
    },

    /// Sent to the seat that was already in the match
    PlayerJoined {
        username: String,
    },

    /// Both seats filled, match is live
    GameStart,

    /// Position snapshot (sent at the broadcast tick rate)
    GameState {
        state: StateView,
    },

    GameCancelled,

    /// Match torn down with a winner decided
    GameEnded {
        reason: String,
        winner: String,
    },
}

/// Side-keyed position snapshot. Both values come from the same instant;
/// a missing seat reads as null.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateView {
    pub left: Option<f64>,
    pub right: Option<f64>,
}
