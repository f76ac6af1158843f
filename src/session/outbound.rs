//! Outbound notifications produced by coordinator steps
//!
//! The core never touches a live socket: every event handler returns these
//! and a thin adapter at the transport boundary delivers them.

use crate::game::ConnectionId;
use crate::ws::protocol::ServerMsg;

/// Where a notification goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    /// One specific connection
    Connection(ConnectionId),
    /// Every connection seated in the match with this code
    Room(String),
    /// Every seat in the room except one (e.g. the joiner themselves)
    RoomExcept(String, ConnectionId),
}

/// One notification to deliver
#[derive(Debug, Clone)]
pub struct Outbound {
    pub to: Recipient,
    pub msg: ServerMsg,
}

impl Outbound {
    pub fn to_connection(conn: ConnectionId, msg: ServerMsg) -> Self {
        Self {
            to: Recipient::Connection(conn),
            msg,
        }
    }

    pub fn to_room(code: impl Into<String>, msg: ServerMsg) -> Self {
        Self {
            to: Recipient::Room(code.into()),
            msg,
        }
    }

    pub fn to_room_except(
        code: impl Into<String>,
        except: ConnectionId,
        msg: ServerMsg,
    ) -> Self {
        Self {
            to: Recipient::RoomExcept(code.into(), except),
            msg,
        }
    }
}
