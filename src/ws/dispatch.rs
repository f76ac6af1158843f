//! Delivery of coordinator notifications to live sockets
//!
//! Rooms are not stored anywhere: a room is simply "everyone currently
//! seated in the match with that code", resolved at delivery time.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::game::{ConnectionId, MatchTable};
use crate::session::{Outbound, Recipient};
use crate::ws::protocol::ServerMsg;

/// Maps connection ids to their writer channels and resolves room
/// addresses against the match table.
pub struct ConnectionLinks {
    table: Arc<MatchTable>,
    links: DashMap<ConnectionId, mpsc::UnboundedSender<ServerMsg>>,
}

impl ConnectionLinks {
    pub fn new(table: Arc<MatchTable>) -> Self {
        Self {
            table,
            links: DashMap::new(),
        }
    }

    pub fn register(&self, conn: ConnectionId, tx: mpsc::UnboundedSender<ServerMsg>) {
        self.links.insert(conn, tx);
    }

    pub fn unregister(&self, conn: ConnectionId) {
        self.links.remove(&conn);
    }

    pub fn connected(&self) -> usize {
        self.links.len()
    }

    /// Deliver one notification. A send failure means the target socket is
    /// already closing; its own disconnect handling cleans up.
    pub fn deliver(&self, out: Outbound) {
        match out.to {
            Recipient::Connection(conn) => self.send_to(conn, out.msg),
            Recipient::Room(code) => {
                for member in self.room_members(&code) {
                    self.send_to(member, out.msg.clone());
                }
            }
            Recipient::RoomExcept(code, except) => {
                for member in self.room_members(&code) {
                    if member != except {
                        self.send_to(member, out.msg.clone());
                    }
                }
            }
        }
    }

    pub fn deliver_all(&self, outs: impl IntoIterator<Item = Outbound>) {
        for out in outs {
            self.deliver(out);
        }
    }

    fn send_to(&self, conn: ConnectionId, msg: ServerMsg) {
        if let Some(tx) = self.links.get(&conn) {
            if tx.send(msg).is_err() {
                debug!(conn_id = %conn, "writer channel closed, dropping message");
            }
        }
    }

    fn room_members(&self, code: &str) -> Vec<ConnectionId> {
        self.table
            .get(code)
            .map(|handle| handle.lock().members())
            .unwrap_or_default()
    }
}
