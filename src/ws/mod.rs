//! WebSocket transport: upgrade handling, wire protocol, delivery

pub mod dispatch;
pub mod handler;
pub mod protocol;
