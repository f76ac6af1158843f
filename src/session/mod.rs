//! Session coordination: per-connection state and the event façade

mod coordinator;
pub mod outbound;

pub use coordinator::{JoinOutcome, SessionCoordinator, SessionData};
pub use outbound::{Outbound, Recipient};
