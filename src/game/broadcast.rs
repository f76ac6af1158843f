//! Per-match state broadcast loop

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::info;

use crate::session::Outbound;
use crate::util::time::BROADCAST_TICK_MICROS;
use crate::ws::dispatch::ConnectionLinks;
use crate::ws::protocol::ServerMsg;

use super::MatchTable;

/// Spawn the broadcast loop for one match. Started exactly once, when the
/// second player joins. The loop checks liveness at the top of every tick
/// and exits on its own once the match leaves the table or loses a seat,
/// so removal needs no external cancellation signal.
pub fn spawn_state_broadcast(
    code: String,
    table: Arc<MatchTable>,
    links: Arc<ConnectionLinks>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(code = %code, "state broadcast started");

        let mut tick = interval(Duration::from_micros(BROADCAST_TICK_MICROS));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;

            let Some(handle) = table.get(&code) else {
                break;
            };

            // Hold the lock only for the snapshot copy.
            let state = {
                let game = handle.lock();
                if game.member_count() != 2 {
                    break;
                }
                game.state_view()
            };

            links.deliver(Outbound::to_room(code.clone(), ServerMsg::GameState { state }));
        }

        info!(code = %code, "state broadcast stopped");
    })
}
