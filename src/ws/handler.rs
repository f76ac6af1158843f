//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::broadcast::spawn_state_broadcast;
use crate::game::ConnectionId;
use crate::session::Outbound;
use crate::util::rate_limit::PlayerRateLimiter;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn = ConnectionId::new();
    info!(conn_id = %conn, "New WebSocket connection");

    let (mut ws_sink, mut ws_stream) = socket.split();

    // Writer channel: everything the coordinator or broadcast loops address
    // to this connection funnels through here.
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMsg>();
    state.links.register(conn, tx);
    state.links.deliver_all(state.coordinator.connect(conn));

    // Writer task: outbound channel -> WebSocket
    let writer_conn = conn;
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(conn_id = %writer_conn, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> coordinator
    let rate_limiter = PlayerRateLimiter::new();
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(conn_id = %conn, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(msg) => handle_client_msg(conn, msg, &state),
                    Err(e) => {
                        warn!(conn_id = %conn, error = %e, "Failed to parse client message");
                        if let Some(reply) = malformed_frame_reply(&text) {
                            state.links.deliver(Outbound::to_connection(conn, reply));
                        }
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(conn_id = %conn, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(conn_id = %conn, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(conn_id = %conn, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(conn_id = %conn, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(conn_id = %conn, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Disconnect handling must run before the link disappears so the
    // remaining opponent still gets their game_ended.
    state.links.deliver_all(state.coordinator.disconnect(conn));
    state.links.unregister(conn);
    writer_handle.abort();

    info!(conn_id = %conn, "WebSocket connection closed");
}

/// Route one parsed client event through the coordinator and deliver
/// whatever it produced.
fn handle_client_msg(conn: ConnectionId, msg: ClientMsg, state: &AppState) {
    match msg {
        ClientMsg::CreateGame { username } => {
            state
                .links
                .deliver_all(state.coordinator.create_game(conn, &username));
        }
        ClientMsg::JoinGame { code, username } => {
            let outcome = state.coordinator.join_game(conn, &code, &username);
            state.links.deliver_all(outcome.notifications);

            if let Some(code) = outcome.started {
                // Detached on purpose: the loop ends itself once the match
                // leaves the table or loses a seat.
                let _ = spawn_state_broadcast(code, state.table.clone(), state.links.clone());
            }
        }
        ClientMsg::CancelGame { code } => {
            state
                .links
                .deliver_all(state.coordinator.cancel_game(conn, &code));
        }
        ClientMsg::PlayerMove { y } => {
            state.links.deliver_all(state.coordinator.player_move(conn, &y));
        }
        ClientMsg::PlayerShoot => {
            state.links.deliver_all(state.coordinator.player_shoot(conn));
        }
    }
}

/// Error reply for a frame that failed typed parsing. Create and join
/// frames owe the client a named error even when structurally broken
/// (missing or mistyped fields), so the type tag is inspected on its own;
/// everything else stays a silent drop.
fn malformed_frame_reply(text: &str) -> Option<ServerMsg> {
    let value: serde_json::Value = serde_json::from_str(text).ok()?;
    match value.get("type")?.as_str()? {
        "join_game" => Some(ServerMsg::JoinError {
            message: "Invalid input: expected a dictionary with code and username".to_string(),
        }),
        "create_game" => Some(ServerMsg::GameCreationError {
            message: "Invalid input: username must be a non-empty string".to_string(),
        }),
        _ => None,
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_frame_missing_username_still_gets_a_join_error() {
        let frame = r#"{"type":"join_game","code":"AB12"}"#;
        assert!(serde_json::from_str::<ClientMsg>(frame).is_err());

        let reply = malformed_frame_reply(frame);
        assert!(matches!(reply, Some(ServerMsg::JoinError { .. })));
    }

    #[test]
    fn join_frame_with_mistyped_fields_gets_a_join_error() {
        let reply = malformed_frame_reply(r#"{"type":"join_game","code":1,"username":2}"#);
        assert!(matches!(reply, Some(ServerMsg::JoinError { .. })));
    }

    #[test]
    fn create_frame_with_non_string_username_gets_a_creation_error() {
        let reply = malformed_frame_reply(r#"{"type":"create_game","username":5}"#);
        assert!(matches!(reply, Some(ServerMsg::GameCreationError { .. })));
    }

    #[test]
    fn other_broken_frames_stay_silent() {
        assert!(malformed_frame_reply("not json").is_none());
        assert!(malformed_frame_reply(r#"{"no_type":true}"#).is_none());
        // Bad move payloads are a mandated silent drop
        assert!(malformed_frame_reply(r#"{"type":"player_move"}"#).is_none());
        assert!(malformed_frame_reply(r#"{"type":"cancel_game"}"#).is_none());
    }
}
