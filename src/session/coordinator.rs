//! Event-driven façade over the match table
//!
//! Each inbound client event is handled as one atomic step: it mutates
//! table/match state and returns the notifications to deliver. Failures
//! surface as exactly one error notification to the originating
//! connection; the silently-ignored cases return nothing at all.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use crate::game::{ConnectionId, MatchStatus, MatchTable};
use crate::ws::protocol::ServerMsg;

use super::outbound::Outbound;

/// Per-connection session data, keyed by connection id. Owned here
/// explicitly rather than hanging off ambient transport context.
#[derive(Debug, Clone, Default)]
pub struct SessionData {
    pub username: Option<String>,
    pub match_code: Option<String>,
}

/// Result of a join step. `started` carries the code of a match that just
/// went active, so the adapter can spawn its broadcast loop exactly once.
#[derive(Debug)]
pub struct JoinOutcome {
    pub notifications: Vec<Outbound>,
    pub started: Option<String>,
}

impl JoinOutcome {
    fn error(out: Outbound) -> Self {
        Self {
            notifications: vec![out],
            started: None,
        }
    }
}

/// The session coordinator
pub struct SessionCoordinator {
    table: Arc<MatchTable>,
    sessions: DashMap<ConnectionId, SessionData>,
}

impl SessionCoordinator {
    pub fn new(table: Arc<MatchTable>) -> Self {
        Self {
            table,
            sessions: DashMap::new(),
        }
    }

    pub fn table(&self) -> &Arc<MatchTable> {
        &self.table
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.len()
    }

    /// New connection: initialize its session and ack.
    pub fn connect(&self, conn: ConnectionId) -> Vec<Outbound> {
        self.sessions.insert(conn, SessionData::default());
        info!(conn_id = %conn, "client connected");

        vec![Outbound::to_connection(
            conn,
            ServerMsg::Connected {
                connection_id: conn,
                server_time: crate::util::time::unix_millis(),
            },
        )]
    }

    /// Allocate a match and seat the creator on the left.
    pub fn create_game(&self, conn: ConnectionId, username: &str) -> Vec<Outbound> {
        let (code, handle) = self.table.create();

        let side = match handle.lock().add_player(conn, username) {
            Ok(side) => side,
            Err(err) => {
                // Fresh match, so only the username can be at fault; drop
                // the entry we just allocated.
                self.table.remove(&code);
                warn!(conn_id = %conn, error = %err, "game creation rejected");
                return vec![Outbound::to_connection(
                    conn,
                    ServerMsg::GameCreationError {
                        message: err.to_string(),
                    },
                )];
            }
        };

        self.bind_session(conn, username, &code);
        info!(code = %code, conn_id = %conn, username = %username, "game created");

        vec![Outbound::to_connection(
            conn,
            ServerMsg::GameCreated {
                code,
                username: username.to_string(),
                side,
            },
        )]
    }

    /// Seat a joiner in an existing match. When the second seat fills, both
    /// players get `game_start` and the caller starts the broadcast loop.
    pub fn join_game(&self, conn: ConnectionId, code: &str, username: &str) -> JoinOutcome {
        let Some(handle) = self.table.get(code) else {
            return JoinOutcome::error(Outbound::to_connection(
                conn,
                ServerMsg::JoinError {
                    message: "Game not found".to_string(),
                },
            ));
        };

        let (side, now_active) = {
            let mut game = handle.lock();
            match game.add_player(conn, username) {
                Ok(side) => (side, game.status() == MatchStatus::Active),
                Err(err) => {
                    debug!(code = %code, conn_id = %conn, error = %err, "join rejected");
                    return JoinOutcome::error(Outbound::to_connection(
                        conn,
                        ServerMsg::JoinError {
                            message: err.to_string(),
                        },
                    ));
                }
            }
        };

        self.bind_session(conn, username, code);
        info!(code = %code, conn_id = %conn, username = %username, "player joined game");

        let mut notifications = vec![
            Outbound::to_connection(
                conn,
                ServerMsg::GameJoined {
                    code: code.to_string(),
                    username: username.to_string(),
                    side,
                },
            ),
            Outbound::to_room_except(
                code,
                conn,
                ServerMsg::PlayerJoined {
                    username: username.to_string(),
                },
            ),
        ];

        if now_active {
            notifications.push(Outbound::to_room(code, ServerMsg::GameStart));
        }

        JoinOutcome {
            notifications,
            started: now_active.then(|| code.to_string()),
        }
    }

    /// Tear down a match by code. Unknown codes are silently ignored.
    pub fn cancel_game(&self, conn: ConnectionId, code: &str) -> Vec<Outbound> {
        let Some(handle) = self.table.remove(code) else {
            return Vec::new();
        };

        let members = {
            let mut game = handle.lock();
            game.end();
            game.members()
        };

        for member in &members {
            self.unbind_session(*member);
        }
        info!(code = %code, conn_id = %conn, "game cancelled");

        // The entry is already gone, so address the former seats directly.
        members
            .into_iter()
            .map(|member| Outbound::to_connection(member, ServerMsg::GameCancelled))
            .collect()
    }

    /// Position update. Every failure mode here is a silent no-op: bad
    /// payload, unbound session, or a match that is already gone.
    pub fn player_move(&self, conn: ConnectionId, y: &serde_json::Value) -> Vec<Outbound> {
        let Some(y) = y.as_f64() else {
            return Vec::new();
        };
        let Some(code) = self.session_match(conn) else {
            return Vec::new();
        };
        if let Some(handle) = self.table.get(&code) {
            handle.lock().update_position(conn, y);
        }
        Vec::new()
    }

    /// Placeholder: routed to the match, which does nothing with it.
    pub fn player_shoot(&self, conn: ConnectionId) -> Vec<Outbound> {
        if let Some(code) = self.session_match(conn) {
            if let Some(handle) = self.table.get(&code) {
                handle.lock().shoot(conn);
            }
        }
        Vec::new()
    }

    /// Connection gone. If it was seated: unseat it, end the match when one
    /// player remains (they win), drop empty matches silently, and clear
    /// the session entry last.
    pub fn disconnect(&self, conn: ConnectionId) -> Vec<Outbound> {
        let mut notifications = Vec::new();

        if let Some(code) = self.session_match(conn) {
            if let Some(handle) = self.table.get(&code) {
                let mut game = handle.lock();
                if game.remove_player(conn).is_some() {
                    match game.member_count() {
                        1 => {
                            let remaining = game.members()[0];
                            let winner = game
                                .username(remaining)
                                .unwrap_or_default()
                                .to_string();
                            game.end();
                            drop(game);

                            self.table.remove(&code);
                            self.unbind_session(remaining);
                            info!(code = %code, winner = %winner, "game ended by disconnection");

                            notifications.push(Outbound::to_connection(
                                remaining,
                                ServerMsg::GameEnded {
                                    reason: "disconnection".to_string(),
                                    winner,
                                },
                            ));
                        }
                        0 => {
                            game.end();
                            drop(game);
                            self.table.remove(&code);
                            info!(code = %code, "empty game removed");
                        }
                        _ => {
                            // Seats beyond two do not exist today, but if
                            // capacity ever grows the match survives and
                            // everyone just resyncs.
                            let state = game.state_view();
                            drop(game);
                            notifications
                                .push(Outbound::to_room(code, ServerMsg::GameState { state }));
                        }
                    }
                }
            }
        }

        self.sessions.remove(&conn);
        info!(conn_id = %conn, "client disconnected");

        notifications
    }

    fn session_match(&self, conn: ConnectionId) -> Option<String> {
        self.sessions.get(&conn).and_then(|s| s.match_code.clone())
    }

    fn bind_session(&self, conn: ConnectionId, username: &str, code: &str) {
        let mut session = self.sessions.entry(conn).or_default();
        session.username = Some(username.to_string());
        session.match_code = Some(code.to_string());
    }

    fn unbind_session(&self, conn: ConnectionId) {
        if let Some(mut session) = self.sessions.get_mut(&conn) {
            session.match_code = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::outbound::Recipient;

    fn coordinator() -> SessionCoordinator {
        SessionCoordinator::new(Arc::new(MatchTable::new()))
    }

    fn created_code(out: &[Outbound]) -> String {
        match &out[0].msg {
            ServerMsg::GameCreated { code, .. } => code.clone(),
            other => panic!("expected game_created, got {other:?}"),
        }
    }

    #[test]
    fn connect_acks_with_connection_id() {
        let coord = coordinator();
        let conn = ConnectionId::new();

        let out = coord.connect(conn);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Recipient::Connection(conn));
        assert!(matches!(
            out[0].msg,
            ServerMsg::Connected { connection_id, .. } if connection_id == conn
        ));
        assert_eq!(coord.connected_count(), 1);
    }

    #[test]
    fn create_game_seats_creator_on_the_left() {
        let coord = coordinator();
        let ann = ConnectionId::new();
        coord.connect(ann);

        let out = coord.create_game(ann, "Ann");
        assert_eq!(out.len(), 1);
        match &out[0].msg {
            ServerMsg::GameCreated {
                code,
                username,
                side,
            } => {
                assert_eq!(username, "Ann");
                assert_eq!(*side, crate::ws::protocol::Side::Left);
                assert!(coord.table().contains(code));
            }
            other => panic!("expected game_created, got {other:?}"),
        }
    }

    #[test]
    fn create_game_with_empty_username_allocates_nothing() {
        let coord = coordinator();
        let conn = ConnectionId::new();
        coord.connect(conn);

        let out = coord.create_game(conn, "");
        assert!(matches!(out[0].msg, ServerMsg::GameCreationError { .. }));
        assert_eq!(coord.table().active_matches(), 0);
    }

    #[test]
    fn join_unknown_code_is_not_found() {
        let coord = coordinator();
        let conn = ConnectionId::new();
        coord.connect(conn);

        let outcome = coord.join_game(conn, "ZZZZ", "Bob");
        assert!(outcome.started.is_none());
        match &outcome.notifications[0].msg {
            ServerMsg::JoinError { message } => assert_eq!(message, "Game not found"),
            other => panic!("expected join_error, got {other:?}"),
        }
    }

    #[test]
    fn second_join_starts_the_game() {
        let coord = coordinator();
        let ann = ConnectionId::new();
        let bob = ConnectionId::new();
        coord.connect(ann);
        coord.connect(bob);

        let code = created_code(&coord.create_game(ann, "Ann"));
        let outcome = coord.join_game(bob, &code, "Bob");

        assert_eq!(outcome.started.as_deref(), Some(code.as_str()));
        assert_eq!(outcome.notifications.len(), 3);

        assert!(matches!(
            &outcome.notifications[0],
            Outbound {
                to: Recipient::Connection(c),
                msg: ServerMsg::GameJoined { side, .. },
            } if *c == bob && *side == crate::ws::protocol::Side::Right
        ));
        assert!(matches!(
            &outcome.notifications[1],
            Outbound {
                to: Recipient::RoomExcept(room, except),
                msg: ServerMsg::PlayerJoined { username },
            } if room == &code && *except == bob && username == "Bob"
        ));
        assert!(matches!(
            &outcome.notifications[2],
            Outbound {
                to: Recipient::Room(room),
                msg: ServerMsg::GameStart,
            } if room == &code
        ));
    }

    #[test]
    fn third_join_is_full_and_changes_nothing() {
        let coord = coordinator();
        let ann = ConnectionId::new();
        let bob = ConnectionId::new();
        let eve = ConnectionId::new();
        for c in [ann, bob, eve] {
            coord.connect(c);
        }

        let code = created_code(&coord.create_game(ann, "Ann"));
        coord.join_game(bob, &code, "Bob");

        let outcome = coord.join_game(eve, &code, "Eve");
        assert!(outcome.started.is_none());
        match &outcome.notifications[0].msg {
            ServerMsg::JoinError { message } => assert_eq!(message, "Game is full"),
            other => panic!("expected join_error, got {other:?}"),
        }

        let handle = coord.table().get(&code).unwrap();
        assert_eq!(handle.lock().member_count(), 2);
    }

    #[test]
    fn player_move_updates_the_bound_slot() {
        let coord = coordinator();
        let ann = ConnectionId::new();
        let bob = ConnectionId::new();
        coord.connect(ann);
        coord.connect(bob);

        let code = created_code(&coord.create_game(ann, "Ann"));
        coord.join_game(bob, &code, "Bob");

        let out = coord.player_move(ann, &serde_json::json!(150.0));
        assert!(out.is_empty());

        let handle = coord.table().get(&code).unwrap();
        let view = handle.lock().state_view();
        assert_eq!(view.left, Some(150.0));
        assert_eq!(view.right, Some(300.0));
    }

    #[test]
    fn non_numeric_move_is_silently_ignored() {
        let coord = coordinator();
        let ann = ConnectionId::new();
        coord.connect(ann);
        let code = created_code(&coord.create_game(ann, "Ann"));

        let out = coord.player_move(ann, &serde_json::json!("up"));
        assert!(out.is_empty());

        let handle = coord.table().get(&code).unwrap();
        assert_eq!(handle.lock().state_view().left, Some(300.0));
    }

    #[test]
    fn move_without_a_match_is_silently_ignored() {
        let coord = coordinator();
        let conn = ConnectionId::new();
        coord.connect(conn);

        assert!(coord.player_move(conn, &serde_json::json!(10.0)).is_empty());
    }

    #[test]
    fn shoot_is_accepted_and_does_nothing() {
        let coord = coordinator();
        let ann = ConnectionId::new();
        coord.connect(ann);
        let code = created_code(&coord.create_game(ann, "Ann"));

        assert!(coord.player_shoot(ann).is_empty());
        assert!(coord.table().contains(&code));
    }

    #[test]
    fn disconnect_with_opponent_ends_the_game_with_a_winner() {
        let coord = coordinator();
        let ann = ConnectionId::new();
        let bob = ConnectionId::new();
        coord.connect(ann);
        coord.connect(bob);

        let code = created_code(&coord.create_game(ann, "Ann"));
        coord.join_game(bob, &code, "Bob");

        let out = coord.disconnect(bob);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, Recipient::Connection(ann));
        match &out[0].msg {
            ServerMsg::GameEnded { reason, winner } => {
                assert_eq!(reason, "disconnection");
                assert_eq!(winner, "Ann");
            }
            other => panic!("expected game_ended, got {other:?}"),
        }

        assert!(!coord.table().contains(&code));
        assert_eq!(coord.connected_count(), 1);
    }

    #[test]
    fn disconnect_of_the_sole_player_removes_the_game_silently() {
        let coord = coordinator();
        let ann = ConnectionId::new();
        coord.connect(ann);
        let code = created_code(&coord.create_game(ann, "Ann"));

        let out = coord.disconnect(ann);
        assert!(out.is_empty());
        assert!(!coord.table().contains(&code));
        assert_eq!(coord.connected_count(), 0);
    }

    #[test]
    fn disconnect_without_a_match_only_clears_the_session() {
        let coord = coordinator();
        let conn = ConnectionId::new();
        coord.connect(conn);

        assert!(coord.disconnect(conn).is_empty());
        assert_eq!(coord.connected_count(), 0);
    }

    #[test]
    fn stale_handle_cannot_seat_a_joiner_after_teardown() {
        let coord = coordinator();
        let ann = ConnectionId::new();
        let bob = ConnectionId::new();
        let eve = ConnectionId::new();
        for c in [ann, bob, eve] {
            coord.connect(c);
        }

        let code = created_code(&coord.create_game(ann, "Ann"));
        coord.join_game(bob, &code, "Bob");

        // A concurrent join can resolve the handle just before a
        // disconnect tears the match down; that handle must be dead.
        let handle = coord.table().get(&code).unwrap();
        coord.disconnect(bob);
        assert!(!coord.table().contains(&code));

        assert_eq!(
            handle.lock().add_player(eve, "Eve"),
            Err(crate::game::JoinError::MatchEnded)
        );
        assert_eq!(handle.lock().member_count(), 1);
    }

    #[test]
    fn cancel_notifies_every_seat_then_forgets_the_code() {
        let coord = coordinator();
        let ann = ConnectionId::new();
        let bob = ConnectionId::new();
        coord.connect(ann);
        coord.connect(bob);

        let code = created_code(&coord.create_game(ann, "Ann"));
        coord.join_game(bob, &code, "Bob");

        let out = coord.cancel_game(ann, &code);
        assert_eq!(out.len(), 2);
        assert!(out
            .iter()
            .all(|o| matches!(o.msg, ServerMsg::GameCancelled)));
        assert!(!coord.table().contains(&code));
    }

    #[test]
    fn cancel_of_unknown_code_is_silently_ignored() {
        let coord = coordinator();
        let conn = ConnectionId::new();
        coord.connect(conn);

        assert!(coord.cancel_game(conn, "ZZZZ").is_empty());
    }

    #[test]
    fn one_bad_connection_never_perturbs_another_match() {
        let coord = coordinator();
        let ann = ConnectionId::new();
        let bob = ConnectionId::new();
        let eve = ConnectionId::new();
        for c in [ann, bob, eve] {
            coord.connect(c);
        }

        let code = created_code(&coord.create_game(ann, "Ann"));
        coord.join_game(bob, &code, "Bob");

        // Eve floods junk at the coordinator
        coord.player_move(eve, &serde_json::json!(null));
        coord.cancel_game(eve, "AAAA");
        coord.join_game(eve, &code, "Eve");

        let handle = coord.table().get(&code).unwrap();
        let game = handle.lock();
        assert_eq!(game.member_count(), 2);
        assert_eq!(game.status(), MatchStatus::Active);
    }
}
