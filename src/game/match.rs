//! A single two-player match: seats, positions, status

use std::collections::HashMap;

use crate::ws::protocol::{Side, StateView};

use super::ConnectionId;

/// Vertical spawn position (middle of the 0-600 playfield).
///
/// The core never clamps positions; the 0-600 range is a contract with the
/// client, not an invariant enforced here.
pub const DEFAULT_POSITION: f64 = 300.0;

/// Match phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    /// One seat filled, waiting for the second player
    WaitingForOpponent,
    /// Both seats filled, state broadcast running
    Active,
    /// Torn down; an Ended match is never retained in the table
    Ended,
}

/// Errors from seating a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum JoinError {
    #[error("Invalid input: username must be a non-empty string")]
    InvalidUsername,

    #[error("Game is full")]
    MatchFull,

    /// The match was torn down while the caller still held its handle.
    /// To clients the game simply no longer exists.
    #[error("Game not found")]
    MatchEnded,
}

/// One player's seat in a match
#[derive(Debug, Clone)]
pub struct PlayerSlot {
    pub username: String,
    pub side: Side,
    pub position: f64,
}

/// Authoritative state for one match (guarded by the table's per-match
/// lock; the table key is the join code)
pub struct Match {
    slots: HashMap<ConnectionId, PlayerSlot>,
    status: MatchStatus,
}

impl Match {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            status: MatchStatus::WaitingForOpponent,
        }
    }

    pub fn status(&self) -> MatchStatus {
        self.status
    }

    pub fn member_count(&self) -> usize {
        self.slots.len()
    }

    /// Connections currently seated in this match
    pub fn members(&self) -> Vec<ConnectionId> {
        self.slots.keys().copied().collect()
    }

    pub fn username(&self, conn: ConnectionId) -> Option<&str> {
        self.slots.get(&conn).map(|s| s.username.as_str())
    }

    /// Seat a player. The first joiner takes the left side, the second the
    /// right; sides are assigned by arrival order, never chosen by the user.
    ///
    /// An ended match rejects everyone: a handle resolved from the table
    /// before a concurrent teardown must never accept a seat afterwards.
    pub fn add_player(
        &mut self,
        conn: ConnectionId,
        username: &str,
    ) -> Result<Side, JoinError> {
        if self.status == MatchStatus::Ended {
            return Err(JoinError::MatchEnded);
        }
        if username.is_empty() {
            return Err(JoinError::InvalidUsername);
        }
        if self.slots.len() >= 2 {
            return Err(JoinError::MatchFull);
        }

        let left_taken = self.slots.values().any(|s| s.side == Side::Left);
        let side = if left_taken { Side::Right } else { Side::Left };

        self.slots.insert(
            conn,
            PlayerSlot {
                username: username.to_string(),
                side,
                position: DEFAULT_POSITION,
            },
        );

        if self.slots.len() == 2 {
            self.status = MatchStatus::Active;
        }

        Ok(side)
    }

    /// Unseat a player; no-op for connections without a seat. Drops the
    /// status back to WaitingForOpponent when membership falls below two
    /// (whether the match survives at all is the coordinator's call).
    pub fn remove_player(&mut self, conn: ConnectionId) -> Option<PlayerSlot> {
        let slot = self.slots.remove(&conn)?;
        if self.slots.len() < 2 && self.status == MatchStatus::Active {
            self.status = MatchStatus::WaitingForOpponent;
        }
        Some(slot)
    }

    /// Overwrite a seated player's position. Unknown connections are
    /// silently ignored.
    pub fn update_position(&mut self, conn: ConnectionId, y: f64) {
        if let Some(slot) = self.slots.get_mut(&conn) {
            slot.position = y;
        }
    }

    /// Side-keyed snapshot of both positions, taken under the match lock so
    /// the two values are from the same instant.
    pub fn state_view(&self) -> StateView {
        let mut view = StateView {
            left: None,
            right: None,
        };
        for slot in self.slots.values() {
            match slot.side {
                Side::Left => view.left = Some(slot.position),
                Side::Right => view.right = Some(slot.position),
            }
        }
        view
    }

    /// Reserved extension point; accepted, does nothing.
    pub fn shoot(&self, _conn: ConnectionId) {}

    /// Mark the match torn down. Callers remove it from the table in the
    /// same step.
    pub fn end(&mut self) {
        self.status = MatchStatus::Ended;
    }
}

impl Default for Match {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_match() -> Match {
        Match::new()
    }

    #[test]
    fn first_joiner_is_left_second_is_right() {
        let mut m = new_match();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        assert_eq!(m.add_player(a, "Ann"), Ok(Side::Left));
        assert_eq!(m.status(), MatchStatus::WaitingForOpponent);
        assert_eq!(m.add_player(b, "Bob"), Ok(Side::Right));
        assert_eq!(m.status(), MatchStatus::Active);
    }

    #[test]
    fn empty_username_is_rejected() {
        let mut m = new_match();
        assert_eq!(
            m.add_player(ConnectionId::new(), ""),
            Err(JoinError::InvalidUsername)
        );
        assert_eq!(m.member_count(), 0);
    }

    #[test]
    fn third_player_is_rejected() {
        let mut m = new_match();
        m.add_player(ConnectionId::new(), "Ann").unwrap();
        m.add_player(ConnectionId::new(), "Bob").unwrap();
        assert_eq!(
            m.add_player(ConnectionId::new(), "Eve"),
            Err(JoinError::MatchFull)
        );
        assert_eq!(m.member_count(), 2);
    }

    #[test]
    fn sides_are_never_duplicated() {
        let mut m = new_match();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        m.add_player(a, "Ann").unwrap();
        m.add_player(b, "Bob").unwrap();

        let view = m.state_view();
        assert!(view.left.is_some());
        assert!(view.right.is_some());
    }

    #[test]
    fn position_defaults_to_mid_screen_and_updates() {
        let mut m = new_match();
        let a = ConnectionId::new();
        m.add_player(a, "Ann").unwrap();

        assert_eq!(m.state_view().left, Some(DEFAULT_POSITION));

        m.update_position(a, 150.0);
        assert_eq!(m.state_view().left, Some(150.0));
    }

    #[test]
    fn update_for_unseated_connection_is_ignored() {
        let mut m = new_match();
        let a = ConnectionId::new();
        m.add_player(a, "Ann").unwrap();

        m.update_position(ConnectionId::new(), 99.0);
        assert_eq!(m.state_view().left, Some(DEFAULT_POSITION));
    }

    #[test]
    fn ended_match_rejects_joiners() {
        let mut m = new_match();
        m.add_player(ConnectionId::new(), "Ann").unwrap();
        m.end();

        assert_eq!(
            m.add_player(ConnectionId::new(), "Bob"),
            Err(JoinError::MatchEnded)
        );
        assert_eq!(m.member_count(), 1);
    }

    #[test]
    fn removing_a_player_reopens_the_match() {
        let mut m = new_match();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        m.add_player(a, "Ann").unwrap();
        m.add_player(b, "Bob").unwrap();

        assert!(m.remove_player(b).is_some());
        assert_eq!(m.status(), MatchStatus::WaitingForOpponent);
        assert_eq!(m.member_count(), 1);

        // Removing again is a no-op
        assert!(m.remove_player(b).is_none());
    }
}
