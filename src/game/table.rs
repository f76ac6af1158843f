//! Registry of live matches keyed by short join code

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;

use super::Match;

/// Join code length
pub const CODE_LEN: usize = 4;

const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Shared handle to one match. All mutations go through the per-match lock;
/// unrelated matches never contend.
pub type MatchHandle = Arc<Mutex<Match>>;

/// Process-wide table of live matches.
///
/// The table's own guard (the DashMap shards) is independent of the
/// per-match locks: code allocation and insertion happen as one atomic
/// check-and-insert, so no two live matches can share a code.
pub struct MatchTable {
    matches: DashMap<String, MatchHandle>,
}

impl MatchTable {
    pub fn new() -> Self {
        Self {
            matches: DashMap::new(),
        }
    }

    /// Allocate a fresh match under a newly generated unique code.
    pub fn create(&self) -> (String, MatchHandle) {
        let mut rng = rand::thread_rng();
        loop {
            let code = random_code(&mut rng);
            match self.matches.entry(code.clone()) {
                // Collision with a live match, draw again
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    let handle = Arc::new(Mutex::new(Match::new()));
                    entry.insert(handle.clone());
                    return (code, handle);
                }
            }
        }
    }

    pub fn get(&self, code: &str) -> Option<MatchHandle> {
        self.matches.get(code).map(|m| m.value().clone())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.matches.contains_key(code)
    }

    /// Delete an entry. Idempotent: removing a missing code is a no-op.
    pub fn remove(&self, code: &str) -> Option<MatchHandle> {
        self.matches.remove(code).map(|(_, h)| h)
    }

    pub fn active_matches(&self) -> usize {
        self.matches.len()
    }

    pub fn total_players(&self) -> usize {
        self.matches
            .iter()
            .map(|m| m.value().lock().member_count())
            .sum()
    }
}

impl Default for MatchTable {
    fn default() -> Self {
        Self::new()
    }
}

fn random_code<R: Rng>(rng: &mut R) -> String {
    (0..CODE_LEN)
        .map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
        .collect()
}
