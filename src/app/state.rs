//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::MatchTable;
use crate::session::SessionCoordinator;
use crate::ws::dispatch::ConnectionLinks;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub table: Arc<MatchTable>,
    pub coordinator: Arc<SessionCoordinator>,
    pub links: Arc<ConnectionLinks>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Match table first: the coordinator mutates it, the link registry
        // resolves room delivery against it
        let table = Arc::new(MatchTable::new());
        let coordinator = Arc::new(SessionCoordinator::new(table.clone()));
        let links = Arc::new(ConnectionLinks::new(table.clone()));

        Self {
            config,
            table,
            coordinator,
            links,
        }
    }
}
