//! Application state shared across routes

use dashmap::DashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::lobby::{LobbyHandle, ParticipantId, SessionCoordinator};

/// Bookkeeping for a live WebSocket connection
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    pub connected_at: u64,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub lobby: LobbyHandle,
    pub connections: Arc<DashMap<ParticipantId, ConnectionInfo>>,
}

impl AppState {
    /// Build the state and the coordinator the caller must spawn
    pub fn new(config: Config) -> (Self, SessionCoordinator) {
        let config = Arc::new(config);

        let seed = config.spawn_seed.unwrap_or_else(rand::random::<u64>);
        let (coordinator, lobby) = SessionCoordinator::new(config.target_activity.clone(), seed);

        let state = Self {
            config,
            lobby,
            connections: Arc::new(DashMap::new()),
        };

        (state, coordinator)
    }
}
