//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Replicated state of a controlled entity, produced only by its owner
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplicatedState {
    /// World position (x, y, z), y up
    pub position: [f32; 3],
    /// Horizontal velocity (x, z)
    pub horizontal_velocity: [f32; 2],
    /// Vertical velocity
    pub vertical_velocity: f32,
    /// Facing yaw in degrees
    pub facing_yaw: f32,
}

/// One live entity inside a [`ServerMsg::LobbyState`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntitySnapshot {
    pub entity_id: Uuid,
    pub owner_id: Uuid,
    pub state: ReplicatedState,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Toggle the sender's readiness
    SetReady { ready: bool },

    /// Ask the authority to begin the session
    StartSession,

    /// Owner-produced state of one controlled entity
    EntityState {
        entity_id: Uuid,
        state: ReplicatedState,
    },
}

/// Messages sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Sent once, directly to a new connection
    Welcome {
        participant_id: Uuid,
        server_time: u64,
        /// Target activity if the session already transitioned
        active_session: Option<String>,
    },

    /// Readiness counts, republished after every registry mutation
    Readiness { ready_count: i32, total_count: i32 },

    /// Lobby reached consensus, everyone moves to `target`
    SessionTransition { target: String },

    /// A controlled entity now exists
    EntitySpawned {
        entity_id: Uuid,
        owner_id: Uuid,
        position: [f32; 3],
        facing_yaw: f32,
    },

    /// A controlled entity is gone (its owner disconnected)
    EntityDespawned { entity_id: Uuid },

    /// Relayed owner state
    EntityState {
        entity_id: Uuid,
        state: ReplicatedState,
    },

    /// Full lobby state, sent directly to a connection that fell behind the
    /// event stream. Replaces whatever the receiver had.
    LobbyState {
        ready_count: i32,
        total_count: i32,
        active_session: Option<String>,
        entities: Vec<EntitySnapshot>,
    },
}
