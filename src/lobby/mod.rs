//! Lobby: participant readiness and the authoritative session coordinator

pub mod coordinator;
pub mod readiness;
pub mod registry;

pub use coordinator::{
    IgnoreReason, LobbyCommand, LobbyHandle, LobbyRequest, PublishedLobby, RequestOutcome,
    SendError, SessionCoordinator, SessionPhase,
};
pub use readiness::{aggregate, ReadinessSnapshot};
pub use registry::ParticipantRegistry;

/// Opaque participant identity, assigned when a connection is accepted
pub type ParticipantId = uuid::Uuid;

/// Identity of a controlled, replicated entity
pub type EntityId = uuid::Uuid;
