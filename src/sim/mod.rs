//! Entity simulation: ownership gating and the owner-only input integrator

pub mod context;
pub mod integrator;
pub mod mover;
pub mod ownership;

pub use context::ExecutionContext;
pub use integrator::{
    CharacterMover, ControlInputIntegrator, DirectionalKeys, InputProvider, MovementConfig,
    MovementState, ViewDirectionProvider,
};
pub use mover::PlaneMover;
pub use ownership::{ControlledEntity, EntitySpawn, OwnershipGate};
