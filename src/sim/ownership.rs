//! Ownership gate: decides once, at spawn, whether this context drives an entity

use glam::Vec3;
use tracing::{debug, warn};

use crate::lobby::{EntityId, ParticipantId};
use crate::ws::protocol::ReplicatedState;

use super::integrator::ControlInputIntegrator;

/// Spawn parameters as announced by the authority
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntitySpawn {
    pub entity_id: EntityId,
    pub owner_id: ParticipantId,
    pub position: Vec3,
    pub facing_yaw: f32,
}

/// How this context participates in an entity's simulation
enum EntityRole {
    /// Local context owns the entity and runs its integrator
    Driver(Box<ControlInputIntegrator>),
    /// Passive copy showing the last externally delivered state
    Replica(ReplicatedState),
}

/// A replicated, player-controlled entity as seen by one execution context.
///
/// The owner and the role are fixed at construction; there is no way to
/// promote a replica or demote a driver afterwards.
pub struct ControlledEntity {
    id: EntityId,
    owner_id: ParticipantId,
    role: EntityRole,
}

impl ControlledEntity {
    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn owner_id(&self) -> ParticipantId {
        self.owner_id
    }

    pub fn driver_active(&self) -> bool {
        matches!(self.role, EntityRole::Driver(_))
    }

    /// Run one simulation tick. Replicas never compute their own state and
    /// return `None`; drivers return the state to publish.
    pub fn tick(&mut self, dt: f32) -> Option<ReplicatedState> {
        match &mut self.role {
            EntityRole::Driver(integrator) => {
                integrator.tick(dt);
                Some(integrator.replicated_state())
            }
            EntityRole::Replica(_) => None,
        }
    }

    /// Accept an externally delivered state. Ignored on the driver so the
    /// owner stays the only writer.
    pub fn apply_remote(&mut self, state: ReplicatedState) -> bool {
        match &mut self.role {
            EntityRole::Replica(current) => {
                *current = state;
                true
            }
            EntityRole::Driver(_) => {
                warn!(entity_id = %self.id, "Remote state for a locally driven entity ignored");
                false
            }
        }
    }

    /// Current state: computed on the driver, last received on a replica
    pub fn state(&self) -> ReplicatedState {
        match &self.role {
            EntityRole::Driver(integrator) => integrator.replicated_state(),
            EntityRole::Replica(state) => *state,
        }
    }
}

/// Compares each spawned entity's owner against the local identity
#[derive(Debug, Clone, Copy)]
pub struct OwnershipGate {
    local_identity: ParticipantId,
}

impl OwnershipGate {
    pub fn new(local_identity: ParticipantId) -> Self {
        Self { local_identity }
    }

    pub fn local_identity(&self) -> ParticipantId {
        self.local_identity
    }

    pub fn is_owner(&self, owner_id: ParticipantId) -> bool {
        self.local_identity == owner_id
    }

    /// Build the local view of a spawned entity. `make_driver` is only
    /// invoked when this context owns it.
    pub fn spawn<F>(&self, spawn: EntitySpawn, make_driver: F) -> ControlledEntity
    where
        F: FnOnce(&EntitySpawn) -> ControlInputIntegrator,
    {
        let role = if self.is_owner(spawn.owner_id) {
            debug!(entity_id = %spawn.entity_id, "Driving owned entity");
            EntityRole::Driver(Box::new(make_driver(&spawn)))
        } else {
            EntityRole::Replica(ReplicatedState {
                position: spawn.position.to_array(),
                facing_yaw: spawn.facing_yaw,
                ..Default::default()
            })
        };

        ControlledEntity {
            id: spawn.entity_id,
            owner_id: spawn.owner_id,
            role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::integrator::{
        DirectionalKeys, InputProvider, MovementConfig, ViewDirectionProvider,
    };
    use crate::sim::mover::PlaneMover;
    use std::sync::Arc;
    use uuid::Uuid;

    struct Forward;

    impl InputProvider for Forward {
        fn directional_keys(&self) -> DirectionalKeys {
            DirectionalKeys {
                forward: true,
                ..Default::default()
            }
        }
    }

    struct NoView;

    impl ViewDirectionProvider for NoView {
        fn view_forward(&self) -> Option<Vec3> {
            None
        }
    }

    fn make_driver(spawn: &EntitySpawn) -> ControlInputIntegrator {
        ControlInputIntegrator::new(
            MovementConfig::default(),
            spawn.facing_yaw,
            Arc::new(Forward),
            Arc::new(NoView),
            Box::new(PlaneMover::new(spawn.position)),
        )
    }

    fn spawn_for(owner: ParticipantId) -> EntitySpawn {
        EntitySpawn {
            entity_id: Uuid::new_v4(),
            owner_id: owner,
            position: Vec3::new(1.0, 0.0, 2.0),
            facing_yaw: 0.0,
        }
    }

    #[test]
    fn owner_gets_a_driver() {
        let me = Uuid::new_v4();
        let mut entity = OwnershipGate::new(me).spawn(spawn_for(me), make_driver);
        assert!(entity.driver_active());

        let state = entity.tick(1.0 / 30.0).unwrap();
        assert!(state.position[2] > 2.0);
    }

    #[test]
    fn non_owner_stays_passive_and_never_builds_a_driver() {
        let me = Uuid::new_v4();
        let mut entity = OwnershipGate::new(me).spawn(spawn_for(Uuid::new_v4()), |_| {
            panic!("driver must not be built for a replica")
        });
        assert!(!entity.driver_active());
        assert!(entity.tick(1.0 / 30.0).is_none());
        assert_eq!(entity.state().position, [1.0, 0.0, 2.0]);
    }

    #[test]
    fn replica_takes_remote_state_driver_refuses_it() {
        let me = Uuid::new_v4();
        let gate = OwnershipGate::new(me);
        let remote = ReplicatedState {
            position: [9.0, 0.0, 9.0],
            facing_yaw: 90.0,
            ..Default::default()
        };

        let mut replica = gate.spawn(spawn_for(Uuid::new_v4()), make_driver);
        assert!(replica.apply_remote(remote));
        assert_eq!(replica.state(), remote);

        let mut driver = gate.spawn(spawn_for(me), make_driver);
        assert!(!driver.apply_remote(remote));
        assert_eq!(driver.state().position, [1.0, 0.0, 2.0]);
    }
}
