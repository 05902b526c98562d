//! One participant's execution context: replicas of every entity, drivers
//! for the ones it owns

use glam::Vec3;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::lobby::{EntityId, ParticipantId, ReadinessSnapshot};
use crate::ws::protocol::{ClientMsg, EntitySnapshot, ServerMsg};

use super::integrator::{ControlInputIntegrator, InputProvider, MovementConfig, ViewDirectionProvider};
use super::mover::PlaneMover;
use super::ownership::{ControlledEntity, EntitySpawn, OwnershipGate};

/// Client-side state driven by server messages and a fixed tick
pub struct ExecutionContext {
    gate: OwnershipGate,
    config: MovementConfig,
    input: Arc<dyn InputProvider>,
    view: Arc<dyn ViewDirectionProvider>,
    entities: HashMap<EntityId, ControlledEntity>,
    readiness: ReadinessSnapshot,
    session_target: Option<String>,
}

impl ExecutionContext {
    pub fn new(
        local_identity: ParticipantId,
        config: MovementConfig,
        input: Arc<dyn InputProvider>,
        view: Arc<dyn ViewDirectionProvider>,
    ) -> Self {
        Self {
            gate: OwnershipGate::new(local_identity),
            config,
            input,
            view,
            entities: HashMap::new(),
            readiness: ReadinessSnapshot::default(),
            session_target: None,
        }
    }

    pub fn local_identity(&self) -> ParticipantId {
        self.gate.local_identity()
    }

    /// Last readiness counts delivered by the authority
    pub fn readiness(&self) -> ReadinessSnapshot {
        self.readiness
    }

    /// Target activity, once the session has transitioned
    pub fn session_target(&self) -> Option<&str> {
        self.session_target.as_deref()
    }

    pub fn entity(&self, entity_id: &EntityId) -> Option<&ControlledEntity> {
        self.entities.get(entity_id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &ControlledEntity> {
        self.entities.values()
    }

    /// Apply one message from the authority. Delivery is at-least-once, so
    /// repeated spawns are ignored.
    pub fn handle_server_msg(&mut self, msg: &ServerMsg) {
        match msg {
            ServerMsg::Welcome { active_session, .. } => {
                if self.session_target.is_none() {
                    self.session_target = active_session.clone();
                }
            }
            ServerMsg::Readiness {
                ready_count,
                total_count,
            } => {
                self.readiness = ReadinessSnapshot {
                    ready_count: *ready_count,
                    total_count: *total_count,
                };
            }
            ServerMsg::SessionTransition { target } => {
                if self.session_target.is_none() {
                    info!(target = %target, "Session transitioned");
                    self.session_target = Some(target.clone());
                }
            }
            ServerMsg::EntitySpawned {
                entity_id,
                owner_id,
                position,
                facing_yaw,
            } => {
                self.spawn_once(EntitySpawn {
                    entity_id: *entity_id,
                    owner_id: *owner_id,
                    position: Vec3::from_array(*position),
                    facing_yaw: *facing_yaw,
                });
            }
            ServerMsg::EntityDespawned { entity_id } => {
                if self.entities.remove(entity_id).is_some() {
                    debug!(entity_id = %entity_id, "Entity despawned");
                }
            }
            ServerMsg::EntityState { entity_id, state } => {
                if let Some(entity) = self.entities.get_mut(entity_id) {
                    // The authority echoes our own state back; drop it quietly
                    if !entity.driver_active() {
                        entity.apply_remote(*state);
                    }
                }
            }
            ServerMsg::LobbyState {
                ready_count,
                total_count,
                active_session,
                entities,
            } => {
                self.readiness = ReadinessSnapshot {
                    ready_count: *ready_count,
                    total_count: *total_count,
                };
                if self.session_target.is_none() {
                    self.session_target = active_session.clone();
                }
                self.resync_entities(entities);
            }
        }
    }

    /// Advance every owned entity one tick and return the state updates to
    /// send upstream
    pub fn tick(&mut self, dt: f32) -> Vec<ClientMsg> {
        self.entities
            .values_mut()
            .filter_map(|entity| {
                entity.tick(dt).map(|state| ClientMsg::EntityState {
                    entity_id: entity.id(),
                    state,
                })
            })
            .collect()
    }

    /// Make the local entity table match the authority's list exactly
    fn resync_entities(&mut self, live: &[EntitySnapshot]) {
        let before = self.entities.len();
        self.entities
            .retain(|id, _| live.iter().any(|entity| entity.entity_id == *id));
        let dropped = before - self.entities.len();

        for snapshot in live {
            match self.entities.get_mut(&snapshot.entity_id) {
                Some(entity) if !entity.driver_active() => {
                    entity.apply_remote(snapshot.state);
                }
                Some(_) => {}
                None => self.spawn_once(EntitySpawn {
                    entity_id: snapshot.entity_id,
                    owner_id: snapshot.owner_id,
                    position: Vec3::from_array(snapshot.state.position),
                    facing_yaw: snapshot.state.facing_yaw,
                }),
            }
        }

        info!(
            entities = self.entities.len(),
            dropped, "Resynchronised with authority"
        );
    }

    fn spawn_once(&mut self, spawn: EntitySpawn) {
        if self.entities.contains_key(&spawn.entity_id) {
            return;
        }
        let entity_id = spawn.entity_id;
        let entity = self.gate.spawn(spawn, |spawn| self.build_driver(spawn));
        self.entities.insert(entity_id, entity);
    }

    fn build_driver(&self, spawn: &EntitySpawn) -> ControlInputIntegrator {
        ControlInputIntegrator::new(
            self.config,
            spawn.facing_yaw,
            self.input.clone(),
            self.view.clone(),
            Box::new(PlaneMover::new(spawn.position)),
        )
    }
}
