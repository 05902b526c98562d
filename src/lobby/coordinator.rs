//! Session coordinator: the single authoritative owner of lobby state
//!
//! Every connect/disconnect/ready/start request, whatever connection it
//! arrived on, goes through one ordered mpsc queue and is applied by one
//! task. Readiness counts are republished synchronously after each applied
//! mutation. Once consensus holds and a start request arrives, the
//! coordinator fires the transition event once and spawns one controlled
//! entity per participant, then relays owner-produced entity state.

use parking_lot::RwLock;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::util::time::unix_millis;
use crate::ws::protocol::{EntitySnapshot, ReplicatedState, ServerMsg};

use super::readiness::{aggregate, ReadinessSnapshot};
use super::registry::ParticipantRegistry;
use super::{EntityId, ParticipantId};

/// Radius around the origin in which entities are spawned
const SPAWN_RADIUS: f32 = 5.0;

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Accepting readiness changes
    Open,
    /// Consensus reached and transition fired (terminal)
    Transitioned,
}

/// A request as it sits in the authority's inbound queue
#[derive(Debug)]
pub struct LobbyRequest {
    pub participant_id: ParticipantId,
    pub command: LobbyCommand,
    pub received_at: u64,
}

impl LobbyRequest {
    pub fn new(participant_id: ParticipantId, command: LobbyCommand) -> Self {
        Self {
            participant_id,
            command,
            received_at: unix_millis(),
        }
    }
}

/// Commands understood by the coordinator
#[derive(Debug)]
pub enum LobbyCommand {
    Connect,
    Disconnect,
    SetReady { ready: bool },
    StartSession,
    EntityState {
        entity_id: EntityId,
        state: ReplicatedState,
    },
    /// Full state for one connection that lost events; answered on `reply`
    /// only, never broadcast
    Resync { reply: oneshot::Sender<ServerMsg> },
}

/// What happened to a request. Callers never see this over the wire; a
/// dropped request is silent toward the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Applied,
    Ignored(IgnoreReason),
}

impl RequestOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, RequestOutcome::Applied)
    }
}

/// Why a request was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IgnoreReason {
    #[error("participant is not connected")]
    UnknownParticipant,

    #[error("participant is already connected")]
    AlreadyConnected,

    #[error("not every connected participant is ready")]
    ConsensusNotReached,

    #[error("session has already transitioned")]
    SessionClosed,

    #[error("sender does not own the entity")]
    NotOwner,

    #[error("entity does not exist")]
    UnknownEntity,
}

/// Errors surfaced by [`LobbyHandle`]
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("session coordinator is no longer running")]
    CoordinatorClosed,
}

/// Owner and last known state of a spawned entity
#[derive(Debug, Clone, Copy)]
struct EntityRecord {
    owner_id: ParticipantId,
    last_state: ReplicatedState,
}

/// Latest published lobby state, readable without going through the queue
#[derive(Debug, Clone, Copy)]
pub struct PublishedLobby {
    pub snapshot: ReadinessSnapshot,
    pub phase: SessionPhase,
}

/// Cloneable handle used by connections and HTTP handlers
#[derive(Clone)]
pub struct LobbyHandle {
    request_tx: mpsc::Sender<LobbyRequest>,
    event_tx: broadcast::Sender<ServerMsg>,
    published: Arc<RwLock<PublishedLobby>>,
}

impl LobbyHandle {
    /// Enqueue a request for the authority
    pub async fn send(
        &self,
        participant_id: ParticipantId,
        command: LobbyCommand,
    ) -> Result<(), SendError> {
        self.request_tx
            .send(LobbyRequest::new(participant_id, command))
            .await
            .map_err(|_| SendError::CoordinatorClosed)
    }

    pub async fn connect(&self, participant_id: ParticipantId) -> Result<(), SendError> {
        self.send(participant_id, LobbyCommand::Connect).await
    }

    pub async fn disconnect(&self, participant_id: ParticipantId) -> Result<(), SendError> {
        self.send(participant_id, LobbyCommand::Disconnect).await
    }

    pub async fn set_ready(
        &self,
        participant_id: ParticipantId,
        ready: bool,
    ) -> Result<(), SendError> {
        self.send(participant_id, LobbyCommand::SetReady { ready })
            .await
    }

    pub async fn start_session(&self, participant_id: ParticipantId) -> Result<(), SendError> {
        self.send(participant_id, LobbyCommand::StartSession).await
    }

    /// Full lobby state as of this request's turn in the queue
    pub async fn resync(&self, participant_id: ParticipantId) -> Result<ServerMsg, SendError> {
        let (reply, rx) = oneshot::channel();
        self.send(participant_id, LobbyCommand::Resync { reply })
            .await?;
        rx.await.map_err(|_| SendError::CoordinatorClosed)
    }

    /// Subscribe to everything the coordinator publishes
    pub fn subscribe(&self) -> broadcast::Receiver<ServerMsg> {
        self.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> ReadinessSnapshot {
        self.published.read().snapshot
    }

    pub fn phase(&self) -> SessionPhase {
        self.published.read().phase
    }

    /// Snapshot and phase read together
    pub fn published(&self) -> PublishedLobby {
        *self.published.read()
    }
}

/// The authoritative coordinator (owned by its task)
pub struct SessionCoordinator {
    registry: ParticipantRegistry,
    phase: SessionPhase,
    target_activity: String,
    /// Owner is assigned once at spawn and never changes
    entities: HashMap<EntityId, EntityRecord>,
    rng: ChaCha8Rng,
    request_rx: mpsc::Receiver<LobbyRequest>,
    event_tx: broadcast::Sender<ServerMsg>,
    published: Arc<RwLock<PublishedLobby>>,
}

impl SessionCoordinator {
    /// Create a coordinator and the handle that feeds it
    pub fn new(target_activity: impl Into<String>, seed: u64) -> (Self, LobbyHandle) {
        let (request_tx, request_rx) = mpsc::channel(256);
        let (event_tx, _) = broadcast::channel(256);
        let published = Arc::new(RwLock::new(PublishedLobby {
            snapshot: ReadinessSnapshot::default(),
            phase: SessionPhase::Open,
        }));

        let handle = LobbyHandle {
            request_tx,
            event_tx: event_tx.clone(),
            published: published.clone(),
        };

        let coordinator = Self {
            registry: ParticipantRegistry::new(),
            phase: SessionPhase::Open,
            target_activity: target_activity.into(),
            entities: HashMap::new(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            request_rx,
            event_tx,
            published,
        };

        (coordinator, handle)
    }

    /// Process requests one at a time until every handle is dropped
    pub async fn run(mut self) {
        info!(target_activity = %self.target_activity, "Session coordinator started");

        while let Some(request) = self.request_rx.recv().await {
            self.apply(request);
        }

        info!("Session coordinator stopped");
    }

    /// Apply a single request
    pub fn apply(&mut self, request: LobbyRequest) -> RequestOutcome {
        let participant_id = request.participant_id;
        let outcome = match request.command {
            LobbyCommand::Connect => self.handle_connect(participant_id),
            LobbyCommand::Disconnect => self.handle_disconnect(participant_id),
            LobbyCommand::SetReady { ready } => self.handle_set_ready(participant_id, ready),
            LobbyCommand::StartSession => self.handle_start(participant_id),
            LobbyCommand::EntityState { entity_id, state } => {
                self.handle_entity_state(participant_id, entity_id, state)
            }
            LobbyCommand::Resync { reply } => {
                // Receiver may have hung up already; nothing to do then
                let _ = reply.send(self.lobby_state());
                RequestOutcome::Applied
            }
        };

        if let RequestOutcome::Ignored(reason) = outcome {
            debug!(
                participant_id = %participant_id,
                reason = %reason,
                queued_ms = unix_millis().saturating_sub(request.received_at),
                "Request ignored"
            );
        }

        outcome
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn snapshot(&self) -> ReadinessSnapshot {
        aggregate(&self.registry)
    }

    pub fn entity_owner(&self, entity_id: &EntityId) -> Option<ParticipantId> {
        self.entities.get(entity_id).map(|record| record.owner_id)
    }

    /// Entities owned by a participant
    pub fn entities_owned_by(&self, owner: ParticipantId) -> Vec<EntityId> {
        self.entities
            .iter()
            .filter(|(_, record)| record.owner_id == owner)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Everything a client needs to rebuild its view from scratch
    pub fn lobby_state(&self) -> ServerMsg {
        let snapshot = aggregate(&self.registry);
        let active_session = match self.phase {
            SessionPhase::Transitioned => Some(self.target_activity.clone()),
            SessionPhase::Open => None,
        };
        let mut entities: Vec<EntitySnapshot> = self
            .entities
            .iter()
            .map(|(entity_id, record)| EntitySnapshot {
                entity_id: *entity_id,
                owner_id: record.owner_id,
                state: record.last_state,
            })
            .collect();
        entities.sort_by_key(|entity| entity.entity_id);

        ServerMsg::LobbyState {
            ready_count: snapshot.ready_count,
            total_count: snapshot.total_count,
            active_session,
            entities,
        }
    }

    fn handle_connect(&mut self, participant_id: ParticipantId) -> RequestOutcome {
        if !self.registry.add(participant_id) {
            return RequestOutcome::Ignored(IgnoreReason::AlreadyConnected);
        }

        info!(
            participant_id = %participant_id,
            total = self.registry.len(),
            "Participant connected"
        );
        self.publish_readiness();

        if self.phase == SessionPhase::Transitioned {
            // Late joiner: replay existing spawns so it can build its replicas
            self.replay_spawns();
            self.spawn_entity_for(participant_id);
        }

        RequestOutcome::Applied
    }

    fn handle_disconnect(&mut self, participant_id: ParticipantId) -> RequestOutcome {
        if !self.registry.remove(participant_id) {
            return RequestOutcome::Ignored(IgnoreReason::UnknownParticipant);
        }

        info!(
            participant_id = %participant_id,
            total = self.registry.len(),
            "Participant disconnected"
        );
        self.publish_readiness();

        for entity_id in self.entities_owned_by(participant_id) {
            self.entities.remove(&entity_id);
            let _ = self.event_tx.send(ServerMsg::EntityDespawned { entity_id });
            debug!(entity_id = %entity_id, "Entity despawned with its owner");
        }

        RequestOutcome::Applied
    }

    fn handle_set_ready(&mut self, participant_id: ParticipantId, ready: bool) -> RequestOutcome {
        if self.phase == SessionPhase::Transitioned {
            return RequestOutcome::Ignored(IgnoreReason::SessionClosed);
        }

        if !self.registry.set_ready(participant_id, ready) {
            return RequestOutcome::Ignored(IgnoreReason::UnknownParticipant);
        }

        debug!(participant_id = %participant_id, ready, "Readiness updated");
        self.publish_readiness();
        RequestOutcome::Applied
    }

    fn handle_start(&mut self, participant_id: ParticipantId) -> RequestOutcome {
        if self.phase == SessionPhase::Transitioned {
            return RequestOutcome::Ignored(IgnoreReason::SessionClosed);
        }

        let snapshot = aggregate(&self.registry);
        if !snapshot.is_consensus() {
            return RequestOutcome::Ignored(IgnoreReason::ConsensusNotReached);
        }

        self.phase = SessionPhase::Transitioned;
        self.published.write().phase = SessionPhase::Transitioned;

        info!(
            requested_by = %participant_id,
            participants = snapshot.total_count,
            target = %self.target_activity,
            "Consensus reached, transitioning session"
        );
        let _ = self.event_tx.send(ServerMsg::SessionTransition {
            target: self.target_activity.clone(),
        });

        // Sorted so a fixed seed yields the same placement per run
        let mut owners: Vec<ParticipantId> = self.registry.ids().collect();
        owners.sort();
        for owner in owners {
            self.spawn_entity_for(owner);
        }

        RequestOutcome::Applied
    }

    fn handle_entity_state(
        &mut self,
        participant_id: ParticipantId,
        entity_id: EntityId,
        state: ReplicatedState,
    ) -> RequestOutcome {
        let Some(record) = self.entities.get_mut(&entity_id) else {
            return RequestOutcome::Ignored(IgnoreReason::UnknownEntity);
        };

        let owner = record.owner_id;
        if owner != participant_id {
            warn!(
                participant_id = %participant_id,
                entity_id = %entity_id,
                owner_id = %owner,
                "State update from non-owner dropped"
            );
            return RequestOutcome::Ignored(IgnoreReason::NotOwner);
        }

        record.last_state = state;
        let _ = self
            .event_tx
            .send(ServerMsg::EntityState { entity_id, state });
        RequestOutcome::Applied
    }

    /// Recompute from the registry and publish, in the same step as the mutation
    fn publish_readiness(&mut self) {
        let snapshot = aggregate(&self.registry);
        self.published.write().snapshot = snapshot;
        let _ = self.event_tx.send(ServerMsg::Readiness {
            ready_count: snapshot.ready_count,
            total_count: snapshot.total_count,
        });
    }

    fn spawn_entity_for(&mut self, owner_id: ParticipantId) {
        let entity_id = Uuid::new_v4();
        let angle = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let distance = self.rng.gen_range(0.0..SPAWN_RADIUS);
        let position = [angle.cos() * distance, 0.0, angle.sin() * distance];
        let facing_yaw = self.rng.gen_range(-180.0..180.0);

        self.entities.insert(
            entity_id,
            EntityRecord {
                owner_id,
                last_state: ReplicatedState {
                    position,
                    facing_yaw,
                    ..Default::default()
                },
            },
        );
        let _ = self.event_tx.send(ServerMsg::EntitySpawned {
            entity_id,
            owner_id,
            position,
            facing_yaw,
        });

        info!(entity_id = %entity_id, owner_id = %owner_id, "Entity spawned");
    }

    fn replay_spawns(&self) {
        for (entity_id, record) in &self.entities {
            let _ = self.event_tx.send(ServerMsg::EntitySpawned {
                entity_id: *entity_id,
                owner_id: record.owner_id,
                position: record.last_state.position,
                facing_yaw: record.last_state.facing_yaw,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coordinator() -> (SessionCoordinator, LobbyHandle) {
        SessionCoordinator::new("GameScene", 7)
    }

    fn apply(c: &mut SessionCoordinator, id: ParticipantId, command: LobbyCommand) -> RequestOutcome {
        c.apply(LobbyRequest::new(id, command))
    }

    fn drain(rx: &mut broadcast::Receiver<ServerMsg>) -> Vec<ServerMsg> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn connect_publishes_counts() {
        let (mut c, handle) = coordinator();
        let mut rx = handle.subscribe();
        let id = Uuid::new_v4();

        assert!(apply(&mut c, id, LobbyCommand::Connect).is_applied());
        assert_eq!(
            drain(&mut rx),
            vec![ServerMsg::Readiness {
                ready_count: 0,
                total_count: 1
            }]
        );
        assert_eq!(handle.snapshot().total_count, 1);
    }

    #[test]
    fn duplicate_connect_is_ignored_without_publish() {
        let (mut c, handle) = coordinator();
        let id = Uuid::new_v4();
        apply(&mut c, id, LobbyCommand::Connect);
        let mut rx = handle.subscribe();

        assert_eq!(
            apply(&mut c, id, LobbyCommand::Connect),
            RequestOutcome::Ignored(IgnoreReason::AlreadyConnected)
        );
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn stale_ready_request_is_a_no_op() {
        let (mut c, handle) = coordinator();
        let id = Uuid::new_v4();
        apply(&mut c, id, LobbyCommand::Connect);
        apply(&mut c, id, LobbyCommand::Disconnect);

        let outcome = apply(&mut c, id, LobbyCommand::SetReady { ready: true });
        assert_eq!(outcome, RequestOutcome::Ignored(IgnoreReason::UnknownParticipant));
        assert_eq!(handle.snapshot(), ReadinessSnapshot::default());
    }

    #[test]
    fn start_with_no_participants_is_a_no_op() {
        let (mut c, handle) = coordinator();
        let mut rx = handle.subscribe();
        let outcome = apply(&mut c, Uuid::new_v4(), LobbyCommand::StartSession);
        assert_eq!(outcome, RequestOutcome::Ignored(IgnoreReason::ConsensusNotReached));
        assert_eq!(c.phase(), SessionPhase::Open);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn transition_fires_once_and_spawns_one_entity_each() {
        let (mut c, handle) = coordinator();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for id in [a, b] {
            apply(&mut c, id, LobbyCommand::Connect);
            apply(&mut c, id, LobbyCommand::SetReady { ready: true });
        }
        let mut rx = handle.subscribe();

        assert!(apply(&mut c, a, LobbyCommand::StartSession).is_applied());
        assert_eq!(
            apply(&mut c, b, LobbyCommand::StartSession),
            RequestOutcome::Ignored(IgnoreReason::SessionClosed)
        );
        assert_eq!(handle.phase(), SessionPhase::Transitioned);

        let events = drain(&mut rx);
        let transitions = events
            .iter()
            .filter(|m| matches!(m, ServerMsg::SessionTransition { target } if target == "GameScene"))
            .count();
        assert_eq!(transitions, 1);
        assert_eq!(c.entities_owned_by(a).len(), 1);
        assert_eq!(c.entities_owned_by(b).len(), 1);
    }

    #[test]
    fn readiness_is_frozen_after_transition() {
        let (mut c, _handle) = coordinator();
        let a = Uuid::new_v4();
        apply(&mut c, a, LobbyCommand::Connect);
        apply(&mut c, a, LobbyCommand::SetReady { ready: true });
        apply(&mut c, a, LobbyCommand::StartSession);

        assert_eq!(
            apply(&mut c, a, LobbyCommand::SetReady { ready: false }),
            RequestOutcome::Ignored(IgnoreReason::SessionClosed)
        );
        assert_eq!(c.snapshot().ready_count, 1);
    }

    #[test]
    fn only_owner_state_is_relayed() {
        let (mut c, handle) = coordinator();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for id in [a, b] {
            apply(&mut c, id, LobbyCommand::Connect);
            apply(&mut c, id, LobbyCommand::SetReady { ready: true });
        }
        apply(&mut c, a, LobbyCommand::StartSession);
        let entity = c.entities_owned_by(a)[0];
        let mut rx = handle.subscribe();

        let state = ReplicatedState {
            facing_yaw: 42.0,
            ..Default::default()
        };
        assert_eq!(
            apply(&mut c, b, LobbyCommand::EntityState { entity_id: entity, state }),
            RequestOutcome::Ignored(IgnoreReason::NotOwner)
        );
        assert!(drain(&mut rx).is_empty());

        assert!(apply(&mut c, a, LobbyCommand::EntityState { entity_id: entity, state }).is_applied());
        assert_eq!(
            drain(&mut rx),
            vec![ServerMsg::EntityState {
                entity_id: entity,
                state
            }]
        );

        assert_eq!(
            apply(
                &mut c,
                a,
                LobbyCommand::EntityState {
                    entity_id: Uuid::new_v4(),
                    state
                }
            ),
            RequestOutcome::Ignored(IgnoreReason::UnknownEntity)
        );
    }

    #[test]
    fn owner_disconnect_despawns_entity() {
        let (mut c, handle) = coordinator();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for id in [a, b] {
            apply(&mut c, id, LobbyCommand::Connect);
            apply(&mut c, id, LobbyCommand::SetReady { ready: true });
        }
        apply(&mut c, a, LobbyCommand::StartSession);
        let entity = c.entities_owned_by(b)[0];
        let mut rx = handle.subscribe();

        apply(&mut c, b, LobbyCommand::Disconnect);
        let events = drain(&mut rx);
        assert!(events.contains(&ServerMsg::EntityDespawned { entity_id: entity }));
        assert!(c.entity_owner(&entity).is_none());
        assert_eq!(c.snapshot().total_count, 1);
    }

    #[test]
    fn lobby_state_lists_only_live_entities() {
        let (mut c, _handle) = coordinator();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        for id in [a, b] {
            apply(&mut c, id, LobbyCommand::Connect);
            apply(&mut c, id, LobbyCommand::SetReady { ready: true });
        }
        match c.lobby_state() {
            ServerMsg::LobbyState {
                active_session,
                entities,
                ..
            } => {
                assert_eq!(active_session, None);
                assert!(entities.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }

        apply(&mut c, a, LobbyCommand::StartSession);
        apply(&mut c, b, LobbyCommand::Disconnect);
        let kept = c.entities_owned_by(a)[0];

        let ServerMsg::LobbyState {
            ready_count,
            total_count,
            active_session,
            entities,
        } = c.lobby_state()
        else {
            panic!("expected lobby state");
        };
        assert_eq!((ready_count, total_count), (1, 1));
        assert_eq!(active_session.as_deref(), Some("GameScene"));
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_id, kept);
        assert_eq!(entities[0].owner_id, a);
    }

    #[test]
    fn resync_answers_only_the_requester() {
        let (mut c, handle) = coordinator();
        let a = Uuid::new_v4();
        apply(&mut c, a, LobbyCommand::Connect);
        let mut rx = handle.subscribe();

        let (reply, mut answer) = oneshot::channel();
        assert!(apply(&mut c, a, LobbyCommand::Resync { reply }).is_applied());
        assert!(matches!(
            answer.try_recv(),
            Ok(ServerMsg::LobbyState { total_count: 1, .. })
        ));
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn late_joiner_gets_an_entity_and_existing_spawns() {
        let (mut c, handle) = coordinator();
        let a = Uuid::new_v4();
        apply(&mut c, a, LobbyCommand::Connect);
        apply(&mut c, a, LobbyCommand::SetReady { ready: true });
        apply(&mut c, a, LobbyCommand::StartSession);
        let existing = c.entities_owned_by(a)[0];
        let mut rx = handle.subscribe();

        let late = Uuid::new_v4();
        apply(&mut c, late, LobbyCommand::Connect);
        let spawned: Vec<(Uuid, Uuid)> = drain(&mut rx)
            .into_iter()
            .filter_map(|m| match m {
                ServerMsg::EntitySpawned {
                    entity_id, owner_id, ..
                } => Some((entity_id, owner_id)),
                _ => None,
            })
            .collect();

        assert!(spawned.contains(&(existing, a)));
        assert_eq!(spawned.iter().filter(|(_, o)| *o == late).count(), 1);
    }
}
