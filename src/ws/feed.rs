//! Per-connection view of the coordinator's broadcast
//!
//! Most published events (transition, spawn, despawn) happen once, so a
//! receiver that lags cannot just skip ahead. On lag the feed drops its
//! backlog, resubscribes at the head and asks the coordinator for a full
//! `LobbyState`, which the client applies in place of what it had.

use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::lobby::{LobbyHandle, ParticipantId};
use crate::ws::protocol::ServerMsg;

pub struct EventFeed {
    participant_id: ParticipantId,
    events_rx: broadcast::Receiver<ServerMsg>,
    lobby: LobbyHandle,
}

impl EventFeed {
    /// `events_rx` should be subscribed before the participant connects so
    /// its own readiness publish is not missed
    pub fn new(
        participant_id: ParticipantId,
        events_rx: broadcast::Receiver<ServerMsg>,
        lobby: LobbyHandle,
    ) -> Self {
        Self {
            participant_id,
            events_rx,
            lobby,
        }
    }

    /// Next message to deliver. `None` once the coordinator is gone.
    pub async fn next(&mut self) -> Option<ServerMsg> {
        match self.events_rx.recv().await {
            Ok(msg) => Some(msg),
            Err(RecvError::Lagged(n)) => {
                warn!(
                    participant_id = %self.participant_id,
                    lagged_count = n,
                    "Client lagged, resynchronising"
                );
                // Anything still buffered predates the resync reply
                self.events_rx = self.events_rx.resubscribe();
                match self.lobby.resync(self.participant_id).await {
                    Ok(state) => Some(state),
                    Err(e) => {
                        debug!(participant_id = %self.participant_id, error = %e, "Resync failed");
                        None
                    }
                }
            }
            Err(RecvError::Closed) => {
                debug!(participant_id = %self.participant_id, "Event channel closed");
                None
            }
        }
    }
}
