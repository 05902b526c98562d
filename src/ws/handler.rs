//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::{AppState, ConnectionInfo};
use crate::lobby::{LobbyCommand, LobbyHandle, ParticipantId, SessionPhase};
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::feed::EventFeed;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let participant_id: ParticipantId = Uuid::new_v4();
    info!(participant_id = %participant_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before connecting so our own readiness publish is not missed
    let feed = EventFeed::new(participant_id, state.lobby.subscribe(), state.lobby.clone());

    let active_session = match state.lobby.phase() {
        SessionPhase::Transitioned => Some(state.config.target_activity.clone()),
        SessionPhase::Open => None,
    };
    let welcome = ServerMsg::Welcome {
        participant_id,
        server_time: unix_millis(),
        active_session,
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(participant_id = %participant_id, error = %e, "Failed to send welcome");
        return;
    }

    if state.lobby.connect(participant_id).await.is_err() {
        error!(participant_id = %participant_id, "Session coordinator unavailable");
        return;
    }
    state.connections.insert(
        participant_id,
        ConnectionInfo {
            connected_at: unix_millis(),
        },
    );

    run_session(participant_id, ws_sink, ws_stream, &state.lobby, feed).await;

    // Cleanup on disconnect; requests still queued behind this become no-ops
    state.connections.remove(&participant_id);
    if state.lobby.disconnect(participant_id).await.is_err() {
        debug!(participant_id = %participant_id, "Coordinator gone before disconnect");
    }

    info!(participant_id = %participant_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    participant_id: ParticipantId,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    lobby: &LobbyHandle,
    mut feed: EventFeed,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Spawn writer task: coordinator broadcasts -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = feed.next().await {
            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(participant_id = %participant_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> coordinator queue
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_message() {
                    warn!(participant_id = %participant_id, "Rate limited client message");
                    continue;
                }

                match serde_json::from_str::<ClientMsg>(&text) {
                    Ok(client_msg) => {
                        if lobby.send(participant_id, to_command(client_msg)).await.is_err() {
                            debug!(participant_id = %participant_id, "Coordinator queue closed");
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(participant_id = %participant_id, error = %e, "Failed to parse client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(participant_id = %participant_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(participant_id = %participant_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(participant_id = %participant_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    writer_handle.abort();
}

/// Map a wire message onto a coordinator command
pub fn to_command(msg: ClientMsg) -> LobbyCommand {
    match msg {
        ClientMsg::SetReady { ready } => LobbyCommand::SetReady { ready },
        ClientMsg::StartSession => LobbyCommand::StartSession,
        ClientMsg::EntityState { entity_id, state } => LobbyCommand::EntityState { entity_id, state },
    }
}

/// Send a message over WebSocket
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
