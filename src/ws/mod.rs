pub mod handlers;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use crate::protocol::{ClientMessage, ServerMessage};
use crate::state::AppState;
use crate::types::{Participant, SessionId};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub participant_id: Option<String>,
    pub display_name: Option<String>,
}

impl WsQuery {
    /// Identity is trusted as given; anonymous connections get a guest id
    pub fn into_participant(self) -> Participant {
        let id = self
            .participant_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("guest-{}", ulid::Ulid::new()));
        let display_name = self
            .display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| id.clone());
        Participant::new(id, display_name)
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    tracing::info!(
        "WebSocket connection request: participant_id={:?}",
        params.participant_id
    );

    ws.on_upgrade(move |socket| handle_socket(socket, params.into_participant(), state))
}

/// Whether a broadcast event should go out on this connection
fn should_forward(msg: &ServerMessage, participant_id: &str, joined: &HashSet<SessionId>) -> bool {
    match msg.session_id() {
        Some(session_id) => joined.contains(session_id) || msg.concerns(participant_id),
        None => false,
    }
}

async fn send_json(
    sender: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: &ServerMessage,
) -> bool {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            tracing::error!("Failed to serialize message: {}", e);
            true
        }
    }
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, participant: Participant, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    tracing::info!("WebSocket connected: {}", participant.id);

    let welcome = ServerMessage::Welcome {
        protocol: "1.0".to_string(),
        participant_id: participant.id.clone(),
        server_now: chrono::Utc::now().to_rfc3339(),
    };
    if !send_json(&mut sender, &welcome).await {
        tracing::error!("Failed to send welcome message");
        return;
    }

    let mut broadcast_rx = state.broadcast.subscribe();
    // Sessions this connection started, joined or asked about
    let mut joined: HashSet<SessionId> = HashSet::new();

    loop {
        tokio::select! {
            broadcast_msg = broadcast_rx.recv() => {
                match broadcast_msg {
                    Ok(msg) => {
                        if !should_forward(&msg, &participant.id, &joined) {
                            continue;
                        }
                        if let Some(session_id) = msg.session_id() {
                            joined.insert(session_id.to_string());
                        }
                        if !send_json(&mut sender, &msg).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!("{} lagged behind by {} events", participant.id, skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            ws_msg = receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        tracing::debug!("Received message: {}", text);

                        let response = match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(client_msg) => {
                                handlers::handle_message(client_msg, &participant, &state).await
                            }
                            Err(e) => {
                                tracing::error!("Failed to parse client message: {}", e);
                                Some(ServerMessage::Error {
                                    code: "PARSE_ERROR".to_string(),
                                    msg: format!("Invalid message format: {}", e),
                                })
                            }
                        };

                        if let Some(response) = response {
                            if let Some(session_id) = response.session_id() {
                                joined.insert(session_id.to_string());
                            }
                            if !send_json(&mut sender, &response).await {
                                tracing::error!("Failed to send response");
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        tracing::info!("WebSocket closed");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::error!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    let abandoned = state.abandon_all_for(&participant.id).await;
    tracing::info!(
        "WebSocket connection closed for {} ({} sessions abandoned)",
        participant.id,
        abandoned
    );
}
