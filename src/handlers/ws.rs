use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    user_id: Uuid,
    token: Option<String>,
}

/// WebSocket upgrade handler. The session registers with the notification
/// dispatcher under the user's id and receives that user's status-change
/// events until it disconnects.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    // Validate token if provided
    if let Some(token) = &params.token {
        if !validate_token(token) {
            tracing::warn!("Invalid WebSocket authentication token");
            return axum::http::StatusCode::UNAUTHORIZED.into_response();
        }
    }

    let user_id = params.user_id;
    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();

    let (session_id, mut events) = state.dispatcher.subscribe(user_id).await;
    tracing::info!(%user_id, %session_id, "WebSocket session registered");

    // Task to handle incoming messages from the client
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    tracing::debug!("Received text message: {}", text);
                }
                Message::Ping(_) => {
                    tracing::trace!("Received ping");
                    // Axum handles pong automatically
                }
                Message::Close(_) => {
                    tracing::info!("Client closed connection");
                    break;
                }
                _ => {}
            }
        }
    });

    // Task to forward notification events and heartbeats to the client
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat_interval = tokio::time::interval(tokio::time::Duration::from_secs(30));

        loop {
            tokio::select! {
                // Send heartbeat ping
                _ = heartbeat_interval.tick() => {
                    if sender.send(Message::Ping(vec![])).await.is_err() {
                        tracing::info!("Client disconnected during heartbeat");
                        break;
                    }
                }
                // Forward this user's notification events
                event = events.recv() => {
                    match event {
                        Some(event) => {
                            let json = match serde_json::to_string(&event) {
                                Ok(j) => j,
                                Err(e) => {
                                    tracing::error!("Failed to serialize event: {}", e);
                                    continue;
                                }
                            };

                            if sender.send(Message::Text(json)).await.is_err() {
                                tracing::info!("Client disconnected");
                                break;
                            }
                        }
                        None => {
                            tracing::info!("Notification channel closed");
                            break;
                        }
                    }
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    state.dispatcher.unsubscribe(user_id, session_id).await;
    tracing::info!(%user_id, %session_id, "WebSocket connection closed");
}

/// Simple token validation (replace with actual auth logic)
fn validate_token(token: &str) -> bool {
    !token.is_empty()
}
