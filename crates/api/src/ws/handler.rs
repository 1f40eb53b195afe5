use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use medialoom_core::types::JobId;

use crate::state::AppState;
use crate::ws::messages::{ClientMessage, ServerMessage};

/// HTTP handler that upgrades the connection to WebSocket.
///
/// After the upgrade the connection is registered with `WsManager` and
/// managed by two spawned tasks (sender + receiver).
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single WebSocket connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Processes inbound subscription commands on the current task.
///   4. Cleans up on disconnect.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    // Register and get the receiver for outbound messages.
    let mut rx = state.ws_manager.add(conn_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Receiver loop: process inbound subscription commands.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(command) => dispatch_command(&state, &conn_id, command).await,
                Err(e) => {
                    send(&state, &conn_id, ServerMessage::Error {
                        message: format!("Unrecognized command: {e}"),
                    })
                    .await;
                }
            },
            Ok(_msg) => {
                // Binary and ping frames carry no commands.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: remove connection (dropping its subscriptions) and abort
    // the sender task.
    state.ws_manager.remove(&conn_id).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}

/// Apply one client command to the connection's subscriptions.
async fn dispatch_command(state: &AppState, conn_id: &str, command: ClientMessage) {
    match command {
        ClientMessage::Subscribe { job_id } => {
            subscribe_one(state, conn_id, job_id).await;
        }
        ClientMessage::Unsubscribe { job_id } => {
            let message = if state.ws_manager.unsubscribe(conn_id, job_id).await {
                ServerMessage::Unsubscribed { job_id }
            } else {
                ServerMessage::Error {
                    message: format!("Not subscribed to job {job_id}"),
                }
            };
            send(state, conn_id, message).await;
        }
        ClientMessage::Ping => {
            send(state, conn_id, ServerMessage::Pong).await;
        }
        ClientMessage::SubscribeOwner { owner } => {
            let job_ids = state.store.ids_by_owner(&owner).await;
            if job_ids.is_empty() {
                send(state, conn_id, ServerMessage::Error {
                    message: format!("No jobs found for owner {owner}"),
                })
                .await;
                return;
            }
            for job_id in job_ids {
                subscribe_one(state, conn_id, job_id).await;
            }
        }
    }
}

/// Subscribe the connection to one job and send the acknowledgement plus
/// a state snapshot, so the client starts from current progress rather
/// than zero.
async fn subscribe_one(state: &AppState, conn_id: &str, job_id: JobId) {
    if state.store.get(job_id).await.is_none() {
        send(state, conn_id, ServerMessage::Error {
            message: format!("Job {job_id} not found"),
        })
        .await;
        return;
    }

    if !state
        .ws_manager
        .subscribe(conn_id, job_id, &state.bus)
        .await
    {
        send(state, conn_id, ServerMessage::Error {
            message: format!("Already subscribed to job {job_id}"),
        })
        .await;
        return;
    }

    send(state, conn_id, ServerMessage::Subscribed { job_id }).await;
    // Snapshot read after the bus subscription: anything that happened in
    // between arrives again as a live event, which the monotonic progress
    // contract makes harmless.
    if let Some(job) = state.store.get(job_id).await {
        send(state, conn_id, ServerMessage::JobState { job }).await;
    }
}

async fn send(state: &AppState, conn_id: &str, message: ServerMessage) {
    state
        .ws_manager
        .send_to(conn_id, Message::Text(message.to_json().into()))
        .await;
}
