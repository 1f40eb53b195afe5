use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{broadcast, mpsc, RwLock};

use medialoom_core::types::{JobId, Timestamp};
use medialoom_events::{ProgressBus, ProgressEvent};

use crate::ws::messages::ServerMessage;

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single WebSocket connection.
pub struct WsConnection {
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// Jobs this connection receives progress events for.
    pub subscriptions: HashSet<JobId>,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

/// One relay per subscribed job: a task pumping the job's bus channel to
/// every subscribed connection.
struct Relay {
    subscribers: HashSet<String>,
    task: tokio::task::JoinHandle<()>,
}

/// Manages all active WebSocket connections and their job subscriptions.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application. A relay task is started when a job gets
/// its first subscriber and stopped when the last one leaves (or the job
/// reaches a terminal state and its bus channel closes).
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
    relays: RwLock<HashMap<JobId, Relay>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            relays: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(&self, conn_id: String) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            sender: tx,
            subscriptions: HashSet::new(),
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection and drop all of its subscriptions.
    pub async fn remove(self: &Arc<Self>, conn_id: &str) {
        let removed = self.connections.write().await.remove(conn_id);
        if let Some(conn) = removed {
            for job_id in conn.subscriptions {
                self.detach(job_id, conn_id).await;
            }
        }
    }

    /// Subscribe a connection to a job's progress events.
    ///
    /// Starts the job's relay task if this is its first subscriber.
    /// Returns false if the connection was already subscribed.
    pub async fn subscribe(
        self: &Arc<Self>,
        conn_id: &str,
        job_id: JobId,
        bus: &ProgressBus,
    ) -> bool {
        {
            let mut conns = self.connections.write().await;
            match conns.get_mut(conn_id) {
                Some(conn) => {
                    if !conn.subscriptions.insert(job_id) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        let mut relays = self.relays.write().await;
        if let Some(relay) = relays.get_mut(&job_id) {
            relay.subscribers.insert(conn_id.to_string());
        } else {
            let rx = bus.subscribe(job_id).await;
            let task = tokio::spawn(relay_loop(Arc::downgrade(self), job_id, rx));
            relays.insert(
                job_id,
                Relay {
                    subscribers: HashSet::from([conn_id.to_string()]),
                    task,
                },
            );
            tracing::debug!(job_id = %job_id, "Relay started");
        }
        true
    }

    /// Unsubscribe a connection from a job.
    ///
    /// Returns false if the connection was not subscribed.
    pub async fn unsubscribe(self: &Arc<Self>, conn_id: &str, job_id: JobId) -> bool {
        {
            let mut conns = self.connections.write().await;
            match conns.get_mut(conn_id) {
                Some(conn) => {
                    if !conn.subscriptions.remove(&job_id) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        self.detach(job_id, conn_id).await;
        true
    }

    /// Drop one subscriber from a relay, stopping the relay when it was
    /// the last one.
    async fn detach(&self, job_id: JobId, conn_id: &str) {
        let mut relays = self.relays.write().await;
        if let Some(relay) = relays.get_mut(&job_id) {
            relay.subscribers.remove(conn_id);
            if relay.subscribers.is_empty() {
                if let Some(relay) = relays.remove(&job_id) {
                    relay.task.abort();
                }
                tracing::debug!(job_id = %job_id, "Relay stopped, no subscribers left");
            }
        }
    }

    /// Send one message to a specific connection.
    ///
    /// Returns false when the connection is gone or its channel closed.
    pub async fn send_to(&self, conn_id: &str, message: Message) -> bool {
        let conns = self.connections.read().await;
        conns
            .get(conn_id)
            .map(|conn| conn.sender.send(message).is_ok())
            .unwrap_or(false)
    }

    /// Send a message to every connection subscribed to `job_id`.
    ///
    /// Connections whose send channels are closed are silently skipped
    /// (they are cleaned up on their next receive loop iteration).
    pub async fn fan_out(&self, job_id: JobId, message: Message) {
        let subscribers: Vec<String> = {
            let relays = self.relays.read().await;
            match relays.get(&job_id) {
                Some(relay) => relay.subscribers.iter().cloned().collect(),
                None => return,
            }
        };
        let conns = self.connections.read().await;
        for conn_id in subscribers {
            if let Some(conn) = conns.get(&conn_id) {
                let _ = conn.sender.send(message.clone());
            }
        }
    }

    /// The job's bus channel closed (terminal state delivered): drop the
    /// relay entry and forget the subscription on every connection.
    async fn relay_closed(&self, job_id: JobId) {
        let relay = self.relays.write().await.remove(&job_id);
        if let Some(relay) = relay {
            let mut conns = self.connections.write().await;
            for conn_id in relay.subscribers {
                if let Some(conn) = conns.get_mut(&conn_id) {
                    conn.subscriptions.remove(&job_id);
                }
            }
        }
        tracing::debug!(job_id = %job_id, "Relay finished, job terminal");
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Number of jobs with at least one subscriber.
    pub async fn relay_count(&self) -> usize {
        self.relays.read().await.len()
    }

    /// Send a Close frame to every connection, then clear everything.
    ///
    /// Used during graceful shutdown to notify all clients before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut relays = self.relays.write().await;
        for (_, relay) in relays.drain() {
            relay.task.abort();
        }
        drop(relays);

        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected client.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Pump one job's progress events to its subscribers until the channel
/// closes. Holds only a weak manager reference so a dropped manager tears
/// the task down instead of leaking it.
async fn relay_loop(
    manager: Weak<WsManager>,
    job_id: JobId,
    mut rx: broadcast::Receiver<ProgressEvent>,
) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Some(manager) = manager.upgrade() else {
                    return;
                };
                let text = ServerMessage::Progress { event }.to_json();
                manager.fan_out(job_id, Message::Text(text.into())).await;
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                // Slow consumer: the oldest buffered events were dropped,
                // newer ones still flow.
                tracing::warn!(job_id = %job_id, missed, "Relay lagged behind progress events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    if let Some(manager) = manager.upgrade() {
        manager.relay_closed(job_id).await;
    }
}
