//! WebSocket connection manager.
//!
//! Tracks active connections, which lists each one subscribed to, and the
//! part of each list a connection holds, so patch batches reach exactly the
//! clients holding that list in positions they can apply.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use datasource_engine::{DataSourceType, ListId, ListIndex, PatchBatch};
use tokio::sync::mpsc;

use super::{ServerMessage, SubscriberWindow};

/// Sender for WebSocket messages.
pub type MessageSender = mpsc::UnboundedSender<ServerMessage>;

/// A single WebSocket connection.
#[derive(Debug)]
pub struct Connection {
    pub sender: MessageSender,
    /// Loaded range of each list, in backing-list indices.
    pub windows: HashMap<ListId, SubscriberWindow>,
}

/// Manages active WebSocket connections and their list subscriptions.
///
/// Thread-safe and can be shared across handlers via `Arc`.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: DashMap<String, Connection>,
    /// Connection ids subscribed to each list.
    subscriptions: DashMap<ListId, HashSet<String>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new connection manager wrapped in Arc for sharing.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Register a new connection.
    ///
    /// Returns the connection ID.
    pub fn register(&self, sender: MessageSender) -> String {
        let conn_id = uuid::Uuid::new_v4().to_string();

        self.connections.insert(
            conn_id.clone(),
            Connection {
                sender,
                windows: HashMap::new(),
            },
        );

        tracing::info!(conn_id = %conn_id, "WebSocket connection registered");

        conn_id
    }

    /// Unregister a connection and drop its subscriptions.
    pub fn unregister(&self, conn_id: &str) {
        if self.connections.remove(conn_id).is_some() {
            self.subscriptions.retain(|_, subscribers| {
                subscribers.remove(conn_id);
                !subscribers.is_empty()
            });

            tracing::info!(conn_id = %conn_id, "WebSocket connection unregistered");
        }
    }

    /// Subscribe a connection to a list's patch batches.
    ///
    /// Returns false if the connection is unknown.
    pub fn subscribe(&self, conn_id: &str, list_id: &str) -> bool {
        if !self.connections.contains_key(conn_id) {
            return false;
        }
        self.subscriptions
            .entry(list_id.to_string())
            .or_default()
            .insert(conn_id.to_string());

        tracing::debug!(conn_id = %conn_id, list_id = %list_id, "Subscribed");
        true
    }

    /// Returns whether the connection was subscribed.
    pub fn unsubscribe(&self, conn_id: &str, list_id: &str) -> bool {
        let Some(mut subscribers) = self.subscriptions.get_mut(list_id) else {
            return false;
        };
        let removed = subscribers.remove(conn_id);
        if subscribers.is_empty() {
            drop(subscribers);
            self.subscriptions.remove(list_id);
        }
        removed
    }

    /// Record the range a connection loaded, replacing any earlier one.
    pub fn track_window(&self, conn_id: &str, list_id: &str, start: ListIndex, count: usize) {
        if let Some(mut conn) = self.connections.get_mut(conn_id) {
            conn.windows
                .insert(list_id.to_string(), SubscriberWindow::new(start, count));
        }
    }

    /// Grow the tracked range by a fetched one.
    pub fn extend_window(&self, conn_id: &str, list_id: &str, start: ListIndex, count: usize) {
        if let Some(mut conn) = self.connections.get_mut(conn_id) {
            conn.windows
                .entry(list_id.to_string())
                .and_modify(|window| window.extend(start, count))
                .or_insert_with(|| SubscriberWindow::new(start, count));
        }
    }

    pub fn window(&self, conn_id: &str, list_id: &str) -> Option<SubscriberWindow> {
        self.connections
            .get(conn_id)
            .and_then(|conn| conn.windows.get(list_id).copied())
    }

    /// Push a patch batch to every subscriber of its list.
    ///
    /// Each subscriber gets the operations rewritten into the positions of
    /// the range it loaded. Connections that never loaded the list get the
    /// batch as produced. `skipped` holds the positions of operations the
    /// backing list rejected.
    ///
    /// Returns the number of connections that received the batch.
    pub fn publish_batch(
        &self,
        source_type: DataSourceType,
        batch: &PatchBatch,
        skipped: &HashSet<usize>,
    ) -> usize {
        let list_id = batch.list_id.as_str();
        let recipients: Vec<String> = match self.subscriptions.get(list_id) {
            Some(subscribers) => subscribers.iter().cloned().collect(),
            None => return 0,
        };

        let mut sent_count = 0;
        for conn_id in &recipients {
            let Some(mut conn) = self.connections.get_mut(conn_id) else {
                continue;
            };
            let operations = match conn.windows.get_mut(list_id) {
                Some(window) => window.rebase(&batch.operations, skipped),
                None => batch.operations.clone(),
            };
            let message = ServerMessage::update(
                source_type,
                PatchBatch::new(list_id, batch.list_version, operations),
            );
            if conn.sender.send(message).is_ok() {
                sent_count += 1;
            } else {
                tracing::debug!(conn_id = %conn_id, list_id = %list_id, "Subscriber channel closed");
            }
        }

        tracing::debug!(
            list_id = %list_id,
            list_version = batch.list_version,
            recipients = sent_count,
            "Published patch batch to subscribers"
        );

        sent_count
    }

    /// Send a message to a specific connection.
    pub fn send_to(&self, conn_id: &str, message: ServerMessage) -> bool {
        match self.connections.get(conn_id) {
            Some(conn) => conn.sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Get the number of active connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn subscriber_count(&self, list_id: &str) -> usize {
        self.subscriptions
            .get(list_id)
            .map(|subscribers| subscribers.len())
            .unwrap_or(0)
    }
}
