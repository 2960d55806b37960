// src/hub.rs

//! Broadcast hub for push connections.
//!
//! Each open `/sse` request is one [`PushConnection`]. A broadcast sends the
//! signal to every connection registered at that moment and drops them all;
//! browsers reconnect and register again for the next change.

use crate::signal::ReloadSignal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;
use tracing::debug;

/// Server side of one waiting browser tab.
#[derive(Debug)]
pub struct PushConnection {
    tx: oneshot::Sender<String>,
}

/// Request side of a [`PushConnection`]: resolves with the single message the
/// connection will ever get.
#[derive(Debug)]
pub struct Subscription {
    rx: oneshot::Receiver<String>,
}

impl PushConnection {
    pub fn new() -> (PushConnection, Subscription) {
        let (tx, rx) = oneshot::channel();
        (PushConnection { tx }, Subscription { rx })
    }

    /// Sends the message; false if the other side is already gone.
    fn send(self, message: String) -> bool {
        self.tx.send(message).is_ok()
    }
}

impl Subscription {
    /// Waits for the message. `None` if the hub dropped the connection
    /// without signalling it (shutdown).
    pub async fn recv(self) -> Option<String> {
        self.rx.await.ok()
    }
}

/// Set of connections waiting for the next reload signal.
#[derive(Debug, Default)]
pub struct Hub {
    connections: Mutex<HashMap<u64, PushConnection>>,
    next_id: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<u64, PushConnection>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a connection; it receives the next broadcast.
    pub fn register(&self, connection: PushConnection) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections().insert(id, connection);
        debug!(id, "Push connection registered");
        id
    }

    /// Opens a connection and registers it in one step.
    pub fn subscribe(&self) -> Subscription {
        let (connection, subscription) = PushConnection::new();
        self.register(connection);
        subscription
    }

    /// Sends `signal` to every registered connection and removes them all.
    /// Returns how many were still listening.
    pub fn broadcast(&self, signal: ReloadSignal) -> usize {
        // Taken under the lock so registrations racing with this call wait for the next one.
        let drained = std::mem::take(&mut *self.connections());
        if drained.is_empty() {
            return 0;
        }

        let message = signal.to_message();
        let total = drained.len();
        let mut delivered = 0;
        for (id, connection) in drained {
            if connection.send(message.clone()) {
                delivered += 1;
            } else {
                debug!(id, "Push connection already closed by client");
            }
        }
        debug!(%signal, delivered, total, "Broadcast complete");
        delivered
    }

    /// Drops every connection without a signal.
    pub fn disconnect_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.connections());
        drained.len()
    }

    pub fn len(&self) -> usize {
        self.connections().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections().is_empty()
    }
}
