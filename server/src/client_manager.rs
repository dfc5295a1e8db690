//! Registry of connected clients for the world-sync server
//!
//! This module tracks every client that completed the handshake:
//! - The framed writer used for broadcasts, behind its own lock
//! - A bounded inbound request queue drained once per tick
//! - Capacity limits and duplicate-id rejection
//!
//! The registry is not part of the world. A player can exist in the world
//! while inactive even though nobody is connected under its id.

use log::info;
use shared::protocol::{BoxedWriter, MessageWriter};
use shared::{Message, Request, Result, SyncError};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// A client that completed the handshake
///
/// Each client owns:
/// - The write half of its connection, locked per write so broadcasts and
///   direct replies never interleave frames
/// - The sending and receiving ends of its request queue. The receive loop
///   pushes, the tick loop drains.
pub struct ConnectedClient {
    /// Player id supplied in the connect request
    pub id: String,
    /// Remote address, for logging
    pub peer: String,
    writer: Mutex<MessageWriter<BoxedWriter>>,
    requests_tx: mpsc::Sender<Request>,
    requests_rx: Mutex<mpsc::Receiver<Request>>,
}

impl ConnectedClient {
    pub fn new(
        id: &str,
        peer: &str,
        writer: BoxedWriter,
        io_timeout: Duration,
        queue_capacity: usize,
    ) -> Self {
        let (requests_tx, requests_rx) = mpsc::channel(queue_capacity.max(1));
        Self {
            id: id.to_string(),
            peer: peer.to_string(),
            writer: Mutex::new(MessageWriter::new(writer, io_timeout)),
            requests_tx,
            requests_rx: Mutex::new(requests_rx),
        }
    }

    pub async fn send(&self, message: &Message) -> Result<()> {
        self.writer.lock().await.send(message).await
    }

    /// Writes an already encoded frame
    pub async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        self.writer.lock().await.send_frame(frame).await
    }

    /// Queues a request for the next tick
    ///
    /// Waits while the queue is full, which stalls the caller's read loop
    /// instead of dropping the request.
    pub async fn queue_request(&self, request: Request) -> Result<()> {
        self.requests_tx
            .send(request)
            .await
            .map_err(|_| SyncError::ConnectionClosed)
    }

    /// Takes every queued request without waiting for more
    pub async fn drain_requests(&self) -> Vec<Request> {
        let mut rx = self.requests_rx.lock().await;
        let mut requests = Vec::new();
        while let Ok(request) = rx.try_recv() {
            requests.push(request);
        }
        requests
    }
}

/// Manages the set of connected clients
///
/// Ids are unique: a second connection claiming a live id is refused, and a
/// server at capacity refuses everyone.
pub struct ClientManager {
    /// Connected clients indexed by player id
    clients: HashMap<String, Arc<ConnectedClient>>,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
        }
    }

    /// Registers a client that completed the handshake
    pub fn add_client(&mut self, client: Arc<ConnectedClient>) -> Result<()> {
        if self.clients.contains_key(&client.id) {
            return Err(SyncError::AlreadyConnected(client.id.clone()));
        }
        if self.clients.len() >= self.max_clients {
            return Err(SyncError::ServerFull(self.max_clients));
        }

        info!("Client {} connected from {}", client.id, client.peer);
        self.clients.insert(client.id.clone(), client);
        Ok(())
    }

    /// Checks whether a new client under `id` would be accepted
    pub fn check_available(&self, id: &str) -> Result<()> {
        if self.clients.contains_key(id) {
            Err(SyncError::AlreadyConnected(id.to_string()))
        } else if self.clients.len() >= self.max_clients {
            Err(SyncError::ServerFull(self.max_clients))
        } else {
            Ok(())
        }
    }

    /// Removes whoever is registered under `id`
    pub fn remove_client(&mut self, id: &str) -> Option<Arc<ConnectedClient>> {
        let removed = self.clients.remove(id);
        if let Some(client) = &removed {
            info!("Client {} disconnected", client.id);
        }
        removed
    }

    /// Removes `client` only if it is still the registered connection for
    /// its id. A stale connection must not evict a newer one.
    pub fn remove_if_same(&mut self, client: &Arc<ConnectedClient>) -> bool {
        match self.clients.get(&client.id) {
            Some(current) if Arc::ptr_eq(current, client) => {
                self.remove_client(&client.id);
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<ConnectedClient>> {
        self.clients.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.clients.contains_key(id)
    }

    /// Snapshot of every registered client
    pub fn clients(&self) -> Vec<Arc<ConnectedClient>> {
        self.clients.values().cloned().collect()
    }

    /// Registered ids in sorted order
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.clients.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
