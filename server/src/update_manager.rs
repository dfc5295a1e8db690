//! The single gateway for world mutations on the server
//!
//! Every change to the authoritative world is committed here: the update is
//! applied, the resulting processed events are drained and every registered
//! client receives them in commit order. Commits are serialized so all clients
//! observe the same sequence.
//!
//! Lock order is commit, then world, then clients. The world lock is released
//! before the broadcast takes the client registry.

use crate::client_manager::{ClientManager, ConnectedClient};
use crate::config::ServerConfig;
use log::{debug, error, info, warn};
use rand::Rng;
use shared::geometry::{random_vec, round_vec};
use shared::protocol::encode_frame;
use shared::{
    get_timestamp, Message, Player, Rect, Request, Result, SyncError, Update, UpdateKind, Vec2,
    World, PLAYER_HALF_EXTENTS, POSITION_PRECISION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, RwLock};

/// Spawn attempts before giving up on finding a free spot
const MAX_SPAWN_ATTEMPTS: usize = 32;

type Failed = Vec<Arc<ConnectedClient>>;

pub struct UpdateManager {
    world: RwLock<World>,
    clients: RwLock<ClientManager>,
    commit: Mutex<()>,
    config: ServerConfig,
}

impl UpdateManager {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            world: RwLock::new(World::new()),
            clients: RwLock::new(ClientManager::new(config.max_clients)),
            commit: Mutex::new(()),
            config,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Adds a player for a client that completed the handshake.
    ///
    /// Existing clients receive the `AddPlayer` broadcast; the new client
    /// receives a full `WorldState` instead.
    pub async fn player_connected(&self, client: Arc<ConnectedClient>) -> Result<()> {
        let (result, failed) = self.connect(client).await;
        self.reap(failed).await;
        result
    }

    async fn connect(&self, client: Arc<ConnectedClient>) -> (Result<()>, Failed) {
        let guard = self.commit.lock().await;
        if let Err(e) = self.clients.read().await.check_available(&client.id) {
            return (Err(e), Vec::new());
        }

        let id = client.id.clone();
        let range = self.config.spawn_range;
        let (result, mut failed) = self
            .commit_locked(&guard, |world| {
                let position = spawn_position(&mut rand::thread_rng(), world, range);
                world.apply_updates(vec![Update::new(UpdateKind::AddPlayer { id, position })])
            })
            .await;
        if let Err(e) = result {
            return (Err(e), failed);
        }

        if let Err(e) = self.clients.write().await.add_client(Arc::clone(&client)) {
            return (Err(e), failed);
        }

        let snapshot = self.world.read().await.sync_snapshot();
        let sync = Message::Update(Update::processed_at(
            UpdateKind::WorldState { world: snapshot },
            get_timestamp(),
        ));
        if let Err(e) = client.send(&sync).await {
            warn!("Failed to sync world state to {}: {}", client.id, e);
            failed.push(client);
            return (Err(e), failed);
        }
        (Ok(()), failed)
    }

    /// Deregisters whoever is connected as `id` and removes the player.
    pub async fn player_disconnected(&self, id: &str) -> Result<()> {
        let (result, failed) = {
            let guard = self.commit.lock().await;
            self.clients.write().await.remove_client(id);
            let id = id.to_string();
            self.commit_locked(&guard, |world| {
                world.apply_updates(vec![Update::new(UpdateKind::RemovePlayer { id })])
            })
            .await
        };
        self.reap(failed).await;
        result
    }

    /// Disconnect path for a specific connection. Does nothing if that
    /// connection was already deregistered.
    pub async fn disconnect_client(&self, client: &Arc<ConnectedClient>) {
        self.reap(vec![Arc::clone(client)]).await;
    }

    /// Disconnects clients whose writes failed. Removing one can make further
    /// writes fail, so this works through a list until nothing is left.
    async fn reap(&self, mut failed: Failed) {
        while let Some(client) = failed.pop() {
            let guard = self.commit.lock().await;
            if !self.clients.write().await.remove_if_same(&client) {
                continue;
            }
            let id = client.id.clone();
            let (result, more) = self
                .commit_locked(&guard, |world| {
                    world.apply_updates(vec![Update::new(UpdateKind::RemovePlayer { id })])
                })
                .await;
            if let Err(e) = result {
                warn!("Failed to remove player {}: {}", client.id, e);
            }
            failed.extend(more);
        }
    }

    /// Applies one update and broadcasts it.
    pub async fn apply_and_broadcast(&self, kind: UpdateKind) -> Result<()> {
        let (result, failed) = {
            let guard = self.commit.lock().await;
            self.commit_locked(&guard, |world| world.apply_updates(vec![Update::new(kind)]))
                .await
        };
        self.reap(failed).await;
        result
    }

    /// Sets a new destination, ignoring moves that point the same way as
    /// the current destination.
    pub async fn player_moved(&self, id: &str, destination: Vec2) -> Result<()> {
        let (result, failed) = {
            let guard = self.commit.lock().await;
            let id = id.to_string();
            self.commit_locked(&guard, |world| {
                if let Some(player) = world.get_player(&id) {
                    if player.points_same_way(destination) {
                        debug!("Ignoring move of {} to {}: same heading", id, destination);
                        return Ok(());
                    }
                }
                world.apply_updates(vec![Update::new(UpdateKind::PlayerDestination {
                    id,
                    destination,
                })])
            })
            .await
        };
        self.reap(failed).await;
        result
    }

    /// Translates a queued request from player `id` into a world mutation.
    pub async fn handle_request(&self, id: &str, request: Request) -> Result<()> {
        match request {
            Request::Move { destination } => self.player_moved(id, destination).await,
            Request::Connect { .. } => Err(SyncError::UnexpectedMessage(request.to_string())),
            other => match other.into_update(id) {
                Some(kind) => self.apply_and_broadcast(kind).await,
                None => Ok(()),
            },
        }
    }

    /// One simulation tick: drain every client's requests, step the world
    /// by `dt`, halt blocked movers, trim history and broadcast what changed.
    pub async fn tick(&self, dt: Duration) -> Result<()> {
        let mut clients = self.clients.read().await.clients();
        clients.sort_by(|a, b| a.id.cmp(&b.id));

        for client in clients {
            for request in client.drain_requests().await {
                debug!("Processing {} from {}", request, client.id);
                if let Err(e) = self.handle_request(&client.id, request).await {
                    warn!("Dropping request from {}: {}", client.id, e);
                }
            }
        }

        let history = self.config.history;
        let (result, failed) = {
            let guard = self.commit.lock().await;
            self.commit_locked(&guard, |world| {
                let stepped = world
                    .step(dt.as_secs_f64())
                    .and_then(|blocked| world.halt_players(&blocked));
                world.keep(history);
                stepped
            })
            .await
        };
        self.reap(failed).await;
        result
    }

    /// Runs `mutate` on the world, then broadcasts every processed event it
    /// produced, including those committed before a failure.
    ///
    /// Holding the guard is the caller's proof that the commit lock is taken.
    async fn commit_locked<F>(&self, _guard: &MutexGuard<'_, ()>, mutate: F) -> (Result<()>, Failed)
    where
        F: FnOnce(&mut World) -> Result<()>,
    {
        let (result, updates) = {
            let mut world = self.world.write().await;
            let result = mutate(&mut world);
            (result, world.drain_processed())
        };
        let failed = self.broadcast(updates).await;
        (result, failed)
    }

    /// Writes every update to every registered client, returning the clients
    /// whose writes failed. Each update is encoded once.
    async fn broadcast(&self, updates: Vec<Update>) -> Failed {
        if updates.is_empty() {
            return Vec::new();
        }

        let mut frames = Vec::with_capacity(updates.len());
        for update in updates {
            debug!("Broadcasting {}", update);
            match encode_frame(&Message::Update(update)) {
                Ok(frame) => frames.push(frame),
                Err(e) => error!("Failed to encode update: {}", e),
            }
        }

        let clients = self.clients.read().await;
        let mut failed = Vec::new();
        for client in clients.clients() {
            for frame in &frames {
                if let Err(e) = client.send_frame(frame).await {
                    warn!("Failed to send update to {}, disconnecting: {}", client.id, e);
                    failed.push(Arc::clone(&client));
                    break;
                }
            }
        }
        failed
    }

    /// Copy of a player as the server sees it.
    pub async fn player(&self, id: &str) -> Option<Player> {
        self.world.read().await.get_player(id)
    }

    /// Active players without history.
    pub async fn world_snapshot(&self) -> World {
        self.world.read().await.sync_snapshot()
    }

    pub async fn history_len(&self) -> usize {
        self.world.read().await.len()
    }

    pub async fn connected_ids(&self) -> Vec<String> {
        self.clients.read().await.ids()
    }

    pub async fn shutdown(&self) {
        let ids = self.connected_ids().await;
        info!("Disconnecting {} clients", ids.len());
        for id in ids {
            if let Err(e) = self.player_disconnected(&id).await {
                warn!("Failed to disconnect {}: {}", id, e);
            }
        }
    }
}

/// Picks a spawn point in the spawn box, nudged upwards while it overlaps an
/// active player.
fn spawn_position<R: Rng + ?Sized>(rng: &mut R, world: &World, range: f64) -> Vec2 {
    let mut position = if range > 0.0 {
        round_vec(random_vec(rng, -range, range), POSITION_PRECISION)
    } else {
        Vec2::ZERO
    };
    let nudge = Vec2::new(0.0, PLAYER_HALF_EXTENTS.y * 2.0 + 1.0);

    for _ in 0..MAX_SPAWN_ATTEMPTS {
        let hitbox = Rect::from_center(position, PLAYER_HALF_EXTENTS);
        if !world.players().any(|p| p.hitbox().intersects(&hitbox)) {
            break;
        }
        position = position + nudge;
    }
    position
}
