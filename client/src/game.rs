use crate::config::ClientConfig;
use crate::update_buffer::UpdateBuffer;
use log::{debug, warn};
use shared::{Player, Request, Result, SyncError, Update, UpdateKind, World};
use std::time::Duration;

/// The client's copy of the world plus everything needed to keep it close to
/// the server's while still reacting to local input immediately.
pub struct ClientGameState {
    player_id: String,
    world: World,
    buffer: UpdateBuffer,
    history: usize,
    latency: Duration,
    pub prediction_enabled: bool,
    pub reconciliation_enabled: bool,
}

impl ClientGameState {
    /// Builds the local world from the full sync the server sends after the
    /// handshake. Anything other than a world state here is fatal.
    pub fn from_sync(player_id: &str, update: Update, config: &ClientConfig) -> Result<Self> {
        if !matches!(update.kind, UpdateKind::WorldState { .. }) {
            return Err(SyncError::fatal(SyncError::UnexpectedMessage(format!(
                "expected world state, got {}",
                update
            ))));
        }

        let mut world = World::new();
        world.apply_updates(vec![update]).map_err(SyncError::fatal)?;
        world.drain_processed();

        if world.get_player(player_id).is_none() {
            warn!("Full sync does not contain own player {}", player_id);
        }

        Ok(Self {
            player_id: player_id.to_string(),
            world,
            buffer: UpdateBuffer::new(config.max_buffered_updates),
            history: config.history,
            latency: Duration::ZERO,
            prediction_enabled: config.prediction_enabled,
            reconciliation_enabled: config.reconciliation_enabled,
        })
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn local_player(&self) -> Option<Player> {
        self.world.get_player(&self.player_id)
    }

    pub fn buffered(&self) -> &UpdateBuffer {
        &self.buffer
    }

    /// Last measured round trip.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn set_latency(&mut self, round_trip: Duration) {
        self.latency = round_trip;
    }

    /// Applies a request locally before the server confirms it.
    ///
    /// Only moves are predicted, and only those the server would act on.
    /// Speech is shown once the server echoes it back, since appending it
    /// here too would leave the line in the history twice.
    pub fn predict(&mut self, request: &Request) {
        if !self.prediction_enabled {
            return;
        }
        let Request::Move { destination } = request else {
            return;
        };
        match self.local_player() {
            Some(player) if player.active && !player.points_same_way(*destination) => {}
            _ => {
                debug!("Not predicting {}", request);
                return;
            }
        }
        let kind = UpdateKind::PlayerDestination {
            id: self.player_id.clone(),
            destination: *destination,
        };
        if let Err(e) = self.world.apply_updates(vec![Update::new(kind)]) {
            debug!("Prediction of {} rejected: {}", request, e);
        }
    }

    pub fn step(&mut self, dt: Duration) -> Result<()> {
        // Blocked moves wait for the server to rule on them
        let result = self.world.step(dt.as_secs_f64()).map(|_| ());
        self.world.keep(self.history);
        self.absorb_processed();
        result
    }

    /// Moves locally processed updates into the reconciliation buffer.
    fn absorb_processed(&mut self) {
        let processed = self.world.drain_processed();
        if !self.reconciliation_enabled {
            return;
        }
        for update in processed {
            self.buffer.insert(update);
        }
    }

    /// Applies an update from the server.
    ///
    /// With reconciliation on, local updates processed after the server's
    /// update (shifted by half the round trip) are replayed on top of it, so
    /// local moves issued since then are not undone.
    pub fn apply_authoritative(&mut self, update: Update) -> Result<()> {
        self.absorb_processed();

        if matches!(update.kind, UpdateKind::WorldState { .. }) {
            self.buffer.clear();
            let result = self.world.apply_updates(vec![update]);
            self.world.drain_processed();
            return result;
        }

        if !self.reconciliation_enabled {
            let result = self.world.apply_updates(vec![update]);
            self.world.drain_processed();
            return result;
        }

        let origin = update.processed_or_zero() + (self.latency / 2).as_millis() as u64;
        self.buffer.retain_from(origin);

        let result = self.world.apply_updates(vec![update]);
        for buffered in self.buffer.oldest_first() {
            if let Err(e) = self.world.apply_updates(vec![buffered.clone()]) {
                debug!("Skipping buffered {}: {}", buffered, e);
            }
        }
        // Replays were already buffered once
        self.world.drain_processed();
        result
    }
}
