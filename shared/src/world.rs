//! Authoritative world model shared by the server and client simulations.
//!
//! The world owns every player, a bounded chain of previous snapshots and a
//! queue of processed updates. All player mutations go through
//! [`World::apply_updates`] so that both sides of the connection derive the
//! same state from the same event stream.

use crate::error::{Result, SyncError};
use crate::geometry::{round_vec, within_range, Rect, Vec2};
use crate::messages::{SpeechMessage, Update, UpdateKind};
use crate::{
    get_timestamp, Timestamp, ARRIVAL_EPSILON, BASE_PLAYER_SPEED, MAX_SPEECH_LINES,
    PLAYER_HALF_EXTENTS, POSITION_PRECISION, PROCESSED_QUEUE_CAPACITY,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub position: Vec2,
    pub destination: Vec2,
    /// Units per second.
    pub speed: f64,
    /// Half extents of the bounding box.
    pub size: Vec2,
    /// Most recent lines first in, oldest evicted first.
    pub speech: VecDeque<SpeechMessage>,
    pub active: bool,
}

impl Player {
    pub fn new(id: &str, position: Vec2) -> Self {
        Self {
            id: id.to_string(),
            position,
            destination: position,
            speed: BASE_PLAYER_SPEED,
            size: PLAYER_HALF_EXTENTS,
            speech: VecDeque::with_capacity(MAX_SPEECH_LINES),
            active: true,
        }
    }

    pub fn hitbox(&self) -> Rect {
        Rect::from_center(self.position, self.size)
    }

    pub fn is_moving(&self) -> bool {
        !within_range(self.position, self.destination, ARRIVAL_EPSILON)
    }

    pub fn last_speech(&self) -> Option<&SpeechMessage> {
        self.speech.back()
    }

    /// True when `destination` points the same way as the current one, so a
    /// move there would change nothing worth broadcasting.
    pub fn points_same_way(&self, destination: Vec2) -> bool {
        self.destination.normalize() == destination.normalize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct World {
    players: BTreeMap<String, Player>,
    updated: Timestamp,
    #[serde(skip)]
    previous: Option<Box<World>>,
    #[serde(skip)]
    processed: VecDeque<Update>,
    #[serde(skip)]
    dropped: u64,
}

// Worlds compare by their entities only
impl PartialEq for World {
    fn eq(&self, other: &Self) -> bool {
        self.players == other.players
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self::at(get_timestamp())
    }

    /// Creates an empty world stamped with `updated`.
    pub fn at(updated: Timestamp) -> Self {
        Self {
            players: BTreeMap::new(),
            updated,
            previous: None,
            processed: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn updated(&self) -> Timestamp {
        self.updated
    }

    pub fn previous(&self) -> Option<&World> {
        self.previous.as_deref()
    }

    /// Returns a copy of the player, active or not.
    pub fn get_player(&self, id: &str) -> Option<Player> {
        self.players.get(id).cloned()
    }

    /// Active players in ascending id order.
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.active)
    }

    pub fn for_each<F: FnMut(&Player)>(&self, f: F) {
        self.players().for_each(f);
    }

    /// Number of active players.
    pub fn player_count(&self) -> usize {
        self.players().count()
    }

    /// Copy of this generation's active players without history or pending
    /// events, suitable for a full sync.
    pub fn sync_snapshot(&self) -> World {
        World {
            players: self
                .players
                .iter()
                .filter(|(_, p)| p.active)
                .map(|(id, p)| (id.clone(), p.clone()))
                .collect(),
            updated: self.updated,
            previous: None,
            processed: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn apply_updates<I>(&mut self, updates: I) -> Result<()>
    where
        I: IntoIterator<Item = Update>,
    {
        self.apply_updates_at(updates, get_timestamp())
    }

    /// Applies updates in order, stamping each with `now`. Stops at the first
    /// failure; updates before it stay applied.
    pub fn apply_updates_at<I>(&mut self, updates: I, now: Timestamp) -> Result<()>
    where
        I: IntoIterator<Item = Update>,
    {
        for update in updates {
            self.apply(update.kind, now)?;
        }
        Ok(())
    }

    fn apply(&mut self, kind: UpdateKind, now: Timestamp) -> Result<()> {
        let kind = match kind {
            // Observers must learn where a reactivated player really is
            UpdateKind::AddPlayer { id, position } => {
                let position = self.add_player(&id, position)?;
                UpdateKind::AddPlayer { id, position }
            }
            other => other,
        };
        match &kind {
            UpdateKind::AddPlayer { .. } => {}
            UpdateKind::RemovePlayer { id } => self.active_player_mut(id)?.active = false,
            UpdateKind::PlayerDestination { id, destination } => {
                self.active_player_mut(id)?.destination = *destination
            }
            UpdateKind::PlayerPosition { id, position } => {
                self.active_player_mut(id)?.position = *position
            }
            UpdateKind::PlayerSpoke { id, text } => {
                let player = self.active_player_mut(id)?;
                if player.speech.len() >= MAX_SPEECH_LINES {
                    player.speech.pop_front();
                }
                player.speech.push_back(SpeechMessage {
                    text: text.clone(),
                    timestamp: now,
                });
            }
            UpdateKind::WorldState { world } => self.set_world_state(world),
        }
        debug!("applied {}", kind);
        self.push_processed(Update::processed_at(kind, now));
        Ok(())
    }

    /// Returns where the player ended up, which for a reactivation is its
    /// last known position rather than `position`.
    fn add_player(&mut self, id: &str, position: Vec2) -> Result<Vec2> {
        match self.players.get_mut(id) {
            Some(player) if player.active => Err(SyncError::PlayerAlreadyActive(id.to_string())),
            Some(player) => {
                // Back where it left, standing still
                player.active = true;
                player.destination = player.position;
                Ok(player.position)
            }
            None => {
                self.players
                    .insert(id.to_string(), Player::new(id, position));
                Ok(position)
            }
        }
    }

    fn active_player_mut(&mut self, id: &str) -> Result<&mut Player> {
        match self.players.get_mut(id) {
            Some(player) if player.active => Ok(player),
            Some(_) => Err(SyncError::PlayerInactive(id.to_string())),
            None => Err(SyncError::PlayerNotFound(id.to_string())),
        }
    }

    fn set_world_state(&mut self, world: &World) {
        self.players = world.players.clone();
        self.updated = world.updated;
        self.previous = None;
    }

    fn push_processed(&mut self, update: Update) {
        if self.processed.len() >= PROCESSED_QUEUE_CAPACITY {
            self.processed.pop_front();
            self.dropped += 1;
            warn!(
                "processed queue full, dropped oldest update ({} dropped so far)",
                self.dropped
            );
        }
        self.processed.push_back(update);
    }

    /// Takes every processed update in commit order.
    pub fn drain_processed(&mut self) -> Vec<Update> {
        self.processed.drain(..).collect()
    }

    pub fn pending_processed(&self) -> usize {
        self.processed.len()
    }

    /// Number of processed updates discarded because nobody drained them.
    pub fn dropped_updates(&self) -> u64 {
        self.dropped
    }

    pub fn step(&mut self, dt: f64) -> Result<Vec<String>> {
        self.step_at(dt, get_timestamp())
    }

    /// Advances every moving player by `dt` seconds.
    ///
    /// The current generation is pushed onto the snapshot chain first. Players
    /// are visited in id order. A player whose next box would overlap another
    /// active player stays put for this tick; the ids of those players are
    /// returned so an authority can settle them with [`World::halt_players`].
    pub fn step_at(&mut self, dt: f64, now: Timestamp) -> Result<Vec<String>> {
        let snapshot = World {
            players: self.players.clone(),
            updated: self.updated,
            previous: self.previous.take(),
            processed: VecDeque::new(),
            dropped: 0,
        };
        self.previous = Some(Box::new(snapshot));
        self.updated = now;

        let mut blocked_ids = Vec::new();
        if dt <= 0.0 {
            return Ok(blocked_ids);
        }

        let ids: Vec<String> = self.players.keys().cloned().collect();
        for id in ids {
            let candidate = match self.players.get(&id) {
                Some(player) if player.active && player.is_moving() => next_position(player, dt),
                _ => continue,
            };
            let Some((candidate, size)) = candidate else {
                continue;
            };

            let hitbox = Rect::from_center(candidate, size);
            let blocked = self
                .players
                .values()
                .any(|other| other.active && other.id != id && other.hitbox().intersects(&hitbox));
            if blocked {
                debug!("{} blocked at {}", id, candidate);
                blocked_ids.push(id);
                continue;
            }

            self.apply(
                UpdateKind::PlayerPosition {
                    id,
                    position: candidate,
                },
                now,
            )?;
        }
        Ok(blocked_ids)
    }

    /// Ends the current move of each listed player where it stands. The stops
    /// are processed as `PlayerDestination` updates so that every replica
    /// settles on the same resting point.
    pub fn halt_players(&mut self, ids: &[String]) -> Result<()> {
        let stops: Vec<Update> = ids
            .iter()
            .filter_map(|id| self.players.get(id))
            .map(|player| {
                Update::new(UpdateKind::PlayerDestination {
                    id: player.id.clone(),
                    destination: player.position,
                })
            })
            .collect();
        self.apply_updates(stops)
    }

    /// The most recent generation updated strictly before `t`, or the oldest
    /// one available.
    pub fn before(&self, t: Timestamp) -> &World {
        let mut current = self;
        loop {
            if current.updated < t {
                return current;
            }
            match current.previous.as_deref() {
                Some(prev) => current = prev,
                None => return current,
            }
        }
    }

    /// Retains at most `n` generations, this one included. `keep(0)` is a no-op.
    pub fn keep(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let mut cursor = &mut self.previous;
        for _ in 1..n {
            match cursor {
                Some(world) => cursor = &mut world.previous,
                None => return,
            }
        }
        *cursor = None;
    }

    /// Length of the snapshot chain, this generation included.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        let mut len = 1;
        let mut current = self.previous.as_deref();
        while let Some(world) = current {
            len += 1;
            current = world.previous.as_deref();
        }
        len
    }
}

fn next_position(player: &Player, dt: f64) -> Option<(Vec2, Vec2)> {
    let step = player.speed * dt;
    if step <= 0.0 {
        return None;
    }
    let remaining = player.destination - player.position;
    let candidate = if remaining.magnitude() <= step {
        player.destination
    } else {
        round_vec(
            player.position + remaining.normalize().scale(step),
            POSITION_PRECISION,
        )
    };
    // Rounding can leave a player within arrival range but short of the
    // destination, where it would stop for good.
    let candidate = if within_range(candidate, player.destination, ARRIVAL_EPSILON) {
        player.destination
    } else {
        candidate
    };
    if candidate == player.position {
        return None;
    }
    Some((candidate, player.size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn add(id: &str, x: f64, y: f64) -> Update {
        Update::new(UpdateKind::AddPlayer {
            id: id.to_string(),
            position: Vec2::new(x, y),
        })
    }

    fn dest(id: &str, x: f64, y: f64) -> Update {
        Update::new(UpdateKind::PlayerDestination {
            id: id.to_string(),
            destination: Vec2::new(x, y),
        })
    }

    fn remove(id: &str) -> Update {
        Update::new(UpdateKind::RemovePlayer { id: id.to_string() })
    }

    #[test]
    fn test_add_player_defaults() {
        let mut world = World::at(0);
        world.apply_updates_at(vec![add("a", 1.0, 2.0)], 10).unwrap();

        let player = world.get_player("a").unwrap();
        assert_eq!(player.position, Vec2::new(1.0, 2.0));
        assert_eq!(player.destination, Vec2::new(1.0, 2.0));
        assert_eq!(player.speed, BASE_PLAYER_SPEED);
        assert_eq!(player.size, PLAYER_HALF_EXTENTS);
        assert!(player.speech.is_empty());
        assert!(player.active);
    }

    #[test]
    fn test_add_active_player_fails() {
        let mut world = World::at(0);
        world.apply_updates_at(vec![add("a", 0.0, 0.0)], 1).unwrap();
        let err = world.apply_updates_at(vec![add("a", 5.0, 5.0)], 2).unwrap_err();
        assert!(matches!(err, SyncError::PlayerAlreadyActive(id) if id == "a"));
    }

    #[test]
    fn test_reactivation_keeps_position() {
        let mut world = World::at(0);
        world
            .apply_updates_at(vec![add("a", 3.0, 4.0), remove("a")], 1)
            .unwrap();
        assert!(!world.get_player("a").unwrap().active);

        world.drain_processed();

        world.apply_updates_at(vec![add("a", 9.0, 9.0)], 2).unwrap();
        let player = world.get_player("a").unwrap();
        assert!(player.active);
        assert_eq!(player.position, Vec2::new(3.0, 4.0));
        assert!(!player.is_moving());

        // Observers are told where the player actually is
        let processed = world.drain_processed();
        assert_eq!(processed.len(), 1);
        assert!(matches!(
            &processed[0].kind,
            UpdateKind::AddPlayer { id, position } if id == "a" && *position == Vec2::new(3.0, 4.0)
        ));
    }

    #[test]
    fn test_reactivation_stops_pending_move() {
        let mut world = World::at(0);
        world
            .apply_updates_at(vec![add("a", 0.0, 0.0), dest("a", 10.0, 0.0)], 0)
            .unwrap();
        world.step_at(0.5, 1).unwrap();
        world.apply_updates_at(vec![remove("a"), add("a", 0.0, 0.0)], 2).unwrap();

        world.step_at(0.5, 3).unwrap();
        let player = world.get_player("a").unwrap();
        assert_eq!(player.position, Vec2::new(1.0, 0.0));
        assert_eq!(player.destination, player.position);
    }

    #[test]
    fn test_points_same_way() {
        let mut player = Player::new("a", Vec2::ZERO);
        player.destination = Vec2::new(10.0, 0.0);

        assert!(player.points_same_way(Vec2::new(3.0, 0.0)));
        assert!(!player.points_same_way(Vec2::new(-3.0, 0.0)));
        assert!(!player.points_same_way(Vec2::new(10.0, 1.0)));
    }

    #[test]
    fn test_inactive_player_rejects_mutations() {
        let mut world = World::at(0);
        world
            .apply_updates_at(vec![add("a", 0.0, 0.0), remove("a")], 1)
            .unwrap();

        assert!(matches!(
            world.apply_updates_at(vec![dest("a", 1.0, 1.0)], 2),
            Err(SyncError::PlayerInactive(_))
        ));
        assert!(matches!(
            world.apply_updates_at(vec![remove("a")], 2),
            Err(SyncError::PlayerInactive(_))
        ));
        assert!(matches!(
            world.apply_updates_at(vec![dest("ghost", 1.0, 1.0)], 2),
            Err(SyncError::PlayerNotFound(_))
        ));
    }

    #[test]
    fn test_first_error_aborts_but_keeps_earlier_updates() {
        let mut world = World::at(0);
        let result = world.apply_updates_at(
            vec![add("a", 0.0, 0.0), dest("ghost", 1.0, 1.0), add("b", 5.0, 5.0)],
            1,
        );
        assert!(result.is_err());
        assert!(world.get_player("a").is_some());
        assert!(world.get_player("b").is_none());
        assert_eq!(world.drain_processed().len(), 1);
    }

    #[test]
    fn test_processed_updates_are_stamped_in_order() {
        let mut world = World::at(0);
        world
            .apply_updates_at(vec![add("a", 0.0, 0.0), dest("a", 4.0, 0.0)], 77)
            .unwrap();

        let processed = world.drain_processed();
        assert_eq!(processed.len(), 2);
        assert!(processed.iter().all(|u| u.processed == Some(77)));
        assert!(matches!(processed[0].kind, UpdateKind::AddPlayer { .. }));
        assert!(matches!(processed[1].kind, UpdateKind::PlayerDestination { .. }));
        assert_eq!(world.pending_processed(), 0);
    }

    #[test]
    fn test_processed_queue_drops_oldest_when_full() {
        let mut world = World::at(0);
        world.apply_updates_at(vec![add("a", 0.0, 0.0)], 0).unwrap();
        let moves = (0..PROCESSED_QUEUE_CAPACITY).map(|i| dest("a", i as f64, 0.0));
        world.apply_updates_at(moves, 1).unwrap();

        assert_eq!(world.dropped_updates(), 1);
        let processed = world.drain_processed();
        assert_eq!(processed.len(), PROCESSED_QUEUE_CAPACITY);
        assert!(matches!(processed[0].kind, UpdateKind::PlayerDestination { .. }));
    }

    #[test]
    fn test_speech_is_bounded() {
        let mut world = World::at(0);
        world.apply_updates_at(vec![add("a", 0.0, 0.0)], 0).unwrap();
        for i in 0..8 {
            let spoke = Update::new(UpdateKind::PlayerSpoke {
                id: "a".to_string(),
                text: format!("line {}", i),
            });
            world.apply_updates_at(vec![spoke], i).unwrap();
        }

        let speech: Vec<String> = world
            .get_player("a")
            .unwrap()
            .speech
            .iter()
            .map(|s| s.text.clone())
            .collect();
        assert_eq!(speech, vec!["line 3", "line 4", "line 5", "line 6", "line 7"]);
        assert_eq!(world.get_player("a").unwrap().last_speech().unwrap().timestamp, 7);
    }

    #[test]
    fn test_for_each_skips_inactive() {
        let mut world = World::at(0);
        world
            .apply_updates_at(vec![add("a", 0.0, 0.0), add("b", 5.0, 0.0), remove("a")], 0)
            .unwrap();

        let mut seen = Vec::new();
        world.for_each(|p| seen.push(p.id.clone()));
        assert_eq!(seen, vec!["b"]);
        assert_eq!(world.player_count(), 1);
        assert!(world.get_player("a").is_some());
    }

    #[test]
    fn test_step_moves_towards_destination() {
        let mut world = World::at(0);
        world
            .apply_updates_at(vec![add("a", 0.0, 0.0), dest("a", 10.0, 0.0)], 0)
            .unwrap();
        world.drain_processed();

        world.step_at(0.1, 100).unwrap();
        let player = world.get_player("a").unwrap();
        assert_approx_eq!(player.position.x, 0.2, 1e-9);
        assert_eq!(player.position.y, 0.0);
        assert_eq!(world.updated(), 100);

        let processed = world.drain_processed();
        assert_eq!(processed.len(), 1);
        assert!(matches!(
            &processed[0].kind,
            UpdateKind::PlayerPosition { id, .. } if id == "a"
        ));
    }

    #[test]
    fn test_step_rounds_positions() {
        let mut world = World::at(0);
        world
            .apply_updates_at(vec![add("a", 0.0, 0.0), dest("a", 10.0, 10.0)], 0)
            .unwrap();
        world.step_at(0.1, 1).unwrap();
        // 0.2 / sqrt(2) = 0.14142...
        let player = world.get_player("a").unwrap();
        assert_eq!(player.position, Vec2::new(0.14, 0.14));
    }

    #[test]
    fn test_step_snaps_to_destination() {
        let mut world = World::at(0);
        world
            .apply_updates_at(vec![add("a", 0.0, 0.0), dest("a", 0.15, 0.0)], 0)
            .unwrap();
        world.step_at(0.1, 1).unwrap();
        assert_eq!(world.get_player("a").unwrap().position, Vec2::new(0.15, 0.0));

        world.drain_processed();
        world.step_at(0.1, 2).unwrap();
        assert_eq!(world.get_player("a").unwrap().position, Vec2::new(0.15, 0.0));
        assert!(world.drain_processed().is_empty());
    }

    #[test]
    fn test_step_snaps_when_rounding_lands_close() {
        let mut world = World::at(0);
        world
            .apply_updates_at(vec![add("a", 0.0, 0.0), dest("a", 0.205, 0.0)], 0)
            .unwrap();
        world.step_at(0.1, 1).unwrap();
        let player = world.get_player("a").unwrap();
        assert_eq!(player.position, Vec2::new(0.205, 0.0));
        assert!(!player.is_moving());
    }

    #[test]
    fn test_step_blocks_overlapping_move() {
        let mut world = World::at(0);
        world
            .apply_updates_at(
                vec![add("a", 0.0, 0.0), add("b", 1.1, 0.0), dest("a", 5.0, 0.0)],
                0,
            )
            .unwrap();
        world.drain_processed();

        // 0.0 -> 0.2 would overlap b's box starting at 0.6
        let blocked = world.step_at(0.1, 1).unwrap();
        assert_eq!(blocked, vec!["a"]);
        let player = world.get_player("a").unwrap();
        assert_eq!(player.position, Vec2::ZERO);
        assert_eq!(player.destination, Vec2::new(5.0, 0.0));
        assert!(world.drain_processed().is_empty());
    }

    #[test]
    fn test_halt_players_stops_in_place() {
        let mut world = World::at(0);
        world
            .apply_updates_at(
                vec![add("a", 0.0, 0.0), add("b", 1.1, 0.0), dest("a", 5.0, 0.0)],
                0,
            )
            .unwrap();
        world.drain_processed();

        let blocked = world.step_at(0.1, 1).unwrap();
        world.halt_players(&blocked).unwrap();
        let player = world.get_player("a").unwrap();
        assert_eq!(player.destination, Vec2::ZERO);
        assert!(!player.is_moving());

        // The stop is processed like any other destination change
        let processed = world.drain_processed();
        assert_eq!(processed.len(), 1);
        assert!(matches!(
            &processed[0].kind,
            UpdateKind::PlayerDestination { id, destination } if id == "a" && *destination == Vec2::ZERO
        ));

        assert!(world.step_at(0.1, 2).unwrap().is_empty());
        assert!(world.drain_processed().is_empty());
    }

    #[test]
    fn test_replica_follows_authority_stop() {
        // Same world stepped with different tick lengths on both ends
        let mut authority = World::at(0);
        authority
            .apply_updates_at(
                vec![add("a", 0.0, 0.0), add("b", 3.0, 0.0), dest("a", 5.0, 0.0)],
                0,
            )
            .unwrap();
        let mut replica = authority.clone();
        authority.drain_processed();

        let mut stops = Vec::new();
        for t in 1..=20 {
            let blocked = authority.step_at(0.15, t).unwrap();
            authority.halt_players(&blocked).unwrap();
            stops.extend(
                authority
                    .drain_processed()
                    .into_iter()
                    .filter(|u| matches!(u.kind, UpdateKind::PlayerDestination { .. })),
            );
        }
        for t in 1..=4 {
            replica.step_at(0.5, t).unwrap();
        }

        // 0.3 unit steps stop at 1.8, 1 unit steps wait at 2.0
        let settled = authority.get_player("a").unwrap();
        assert_eq!(settled.position, Vec2::new(1.8, 0.0));
        assert!(!settled.is_moving());
        assert_eq!(stops.len(), 1);
        assert_eq!(replica.get_player("a").unwrap().position, Vec2::new(2.0, 0.0));

        replica.apply_updates_at(stops, 5).unwrap();
        for t in 6..=20 {
            replica.step_at(0.1, t).unwrap();
        }
        let followed = replica.get_player("a").unwrap();
        assert_eq!(followed.position, settled.position);
        assert!(!followed.is_moving());
    }

    #[test]
    fn test_step_ignores_inactive_obstacles() {
        let mut world = World::at(0);
        world
            .apply_updates_at(
                vec![
                    add("a", 0.0, 0.0),
                    add("b", 1.1, 0.0),
                    remove("b"),
                    dest("a", 5.0, 0.0),
                ],
                0,
            )
            .unwrap();
        world.step_at(0.1, 1).unwrap();
        assert_approx_eq!(world.get_player("a").unwrap().position.x, 0.2, 1e-9);
    }

    #[test]
    fn test_step_pushes_snapshots() {
        let mut world = World::at(0);
        world.apply_updates_at(vec![add("a", 0.0, 0.0)], 0).unwrap();
        world.step_at(0.1, 100).unwrap();
        world.step_at(0.1, 200).unwrap();

        assert_eq!(world.len(), 3);
        let prev = world.previous().unwrap();
        assert_eq!(prev.updated(), 100);
        assert_eq!(prev.previous().unwrap().updated(), 0);
        assert_eq!(prev.pending_processed(), 0);
    }

    #[test]
    fn test_before() {
        let mut world = World::at(0);
        world.step_at(0.1, 100).unwrap();
        world.step_at(0.1, 200).unwrap();

        assert_eq!(world.before(250).updated(), 200);
        assert_eq!(world.before(200).updated(), 100);
        assert_eq!(world.before(150).updated(), 100);
        assert_eq!(world.before(50).updated(), 0);
        // Nothing precedes t = 0, fall back to the oldest generation
        assert_eq!(world.before(0).updated(), 0);
    }

    #[test]
    fn test_keep() {
        let mut world = World::at(0);
        for t in 1..=5 {
            world.step_at(0.1, t * 100).unwrap();
        }
        assert_eq!(world.len(), 6);

        world.keep(0);
        assert_eq!(world.len(), 6);
        world.keep(10);
        assert_eq!(world.len(), 6);
        world.keep(3);
        assert_eq!(world.len(), 3);
        assert_eq!(world.before(0).updated(), 300);
        world.keep(1);
        assert_eq!(world.len(), 1);
        assert!(world.previous().is_none());
    }

    #[test]
    fn test_world_state_replaces_players() {
        let mut source = World::at(5);
        source
            .apply_updates_at(vec![add("a", 1.0, 1.0), add("b", 4.0, 4.0), remove("b")], 0)
            .unwrap();

        let mut target = World::at(0);
        target.apply_updates_at(vec![add("z", 0.0, 0.0)], 0).unwrap();
        target.step_at(0.1, 10).unwrap();

        let sync = Update::new(UpdateKind::WorldState {
            world: source.sync_snapshot(),
        });
        target.apply_updates_at(vec![sync], 20).unwrap();

        assert!(target.get_player("z").is_none());
        assert!(target.get_player("b").is_none());
        assert_eq!(target.get_player("a").unwrap().position, Vec2::new(1.0, 1.0));
        assert_eq!(target.len(), 1);
        assert_eq!(target.updated(), 5);
    }

    #[test]
    fn test_serialization_skips_history() {
        let mut world = World::at(0);
        world.apply_updates_at(vec![add("a", 1.0, 2.0)], 0).unwrap();
        world.step_at(0.1, 5).unwrap();

        let bytes = bincode::serialize(&world).unwrap();
        let decoded: World = bincode::deserialize(&bytes).unwrap();
        assert_eq!(decoded, world);
        assert_eq!(decoded.updated(), 5);
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded.pending_processed(), 0);
    }
}
