//! # Shared world model
//!
//! Everything both ends of the connection must agree on: the world
//! simulation, the update/request vocabulary, the wire framing and the
//! geometry helpers the integrator relies on.
//!
//! ## Determinism contract
//!
//! Server and clients step the same [`World`] with the same constants.
//! Positions are rounded to [`POSITION_PRECISION`] decimal places after every
//! step and players are visited in ascending id order, so two processes fed
//! the same updates produce the same positions.

pub mod direction;
pub mod error;
pub mod geometry;
pub mod messages;
pub mod protocol;
pub mod world;

pub use direction::Direction;
pub use error::{Result, SyncError};
pub use geometry::{Rect, Vec2};
pub use messages::{Message, Request, SpeechMessage, Update, UpdateKind};
pub use world::{Player, World};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
pub type Timestamp = u64;

/// Units per second.
pub const BASE_PLAYER_SPEED: f64 = 2.0;
pub const PLAYER_HALF_EXTENTS: Vec2 = Vec2::new(0.5, 0.5);
pub const MAX_SPEECH_LINES: usize = 5;
/// Decimal places kept after each integration step.
pub const POSITION_PRECISION: i32 = 2;
/// A player closer than this to its destination is not moved.
pub const ARRIVAL_EPSILON: f64 = 0.01;
pub const PROCESSED_QUEUE_CAPACITY: usize = 1024;

pub const DEFAULT_TICK_RATE: u32 = 10;
pub const DEFAULT_HISTORY: usize = 3;
pub const DEFAULT_REQUESTS_PER_TICK: usize = 60;

// Get current timestamp in milliseconds
pub fn get_timestamp() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as Timestamp
}
