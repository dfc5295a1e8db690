//! Wire vocabulary exchanged between clients and the server.
//!
//! Clients send [`Request`]s. The server turns accepted requests into
//! [`Update`]s, applies them to its world and broadcasts every committed update
//! so each client can replay the same event stream.

use crate::error::SyncError;
use crate::geometry::Vec2;
use crate::world::World;
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One line of player chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeechMessage {
    pub text: String,
    pub timestamp: Timestamp,
}

/// The closed set of world mutations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UpdateKind {
    AddPlayer { id: String, position: Vec2 },
    RemovePlayer { id: String },
    PlayerDestination { id: String, destination: Vec2 },
    /// Produced by the integrator, never requested by a client.
    PlayerPosition { id: String, position: Vec2 },
    PlayerSpoke { id: String, text: String },
    /// Full snapshot, sent once right after the handshake.
    WorldState { world: World },
}

impl UpdateKind {
    /// The player this update is about, `None` for full syncs.
    pub fn player_id(&self) -> Option<&str> {
        match self {
            UpdateKind::AddPlayer { id, .. }
            | UpdateKind::RemovePlayer { id }
            | UpdateKind::PlayerDestination { id, .. }
            | UpdateKind::PlayerPosition { id, .. }
            | UpdateKind::PlayerSpoke { id, .. } => Some(id),
            UpdateKind::WorldState { .. } => None,
        }
    }
}

impl fmt::Display for UpdateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateKind::AddPlayer { id, position } => write!(f, "add {} at {}", id, position),
            UpdateKind::RemovePlayer { id } => write!(f, "remove {}", id),
            UpdateKind::PlayerDestination { id, destination } => {
                write!(f, "{} heading to {}", id, destination)
            }
            UpdateKind::PlayerPosition { id, position } => write!(f, "{} at {}", id, position),
            UpdateKind::PlayerSpoke { id, text } => write!(f, "{} says {:?}", id, text),
            UpdateKind::WorldState { world } => {
                write!(f, "world state with {} players", world.player_count())
            }
        }
    }
}

/// A world mutation plus the time it was committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub kind: UpdateKind,
    /// Milliseconds since the epoch, set once the update has been applied.
    pub processed: Option<Timestamp>,
}

impl Update {
    pub fn new(kind: UpdateKind) -> Self {
        Self {
            kind,
            processed: None,
        }
    }

    pub fn processed_at(kind: UpdateKind, processed: Timestamp) -> Self {
        Self {
            kind,
            processed: Some(processed),
        }
    }

    /// Processed time, with uncommitted updates sorting first.
    pub fn processed_or_zero(&self) -> Timestamp {
        self.processed.unwrap_or(0)
    }

    pub fn player_id(&self) -> Option<&str> {
        self.kind.player_id()
    }
}

impl From<UpdateKind> for Update {
    fn from(kind: UpdateKind) -> Self {
        Update::new(kind)
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.processed {
            Some(t) => write!(f, "{} @{}", self.kind, t),
            None => write!(f, "{} (pending)", self.kind),
        }
    }
}

/// Player intents sent by clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    Connect { id: String },
    Move { destination: Vec2 },
    Speak { text: String },
}

impl Request {
    /// Translates an intent of player `id` into the world update it asks for.
    /// `Connect` has no world-level counterpart.
    pub fn into_update(self, id: &str) -> Option<UpdateKind> {
        match self {
            Request::Connect { .. } => None,
            Request::Move { destination } => Some(UpdateKind::PlayerDestination {
                id: id.to_string(),
                destination,
            }),
            Request::Speak { text } => Some(UpdateKind::PlayerSpoke {
                id: id.to_string(),
                text,
            }),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Connect { id } => write!(f, "connect as {}", id),
            Request::Move { destination } => write!(f, "move to {}", destination),
            Request::Speak { text } => write!(f, "speak {:?}", text),
        }
    }
}

/// Envelope for everything that crosses the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    Request(Request),
    Update(Update),
    Error { message: String },
    /// Latency check, echoed back verbatim as `Pong`.
    Ping { sent: Timestamp },
    Pong { sent: Timestamp },
}

impl Message {
    pub fn error(err: &SyncError) -> Self {
        Message::Error {
            message: err.to_string(),
        }
    }
}

impl From<Request> for Message {
    fn from(request: Request) -> Self {
        Message::Request(request)
    }
}

impl From<Update> for Message {
    fn from(update: Update) -> Self {
        Message::Update(update)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Request(request) => write!(f, "request: {}", request),
            Message::Update(update) => write!(f, "update: {}", update),
            Message::Error { message } => write!(f, "error: {}", message),
            Message::Ping { sent } => write!(f, "ping {}", sent),
            Message::Pong { sent } => write!(f, "pong {}", sent),
        }
    }
}
