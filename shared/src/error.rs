//! Error taxonomy shared by the server and client crates.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    // Entity-state violations raised by the world dispatcher
    #[error("player {0} requested but not found")]
    PlayerNotFound(String),

    #[error("player {0} requested but inactive")]
    PlayerInactive(String),

    #[error("player {0} already active")]
    PlayerAlreadyActive(String),

    // Connection registry
    #[error("player {0} already connected")]
    AlreadyConnected(String),

    #[error("server full ({0} clients)")]
    ServerFull(usize),

    // Protocol violations
    #[error("expected first message to be a connect request, got {0}")]
    UnexpectedHandshake(String),

    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("player id must not be empty")]
    EmptyPlayerId,

    #[error("server returned an error: {0}")]
    Rejected(String),

    // Transport
    #[error("message size too large: {0}")]
    MessageTooLarge(usize),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] bincode::Error),

    #[error("fatal: {0}")]
    Fatal(Box<SyncError>),
}

impl SyncError {
    /// Wraps an error so that whoever receives it terminates instead of
    /// logging and carrying on.
    pub fn fatal(err: SyncError) -> Self {
        match err {
            SyncError::Fatal(_) => err,
            other => SyncError::Fatal(Box::new(other)),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Fatal(_))
    }
}
