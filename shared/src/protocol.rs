//! Length-prefixed framing over any ordered byte stream.
//!
//! Every frame is a 2-byte big-endian length followed by that many bytes of
//! bincode-encoded [`Message`]. Reads and writes are bounded by a deadline.

use crate::error::{Result, SyncError};
use crate::messages::Message;
use bincode::{deserialize, serialize};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(3);

/// Type-erased write half, so TCP streams and in-memory pipes share one writer.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

pub fn encode(message: &Message) -> Result<Vec<u8>> {
    Ok(serialize(message)?)
}

pub fn decode(bytes: &[u8]) -> Result<Message> {
    Ok(deserialize(bytes)?)
}

/// Encodes `message` with its length prefix, ready to be written as-is.
pub fn encode_frame(message: &Message) -> Result<Vec<u8>> {
    let payload = encode(message)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(SyncError::MessageTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(payload.len() + 2);
    frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

pub struct MessageReader<R> {
    inner: R,
    timeout: Duration,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    pub fn new(inner: R, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// Reads exactly one frame and decodes it.
    pub async fn next(&mut self) -> Result<Message> {
        let mut header = [0u8; 2];
        self.fill(&mut header).await?;
        let len = u16::from_be_bytes(header) as usize;

        let mut payload = vec![0u8; len];
        self.fill(&mut payload).await?;
        decode(&payload)
    }

    async fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        match timeout(self.timeout, self.inner.read_exact(buf)).await {
            Err(_) => Err(SyncError::Timeout(self.timeout)),
            Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => Err(SyncError::ConnectionClosed),
            Ok(Err(e)) => Err(e.into()),
            Ok(Ok(_)) => Ok(()),
        }
    }
}

pub struct MessageWriter<W> {
    inner: W,
    timeout: Duration,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    pub fn new(inner: W, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let frame = encode_frame(message)?;
        self.send_frame(&frame).await
    }

    /// Writes a frame produced by [`encode_frame`]. Lets a broadcast encode once
    /// and write the same bytes to every connection.
    pub async fn send_frame(&mut self, frame: &[u8]) -> Result<()> {
        let write = async {
            self.inner.write_all(frame).await?;
            self.inner.flush().await
        };
        match timeout(self.timeout, write).await {
            Err(_) => Err(SyncError::Timeout(self.timeout)),
            Ok(result) => Ok(result?),
        }
    }
}
