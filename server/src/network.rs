//! Server network layer handling TCP connections and tick coordination

use crate::client_manager::ConnectedClient;
use crate::config::ServerConfig;
use crate::update_manager::UpdateManager;
use log::{debug, error, info, warn};
use shared::protocol::{MessageReader, MessageWriter};
use shared::{Message, Request, Result, SyncError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{interval, Instant, MissedTickBehavior};

/// Accepts connections and drives the simulation tick
pub struct Server {
    listener: TcpListener,
    manager: Arc<UpdateManager>,
    config: ServerConfig,
}

impl Server {
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.address).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server {
            listener,
            manager: Arc::new(UpdateManager::new(config.clone())),
            config,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn manager(&self) -> Arc<UpdateManager> {
        Arc::clone(&self.manager)
    }

    /// Main server loop: accepts clients and ticks the world.
    ///
    /// Tick failures are logged and forwarded on `errors`; the loop keeps
    /// going until the task is dropped.
    pub async fn run(self, errors: mpsc::UnboundedSender<SyncError>) -> Result<()> {
        let tick_duration = self.config.tick_duration();
        let max_step = self.config.max_step();
        let mut tick_interval = interval(tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Skip the first tick since it fires immediately
        tick_interval.tick().await;
        let mut last_tick = Instant::now();

        info!(
            "Server started successfully ({} Hz, {} requests per tick)",
            self.config.tick_rate, self.config.requests_per_tick
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let manager = Arc::clone(&self.manager);
                            let config = self.config.clone();
                            tokio::spawn(async move {
                                handle_stream(stream, peer, manager, config).await;
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                        }
                    }
                },

                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let mut dt = now.duration_since(last_tick);
                    last_tick = now;

                    // Cap delta time so a stalled tick does not teleport players
                    if dt > max_step {
                        warn!(
                            "Large delta time detected ({:.3}s), capping to {:.3}s",
                            dt.as_secs_f64(),
                            max_step.as_secs_f64()
                        );
                        dt = max_step;
                    }

                    if let Err(e) = self.manager.tick(dt).await {
                        error!("Tick failed: {}", e);
                        if errors.send(e).is_err() {
                            debug!("Error channel closed");
                        }
                    }
                },
            }
        }
    }
}

async fn handle_stream(
    stream: TcpStream,
    peer: SocketAddr,
    manager: Arc<UpdateManager>,
    config: ServerConfig,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY for {}: {}", peer, e);
    }
    let (read_half, write_half) = stream.into_split();
    serve_connection(read_half, write_half, peer.to_string(), manager, config.io_timeout).await;
}

/// Runs one connection from handshake to disconnect.
///
/// The first message must be a connect request carrying a non-empty id.
/// Rejections are reported to the peer as an `Error` message before the
/// connection is closed.
pub async fn serve_connection<R, W>(
    reader: R,
    mut writer: W,
    peer: String,
    manager: Arc<UpdateManager>,
    io_timeout: Duration,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let mut reader = MessageReader::new(reader, io_timeout);

    let id = match read_handshake(&mut reader).await {
        Ok(id) => id,
        Err(e) => {
            warn!("Handshake with {} failed: {}", peer, e);
            let mut rejection = MessageWriter::new(&mut writer, io_timeout);
            if let Err(e) = rejection.send(&Message::error(&e)).await {
                debug!("Could not report handshake failure to {}: {}", peer, e);
            }
            return;
        }
    };

    let client = Arc::new(ConnectedClient::new(
        &id,
        &peer,
        Box::new(writer),
        io_timeout,
        manager.config().requests_per_tick,
    ));

    if let Err(e) = manager.player_connected(Arc::clone(&client)).await {
        warn!("Rejected {} from {}: {}", id, peer, e);
        if let Err(e) = client.send(&Message::error(&e)).await {
            debug!("Could not report rejection to {}: {}", peer, e);
        }
        return;
    }

    receive_loop(&mut reader, &client).await;
    manager.disconnect_client(&client).await;
}

async fn read_handshake<R: AsyncRead + Unpin>(reader: &mut MessageReader<R>) -> Result<String> {
    match reader.next().await? {
        Message::Request(Request::Connect { id }) if id.is_empty() => Err(SyncError::EmptyPlayerId),
        Message::Request(Request::Connect { id }) => Ok(id),
        other => Err(SyncError::UnexpectedHandshake(other.to_string())),
    }
}

/// Reads until the connection fails. Requests go to the client's queue,
/// pings are answered directly.
async fn receive_loop<R: AsyncRead + Unpin>(
    reader: &mut MessageReader<R>,
    client: &Arc<ConnectedClient>,
) {
    loop {
        let message = match reader.next().await {
            Ok(message) => message,
            Err(e) => {
                info!("Connection to {} ended: {}", client.id, e);
                return;
            }
        };

        match message {
            Message::Request(request) => {
                debug!("Received {} from {}", request, client.id);
                if let Err(e) = client.queue_request(request).await {
                    warn!("Failed to queue request from {}: {}", client.id, e);
                    return;
                }
            }
            Message::Ping { sent } => {
                if let Err(e) = client.send(&Message::Pong { sent }).await {
                    warn!("Failed to answer ping from {}: {}", client.id, e);
                    return;
                }
            }
            other => warn!("Ignoring unexpected message from {}: {}", client.id, other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{UpdateKind, Vec2};
    use tokio::io::{duplex, split, DuplexStream, ReadHalf, WriteHalf};

    type ClientEnd = (
        MessageReader<ReadHalf<DuplexStream>>,
        MessageWriter<WriteHalf<DuplexStream>>,
    );

    fn spawn_connection(manager: &Arc<UpdateManager>) -> ClientEnd {
        let (client_io, server_io) = duplex(64 * 1024);
        let (server_read, server_write) = split(server_io);
        let manager = Arc::clone(manager);
        tokio::spawn(async move {
            serve_connection(
                server_read,
                server_write,
                "pipe".to_string(),
                manager,
                Duration::from_secs(2),
            )
            .await;
        });

        let (client_read, client_write) = split(client_io);
        (
            MessageReader::new(client_read, Duration::from_secs(2)),
            MessageWriter::new(client_write, Duration::from_secs(2)),
        )
    }

    fn manager() -> Arc<UpdateManager> {
        Arc::new(UpdateManager::new(ServerConfig {
            spawn_range: 0.0,
            ..Default::default()
        }))
    }

    fn connect(id: &str) -> Message {
        Message::Request(Request::Connect { id: id.to_string() })
    }

    #[tokio::test]
    async fn test_handshake_registers_player() {
        let manager = manager();
        let (mut rx, mut tx) = spawn_connection(&manager);
        tx.send(&connect("a")).await.unwrap();

        match rx.next().await.unwrap() {
            Message::Update(update) => {
                assert!(matches!(update.kind, UpdateKind::WorldState { .. }))
            }
            other => panic!("expected world state, got {}", other),
        }
        assert_eq!(manager.connected_ids().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_first_message_must_be_connect() {
        let manager = manager();
        let (mut rx, mut tx) = spawn_connection(&manager);
        tx.send(&Message::Request(Request::Speak {
            text: "hi".to_string(),
        }))
        .await
        .unwrap();

        assert!(matches!(rx.next().await.unwrap(), Message::Error { .. }));
        assert!(matches!(rx.next().await, Err(SyncError::ConnectionClosed)));
        assert!(manager.connected_ids().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_id_is_rejected() {
        let manager = manager();
        let (mut rx, mut tx) = spawn_connection(&manager);
        tx.send(&connect("")).await.unwrap();

        match rx.next().await.unwrap() {
            Message::Error { message } => assert!(message.contains("empty")),
            other => panic!("expected error, got {}", other),
        }
    }

    #[tokio::test]
    async fn test_duplicate_id_gets_error() {
        let manager = manager();
        let (mut first_rx, mut first_tx) = spawn_connection(&manager);
        first_tx.send(&connect("a")).await.unwrap();
        first_rx.next().await.unwrap();

        let (mut rx, mut tx) = spawn_connection(&manager);
        tx.send(&connect("a")).await.unwrap();
        match rx.next().await.unwrap() {
            Message::Error { message } => assert!(message.contains("already connected")),
            other => panic!("expected error, got {}", other),
        }
        assert_eq!(manager.connected_ids().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_ping_is_answered() {
        let manager = manager();
        let (mut rx, mut tx) = spawn_connection(&manager);
        tx.send(&connect("a")).await.unwrap();
        rx.next().await.unwrap();

        tx.send(&Message::Ping { sent: 1234 }).await.unwrap();
        assert_eq!(rx.next().await.unwrap(), Message::Pong { sent: 1234 });
    }

    #[tokio::test]
    async fn test_requests_wait_for_tick() {
        let manager = manager();
        let (mut rx, mut tx) = spawn_connection(&manager);
        tx.send(&connect("a")).await.unwrap();
        rx.next().await.unwrap();

        tx.send(&Message::Request(Request::Move {
            destination: Vec2::new(3.0, 0.0),
        }))
        .await
        .unwrap();
        // Round-trip a ping so the move is known to be queued
        tx.send(&Message::Ping { sent: 1 }).await.unwrap();
        assert_eq!(rx.next().await.unwrap(), Message::Pong { sent: 1 });
        assert_eq!(manager.player("a").await.unwrap().destination, Vec2::ZERO);

        manager.tick(Duration::from_millis(100)).await.unwrap();
        assert_eq!(
            manager.player("a").await.unwrap().destination,
            Vec2::new(3.0, 0.0)
        );
    }

    #[tokio::test]
    async fn test_closing_connection_removes_player() {
        let manager = manager();
        let (mut rx, mut tx) = spawn_connection(&manager);
        tx.send(&connect("a")).await.unwrap();
        rx.next().await.unwrap();

        drop(tx);
        drop(rx);

        for _ in 0..50 {
            if manager.connected_ids().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(manager.connected_ids().await.is_empty());
        assert!(!manager.player("a").await.unwrap().active);
    }
}
