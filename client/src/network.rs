use crate::config::ClientConfig;
use crate::game::ClientGameState;
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::geometry::clamp;
use shared::protocol::{MessageReader, MessageWriter};
use shared::{get_timestamp, Direction, Message, Request, Result, SyncError, Vec2};
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Instant, MissedTickBehavior};

/// Distance covered by a single random bot move
const BOT_MOVE_DISTANCE: f64 = 10.0;

const FORTUNES: [&str; 8] = [
    "Hello there!",
    "Anyone around?",
    "Nice weather today.",
    "Where is everyone going?",
    "I think I'm lost.",
    "Follow me!",
    "brb",
    "gg",
];

pub struct Client {
    writer: MessageWriter<OwnedWriteHalf>,
    incoming: mpsc::Receiver<Result<Message>>,
    reader_task: JoinHandle<()>,
    game_state: ClientGameState,
    config: ClientConfig,
    rng: StdRng,
}

impl Client {
    /// Connects, performs the handshake and waits for the full world sync.
    ///
    /// Every failure here is fatal: the client has nothing to run without a
    /// synced world.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        info!("Connecting to {} as {}...", config.server, config.player_id);

        let stream = match timeout(config.io_timeout, TcpStream::connect(&config.server)).await {
            Ok(stream) => stream.map_err(|e| SyncError::fatal(e.into()))?,
            Err(_) => return Err(SyncError::fatal(SyncError::Timeout(config.io_timeout))),
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }
        let (read_half, write_half) = stream.into_split();
        let mut reader = MessageReader::new(read_half, config.io_timeout);
        let mut writer = MessageWriter::new(write_half, config.io_timeout);

        writer
            .send(&Message::Request(Request::Connect {
                id: config.player_id.clone(),
            }))
            .await
            .map_err(SyncError::fatal)?;

        let sync = loop {
            match reader.next().await.map_err(SyncError::fatal)? {
                Message::Update(update) => break update,
                Message::Error { message } => {
                    return Err(SyncError::fatal(SyncError::Rejected(message)))
                }
                other => debug!("Ignoring {} before world sync", other),
            }
        };
        let game_state = ClientGameState::from_sync(&config.player_id, sync, &config)?;
        info!(
            "Connected! Player ID: {}, {} players in world",
            config.player_id,
            game_state.world().player_count()
        );

        let (tx, incoming) = mpsc::channel(config.max_buffered_updates.max(1));
        let reader_task = tokio::spawn(read_messages(reader, tx));
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Client {
            writer,
            incoming,
            reader_task,
            game_state,
            config,
            rng,
        })
    }

    pub fn game_state(&self) -> &ClientGameState {
        &self.game_state
    }

    pub fn player_id(&self) -> &str {
        self.game_state.player_id()
    }

    /// Sends a request and predicts its outcome locally.
    pub async fn send_request(&mut self, request: Request) -> Result<()> {
        self.writer
            .send(&Message::Request(request.clone()))
            .await
            .map_err(SyncError::fatal)?;
        self.game_state.predict(&request);
        Ok(())
    }

    async fn send_ping(&mut self) -> Result<()> {
        self.writer
            .send(&Message::Ping {
                sent: get_timestamp(),
            })
            .await
            .map_err(SyncError::fatal)
    }

    fn handle_message(&mut self, message: Message) -> Result<()> {
        match message {
            Message::Update(update) => {
                debug!("Received {}", update);
                self.game_state.apply_authoritative(update)
            }
            Message::Pong { sent } => {
                let round_trip = Duration::from_millis(get_timestamp().saturating_sub(sent));
                self.game_state.set_latency(round_trip);
                debug!("Ping: {}ms", round_trip.as_millis());
                Ok(())
            }
            Message::Error { message } => Err(SyncError::Rejected(message)),
            other => {
                warn!("Unexpected message from server: {}", other);
                Ok(())
            }
        }
    }

    /// Picks random bot actions: a move ten units in a cardinal direction,
    /// a line of speech, both or neither.
    async fn act_randomly(&mut self) -> Result<()> {
        let position = match self.game_state.local_player() {
            Some(player) => player.position,
            None => return Ok(()),
        };

        if self.rng.gen_bool(clamp(self.config.move_chance, 0.0, 1.0)) {
            let direction = Direction::CARDINAL[self.rng.gen_range(0..Direction::CARDINAL.len())];
            let destination = position + direction.to_vec().scale(BOT_MOVE_DISTANCE);
            debug!("Moving {} towards {}", direction, destination);
            self.send_request(Request::Move { destination }).await?;
        }

        if self.rng.gen_bool(clamp(self.config.speak_chance, 0.0, 1.0)) {
            let text = FORTUNES[self.rng.gen_range(0..FORTUNES.len())].to_string();
            self.send_request(Request::Speak { text }).await?;
        }
        Ok(())
    }

    fn log_world(&self) {
        let world = self.game_state.world();
        let mut summary = Vec::new();
        world.for_each(|player| {
            let heading = Direction::from_unit((player.destination - player.position).normalize());
            summary.push(format!("{} {} {}", player.id, player.position, heading));
        });
        debug!(
            "{} players, ping {}ms: {}",
            summary.len(),
            self.game_state.latency().as_millis(),
            summary.join(", ")
        );
    }

    /// Runs until the server connection fails.
    pub async fn run(&mut self, bot: bool) -> Result<()> {
        self.run_for(None, bot).await
    }

    /// Main client loop: applies server updates, steps the local world,
    /// pings the server and, for bots, acts randomly. Returns `Ok` once
    /// `duration` has elapsed, or a fatal error if the connection fails.
    pub async fn run_for(&mut self, duration: Option<Duration>, bot: bool) -> Result<()> {
        let tick_duration = self.config.tick_duration();
        let mut step_interval = interval(tick_duration);
        step_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ping_interval = interval(self.config.ping_interval);
        ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut bot_interval = interval(self.config.bot_interval);
        bot_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let has_deadline = duration.is_some();
        let deadline = sleep(duration.unwrap_or(Duration::ZERO));
        tokio::pin!(deadline);

        // Skip the first tick since it fires immediately
        step_interval.tick().await;
        let mut last_step = Instant::now();

        loop {
            tokio::select! {
                message = self.incoming.recv() => {
                    match message {
                        Some(Ok(message)) => {
                            if let Err(e) = self.handle_message(message) {
                                if e.is_fatal() {
                                    return Err(e);
                                }
                                error!("Error: {}", e);
                            }
                        }
                        Some(Err(e)) => return Err(SyncError::fatal(e)),
                        None => return Err(SyncError::fatal(SyncError::ConnectionClosed)),
                    }
                },

                _ = step_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_step).min(tick_duration * 3);
                    last_step = now;
                    if let Err(e) = self.game_state.step(dt) {
                        error!("Error stepping world: {}", e);
                    }
                },

                _ = ping_interval.tick() => {
                    self.send_ping().await?;
                    self.log_world();
                },

                _ = bot_interval.tick(), if bot => {
                    self.act_randomly().await?;
                },

                _ = &mut deadline, if has_deadline => {
                    info!("Run time elapsed, stopping client {}", self.player_id());
                    return Ok(());
                },
            }
        }
    }

    /// Position of this client's own player as currently predicted.
    pub fn position(&self) -> Option<Vec2> {
        self.game_state.local_player().map(|p| p.position)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Forwards decoded messages until the first read error, which is forwarded
/// too.
async fn read_messages(
    mut reader: MessageReader<OwnedReadHalf>,
    tx: mpsc::Sender<Result<Message>>,
) {
    loop {
        let message = reader.next().await;
        let failed = message.is_err();
        if tx.send(message).await.is_err() || failed {
            break;
        }
    }
}
