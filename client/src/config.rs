use shared::protocol::DEFAULT_IO_TIMEOUT;
use shared::{DEFAULT_HISTORY, DEFAULT_TICK_RATE};
use std::time::Duration;

/// Runtime settings for a client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, `host:port`
    pub server: String,
    pub player_id: String,
    /// Local simulation steps per second, should match the server
    pub tick_rate: u32,
    pub io_timeout: Duration,
    /// World generations kept locally
    pub history: usize,
    /// Probability of a random move per bot action
    pub move_chance: f64,
    /// Probability of a random line of speech per bot action
    pub speak_chance: f64,
    pub bot_interval: Duration,
    pub ping_interval: Duration,
    /// Capacity of the reconciliation buffer and the inbound message queue
    pub max_buffered_updates: usize,
    pub prediction_enabled: bool,
    pub reconciliation_enabled: bool,
    /// Seed for the bot's random choices, random when unset
    pub seed: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: "127.0.0.1:8080".to_string(),
            player_id: "player".to_string(),
            tick_rate: DEFAULT_TICK_RATE,
            io_timeout: DEFAULT_IO_TIMEOUT,
            history: DEFAULT_HISTORY,
            move_chance: 0.2,
            speak_chance: 0.05,
            bot_interval: Duration::from_millis(50),
            ping_interval: Duration::from_secs(1),
            max_buffered_updates: 30,
            prediction_enabled: true,
            reconciliation_enabled: true,
            seed: None,
        }
    }
}

impl ClientConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }
}
