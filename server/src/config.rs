use shared::protocol::DEFAULT_IO_TIMEOUT;
use shared::{DEFAULT_HISTORY, DEFAULT_REQUESTS_PER_TICK, DEFAULT_TICK_RATE};
use std::time::Duration;

/// Runtime settings for a server instance.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on, `host:port`
    pub address: String,
    /// Simulation steps per second
    pub tick_rate: u32,
    /// Capacity of each client's inbound request queue
    pub requests_per_tick: usize,
    /// Deadline for every read and write on a client connection
    pub io_timeout: Duration,
    /// World generations kept for rollback, current one included
    pub history: usize,
    /// Spawn positions are drawn from `[-spawn_range, spawn_range)` on both axes
    pub spawn_range: f64,
    pub max_clients: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            tick_rate: DEFAULT_TICK_RATE,
            requests_per_tick: DEFAULT_REQUESTS_PER_TICK,
            io_timeout: DEFAULT_IO_TIMEOUT,
            history: DEFAULT_HISTORY,
            spawn_range: 20.0,
            max_clients: 32,
        }
    }
}

impl ServerConfig {
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }

    /// Upper bound for the simulated time of a single tick.
    pub fn max_step(&self) -> Duration {
        self.tick_duration() * 3
    }
}
