use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Tick rate (updates per second)
    #[arg(short, long, default_value = "10")]
    tick_rate: u32,

    /// Requests buffered per client between ticks
    #[arg(short, long, default_value = "60")]
    requests_per_tick: usize,

    /// Read/write deadline for client connections in milliseconds
    #[arg(long, default_value = "3000")]
    timeout_ms: u64,

    /// World generations kept for rollback
    #[arg(long, default_value = "3")]
    history: usize,

    /// Half-width of the square players spawn in
    #[arg(long, default_value = "20")]
    spawn_range: f64,

    /// Maximum number of concurrent clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            address: format!("{}:{}", args.host, args.port),
            tick_rate: args.tick_rate,
            requests_per_tick: args.requests_per_tick,
            io_timeout: Duration::from_millis(args.timeout_ms),
            history: args.history,
            spawn_range: args.spawn_range,
            max_clients: args.max_clients,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    info!("Starting server on {}", config.address);
    info!(
        "Tick rate: {} Hz, history: {} generations",
        config.tick_rate, config.history
    );

    let server = Server::bind(config).await?;
    let manager = server.manager();
    let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();

    let mut server_handle = tokio::spawn(server.run(errors_tx));

    loop {
        tokio::select! {
            Some(e) = errors_rx.recv() => {
                if e.is_fatal() {
                    error!("Fatal error, shutting down: {}", e);
                    return Err(e.into());
                }
                error!("Error: {}", e);
            }
            result = &mut server_handle => {
                match result {
                    Ok(Err(e)) => error!("Server stopped: {}", e),
                    Err(e) => error!("Server task panicked: {}", e),
                    Ok(Ok(())) => info!("Server stopped"),
                }
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                manager.shutdown().await;
                break;
            }
        }
    }

    Ok(())
}
