use clap::Parser;
use client::config::ClientConfig;
use client::network::Client;
use log::info;
use rand::Rng;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Player id, random when not given
    #[arg(short = 'i', long)]
    id: Option<String>,

    /// Local simulation rate (steps per second)
    #[arg(short = 't', long, default_value = "10")]
    tick_rate: u32,

    /// Probability of a random move on each bot action
    #[arg(short = 'm', long, default_value = "0.2")]
    move_chance: f64,

    /// Probability of saying something on each bot action
    #[arg(long, default_value = "0.05")]
    speak_chance: f64,

    /// Stop after this many seconds, run forever when not given
    #[arg(short = 'd', long)]
    duration_secs: Option<u64>,

    /// Disable client-side prediction
    #[arg(long)]
    no_prediction: bool,

    /// Disable server reconciliation
    #[arg(long)]
    no_reconciliation: bool,

    /// Seed for the bot's random choices
    #[arg(long)]
    seed: Option<u64>,
}

impl From<Args> for ClientConfig {
    fn from(args: Args) -> Self {
        let player_id = args
            .id
            .unwrap_or_else(|| format!("bot-{:04}", rand::thread_rng().gen_range(0..10_000)));
        ClientConfig {
            server: args.server,
            player_id,
            tick_rate: args.tick_rate,
            move_chance: args.move_chance,
            speak_chance: args.speak_chance,
            prediction_enabled: !args.no_prediction,
            reconciliation_enabled: !args.no_reconciliation,
            seed: args.seed,
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let duration = args.duration_secs.map(Duration::from_secs);
    let config = ClientConfig::from(args);

    info!("Starting client...");
    info!("Connecting to: {}", config.server);
    info!(
        "Prediction: {}, reconciliation: {}",
        config.prediction_enabled, config.reconciliation_enabled
    );

    let mut client = Client::connect(config).await?;

    tokio::select! {
        result = client.run_for(duration, true) => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl+C, disconnecting"),
    }

    Ok(())
}
