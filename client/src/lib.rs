//! # World Sync Client Library
//!
//! This library provides the client side of the shared world: it connects to
//! the server, keeps a local copy of the world in step with the server's
//! updates and, as a headless bot, issues random moves and speech.
//!
//! ## Architecture Overview
//!
//! ### Client-Side Prediction
//! Requests are applied to the local world as soon as they are sent, so the
//! local player starts moving without waiting for the server.
//!
//! ### Server Reconciliation
//! Every update the local world processes is kept in an [`update_buffer::UpdateBuffer`].
//! When an authoritative update arrives, local updates older than it are
//! discarded and the newer ones are replayed on top of it.
//!
//! ### Latency Estimation
//! The client pings the server once per second. Half the round trip is added
//! to authoritative timestamps before reconciling, approximating when the
//! update would have reached the client.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Local world, prediction and reconciliation.
//!
//! ### Network Module (`network`)
//! Connection, handshake, the main select loop and bot behaviour.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::config::ClientConfig;
//! use client::network::Client;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig {
//!         player_id: "bot-1".to_string(),
//!         ..Default::default()
//!     };
//!     let mut client = Client::connect(config).await?;
//!     client.run_for(Some(Duration::from_secs(30)), true).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod game;
pub mod network;
pub mod update_buffer;
