//! # World Sync Server Library
//!
//! This library provides the authoritative server for the shared world. It
//! owns the canonical [`shared::World`], turns client requests into updates,
//! steps the simulation on a fixed tick and broadcasts every committed update
//! so clients can replay the same event stream.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The server runs the definitive version of the world. Clients predict
//! locally, but only updates committed here are authoritative.
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Handshake with a client-chosen player id
//! - Per-client bounded request queues, drained once per tick
//! - Disconnection on read failure, write failure or explicit close
//!
//! ### Update Broadcasting
//! Every mutation goes through one commit path that applies it and writes the
//! resulting updates to all clients in the same order.
//!
//! ## Module Organization
//!
//! ### Client Manager Module (`client_manager`)
//! Registry of connected clients, their writers and request queues.
//!
//! ### Update Manager Module (`update_manager`)
//! The commit path: connect, disconnect, move and speak handling, and the
//! per-tick step.
//!
//! ### Network Module (`network`)
//! TCP accept loop, handshake, per-connection receive loop and the tick
//! scheduler.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//! use tokio::sync::mpsc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::bind(ServerConfig::default()).await?;
//!
//!     // Tick failures are reported here while the server keeps running
//!     let (errors_tx, mut errors_rx) = mpsc::unbounded_channel();
//!     tokio::spawn(async move {
//!         while let Some(e) = errors_rx.recv().await {
//!             eprintln!("tick error: {}", e);
//!         }
//!     });
//!
//!     server.run(errors_tx).await?;
//!     Ok(())
//! }
//! ```

pub mod client_manager;
pub mod config;
pub mod network;
pub mod update_manager;
