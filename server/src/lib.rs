//! # Game Server Library
//!
//! The authoritative server for a real-time 2D action game. It owns the
//! canonical world, applies client inputs, runs NPC behaviour, and streams
//! the results back to every connected client.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The world advances in fixed ticks on a single task. Clients send inputs,
//! never positions; physics, combat and NPC decisions all happen here.
//!
//! ### Sessions
//! Clients log in with a token over TCP or WebSocket. TCP clients then ping
//! over UDP so the server learns where to send unreliable traffic:
//! - Login, logout and time sync are answered by the dispatcher
//! - Gameplay messages are queued for the next tick
//! - A closed connection ends the session and saves the character
//!
//! ### State Broadcasting
//! Each tick sends per-actor updates for whatever changed, and every few
//! ticks a full game update. Hits, kills, joins and departures go over the
//! reliable path.
//!
//! ## Architecture Design
//!
//! ### Tasks and Channels
//! Every component runs as its own tokio task and talks to the others over
//! channels:
//! - **Transports** (`network`): TCP, UDP and WebSocket listeners that turn
//!   bytes into events
//! - **Dispatcher** (`dispatcher`): session protocol and routing
//! - **Simulation** (`game`): the tick loop and world rules
//! - **Workers** (`workers`): broadcasting, character loading and saving
//!
//! The client registry (`client_manager`) is the only shared mutable state.
//! Nothing holds its lock across network I/O.
//!
//! ### Input Ordering
//! Inputs are applied in the order they arrive. An input whose timestamp is
//! not newer than the last one applied for that player is dropped, so a
//! reordered datagram can never replay or rewind movement.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::app::{build_auth, build_repository, Server};
//! use server::config::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::ephemeral();
//!     let auth = build_auth(&config)?;
//!     let repository = build_repository(&config).await?;
//!
//!     let server = Server::start(&config, auth, repository).await?;
//!     println!("TCP clients connect to {}", server.tcp_addr);
//!
//!     tokio::signal::ctrl_c().await?;
//!     server.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod app;
pub mod auth;
pub mod client_manager;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod game;
pub mod network;
pub mod repository;
pub mod utils;
pub mod workers;
