//! Command line and environment configuration for the server binary.

use crate::error::ServerError;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TCP_PORT: u16 = 8888;
pub const DEFAULT_UDP_PORT: u16 = 8889;
pub const DEFAULT_WS_PORT: u16 = 8890;
pub const DEFAULT_TICK_RATE: u32 = 20;
pub const DEFAULT_INBOUND_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RepositoryKind {
    /// Keep everything in process memory.
    Memory,
    /// Persist to a JSON document on disk.
    File,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthKind {
    /// Accept any non-empty token and use it as the user id.
    Dev,
    /// Only accept tokens listed with `--token`.
    Static,
}

/// Authoritative game server.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about)]
pub struct ServerConfig {
    /// Address to bind every listener to
    #[clap(short = 'H', long, env = "GAME_HOST", default_value = "0.0.0.0")]
    pub host: String,
    /// TCP port for the reliable channel
    #[clap(long, env = "GAME_TCP_PORT", default_value_t = DEFAULT_TCP_PORT)]
    pub tcp_port: u16,
    /// UDP port for the unreliable channel
    #[clap(long, env = "GAME_UDP_PORT", default_value_t = DEFAULT_UDP_PORT)]
    pub udp_port: u16,
    /// WebSocket port for browser clients
    #[clap(long, env = "GAME_WS_PORT", default_value_t = DEFAULT_WS_PORT)]
    pub ws_port: u16,
    /// Simulation ticks per second
    #[clap(short, long, env = "GAME_TICK_RATE", default_value_t = DEFAULT_TICK_RATE)]
    pub tick_rate: u32,
    /// Ticks between full game state broadcasts
    #[clap(long, env = "GAME_UPDATE_INTERVAL", default_value_t = DEFAULT_TICK_RATE)]
    pub game_update_interval: u32,
    /// Seconds between periodic game state saves
    #[clap(long, env = "GAME_SAVE_INTERVAL", default_value_t = 10)]
    pub save_interval: u64,
    /// Capacity of the queue between the dispatcher and the simulation
    #[clap(long, env = "GAME_INBOUND_QUEUE", default_value_t = DEFAULT_INBOUND_QUEUE_CAPACITY)]
    pub inbound_queue_capacity: usize,
    /// Maximum number of concurrently connected clients
    #[clap(long, env = "GAME_MAX_CLIENTS")]
    pub max_clients: Option<usize>,
    /// Persistence backend
    #[clap(long, env = "GAME_REPOSITORY", value_enum, default_value_t = RepositoryKind::Memory)]
    pub repository: RepositoryKind,
    /// Path of the JSON document used by the file repository
    #[clap(long, env = "GAME_DATA_FILE", default_value = "game_data.json")]
    pub data_file: PathBuf,
    /// Token verification strategy
    #[clap(long, env = "GAME_AUTH", value_enum, default_value_t = AuthKind::Dev)]
    pub auth: AuthKind,
    /// `token=user_id` pairs accepted by the static verifier
    #[clap(long = "token", env = "GAME_TOKENS", value_delimiter = ',')]
    pub tokens: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            ws_port: DEFAULT_WS_PORT,
            tick_rate: DEFAULT_TICK_RATE,
            game_update_interval: DEFAULT_TICK_RATE,
            save_interval: 10,
            inbound_queue_capacity: DEFAULT_INBOUND_QUEUE_CAPACITY,
            max_clients: None,
            repository: RepositoryKind::Memory,
            data_file: PathBuf::from("game_data.json"),
            auth: AuthKind::Dev,
            tokens: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Config for running on loopback with OS-assigned ports.
    pub fn ephemeral() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            tcp_port: 0,
            udp_port: 0,
            ws_port: 0,
            ..ServerConfig::default()
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.tick_rate == 0 || self.tick_rate > 1000 {
            return Err(ServerError::InvalidConfig(format!(
                "tick rate must be between 1 and 1000, got {}",
                self.tick_rate
            )));
        }
        if self.game_update_interval == 0 {
            return Err(ServerError::InvalidConfig(
                "game update interval must be at least one tick".to_string(),
            ));
        }
        if self.save_interval == 0 {
            return Err(ServerError::InvalidConfig(
                "save interval must be at least one second".to_string(),
            ));
        }
        if self.inbound_queue_capacity == 0 {
            return Err(ServerError::InvalidConfig(
                "inbound queue capacity must be positive".to_string(),
            ));
        }
        if self.max_clients == Some(0) {
            return Err(ServerError::InvalidConfig(
                "max clients must be positive when set".to_string(),
            ));
        }
        if self.tcp_port != 0 && self.tcp_port == self.ws_port {
            return Err(ServerError::InvalidConfig(format!(
                "tcp and websocket listeners cannot share port {}",
                self.tcp_port
            )));
        }
        if self.auth == AuthKind::Static && self.tokens.is_empty() {
            return Err(ServerError::InvalidConfig(
                "static auth requires at least one --token".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tcp_addr(&self) -> String {
        format!("{}:{}", self.host, self.tcp_port)
    }

    pub fn udp_addr(&self) -> String {
        format!("{}:{}", self.host, self.udp_port)
    }

    pub fn ws_addr(&self) -> String {
        format!("{}:{}", self.host, self.ws_port)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval)
    }
}
