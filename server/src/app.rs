//! Wires transports, dispatcher, simulation and workers together.

use crate::auth::{DevTokenVerifier, StaticTokenVerifier, TokenVerifier};
use crate::client_manager::ClientManager;
use crate::config::{AuthKind, RepositoryKind, ServerConfig};
use crate::dispatcher::Dispatcher;
use crate::error::ServerError;
use crate::game::{self, GameManager};
use crate::network::tcp::TcpTransport;
use crate::network::udp::UdpTransport;
use crate::network::websocket::WebSocketTransport;
use crate::repository::{FileRepository, InMemoryRepository, Repository};
use crate::workers::{BroadcastWorker, ConnectionWorker, PersistenceWorker};
use log::{error, info};
use shared::GameState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;

const SIMULATION_EVENT_CAPACITY: usize = 256;
const BROADCAST_QUEUE_CAPACITY: usize = 1024;
const SAVE_QUEUE_CAPACITY: usize = 256;

pub fn build_auth(config: &ServerConfig) -> Result<Arc<dyn TokenVerifier>, ServerError> {
    Ok(match config.auth {
        AuthKind::Dev => Arc::new(DevTokenVerifier),
        AuthKind::Static => Arc::new(StaticTokenVerifier::from_pairs(&config.tokens)?),
    })
}

pub async fn build_repository(config: &ServerConfig) -> Result<Arc<dyn Repository>, ServerError> {
    Ok(match config.repository {
        RepositoryKind::Memory => Arc::new(InMemoryRepository::new()),
        RepositoryKind::File => Arc::new(FileRepository::open(&config.data_file).await?),
    })
}

/// A started server. Dropping it leaves the tasks running; call
/// [`Server::shutdown`] to stop them.
pub struct Server {
    pub tcp_addr: SocketAddr,
    pub udp_addr: SocketAddr,
    pub ws_addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Server {
    /// Binds every listener, then spawns all tasks. Fails only if a
    /// listener cannot be bound.
    pub async fn start(
        config: &ServerConfig,
        auth: Arc<dyn TokenVerifier>,
        repository: Arc<dyn Repository>,
    ) -> Result<Server, ServerError> {
        config.validate()?;

        let tcp = TcpTransport::bind(&config.tcp_addr()).await?;
        let udp = UdpTransport::bind(&config.udp_addr()).await?;
        let ws = WebSocketTransport::bind(&config.ws_addr()).await?;
        let tcp_addr = tcp.local_addr()?;
        let udp_addr = udp.local_addr()?;
        let ws_addr = ws.local_addr()?;
        let udp_socket = udp.socket();

        let (shutdown_tx, shutdown) = watch::channel(false);
        let (transport_tx, transport_rx) = mpsc::channel(config.inbound_queue_capacity);
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_queue_capacity);
        let (connection_tx, connection_rx) = mpsc::unbounded_channel();
        let (simulation_tx, simulation_rx) = mpsc::channel(SIMULATION_EVENT_CAPACITY);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(BROADCAST_QUEUE_CAPACITY);
        let (saves_tx, saves_rx) = mpsc::channel(SAVE_QUEUE_CAPACITY);
        let (snapshots_tx, snapshots_rx) = watch::channel(GameState::new());

        let clients = Arc::new(RwLock::new(ClientManager::new(
            config.max_clients,
            connection_tx,
        )));

        let dispatcher = Dispatcher::new(
            Arc::clone(&clients),
            auth,
            Arc::clone(&udp_socket),
            inbound_tx,
        );
        let game = GameManager::new(
            game::default_world(),
            config.tick_duration(),
            config.game_update_interval,
            broadcast_tx,
            saves_tx,
            snapshots_tx,
        );
        let broadcaster = BroadcastWorker::new(Arc::clone(&clients), udp_socket);
        let loader = ConnectionWorker::new(Arc::clone(&repository));
        let saver = PersistenceWorker::new(repository, config.save_interval());

        let tasks = vec![
            tokio::spawn(tcp.run(transport_tx.clone(), shutdown.clone())),
            tokio::spawn(udp.run(transport_tx.clone(), shutdown.clone())),
            tokio::spawn(ws.run(transport_tx, shutdown.clone())),
            tokio::spawn(dispatcher.run(transport_rx, shutdown.clone())),
            tokio::spawn(loader.run(connection_rx, simulation_tx, shutdown.clone())),
            tokio::spawn(game.run(simulation_rx, inbound_rx, shutdown)),
            tokio::spawn(broadcaster.run(broadcast_rx)),
            tokio::spawn(saver.run(saves_rx, snapshots_rx)),
        ];

        info!(
            "Server started: tcp {}, udp {}, websocket {}",
            tcp_addr, udp_addr, ws_addr
        );

        Ok(Server {
            tcp_addr,
            udp_addr,
            ws_addr,
            clients,
            shutdown: shutdown_tx,
            tasks,
        })
    }

    pub async fn client_count(&self) -> usize {
        self.clients.read().await.len()
    }

    /// Signals every task to stop and waits for them, including the final
    /// save of the world.
    pub async fn shutdown(self) {
        info!("Shutting down");
        self.shutdown.send_replace(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!("Task ended abnormally: {}", e);
            }
        }
        info!("Server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_auth_requires_valid_pairs() {
        let config = ServerConfig {
            auth: AuthKind::Static,
            tokens: vec!["no-separator".to_string()],
            ..ServerConfig::ephemeral()
        };
        assert!(build_auth(&config).is_err());
    }

    #[tokio::test]
    async fn test_start_and_shutdown() {
        let config = ServerConfig::ephemeral();
        let auth = build_auth(&config).unwrap();
        let repository = build_repository(&config).await.unwrap();

        let server = Server::start(&config, auth, repository).await.unwrap();
        assert_ne!(server.tcp_addr.port(), 0);
        assert_ne!(server.udp_addr.port(), 0);
        assert_ne!(server.ws_addr.port(), 0);
        assert_eq!(server.client_count().await, 0);

        tokio::time::timeout(std::time::Duration::from_secs(5), server.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_fails_to_start() {
        let config = ServerConfig {
            tick_rate: 0,
            ..ServerConfig::ephemeral()
        };
        let auth = build_auth(&config).unwrap();
        let repository = build_repository(&config).await.unwrap();
        assert!(matches!(
            Server::start(&config, auth, repository).await,
            Err(ServerError::InvalidConfig(_))
        ));
    }
}
