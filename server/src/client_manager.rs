//! Client registry for the multiplayer server
//!
//! This module tracks every logged-in client, including:
//! - Client id generation and the one-session-per-user rule
//! - The reliable connection handle used to reach each client
//! - UDP return addresses learned from pings
//!
//! The registry is shared as `Arc<RwLock<ClientManager>>`. Readers copy
//! records out and do their I/O after releasing the lock.

use crate::error::RegistryError;
use crate::network::{ConnectionHandle, ConnectionId, ConnectionKind};
use log::{info, warn};
use rand::Rng;
use std::collections::HashMap;
use std::net::SocketAddr;
use tokio::sync::mpsc;

/// Attempts at drawing an unused client id before giving up.
pub const CLIENT_ID_MAX_RETRIES: usize = 1024;

/// Lifecycle notifications for the connection worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connect {
        client_id: u32,
        user_id: String,
        character_id: i32,
    },
    Disconnect {
        client_id: u32,
    },
}

/// A logged-in client
#[derive(Debug, Clone)]
pub struct Client {
    /// Server-assigned id, never zero
    pub id: u32,
    /// Identity the login token resolved to
    pub user_id: String,
    pub character_id: i32,
    /// Reliable write path
    pub connection: ConnectionHandle,
    /// Where UDP traffic for this client goes, once a ping has been seen
    pub udp_address: Option<SocketAddr>,
}

impl Client {
    pub fn kind(&self) -> ConnectionKind {
        self.connection.kind()
    }
}

/// Owns every [`Client`] record.
pub struct ClientManager {
    clients: HashMap<u32, Client>,
    max_clients: Option<usize>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
}

impl ClientManager {
    pub fn new(max_clients: Option<usize>, events: mpsc::UnboundedSender<ConnectionEvent>) -> Self {
        Self {
            clients: HashMap::new(),
            max_clients,
            events,
        }
    }

    /// Registers a client for a freshly authenticated connection.
    ///
    /// Fails without touching the registry if the user already has a
    /// session, the server is at capacity, or no free id could be drawn.
    pub fn connect_client(
        &mut self,
        connection: ConnectionHandle,
        user_id: String,
        character_id: i32,
    ) -> Result<u32, RegistryError> {
        self.connect_client_with(&mut rand::thread_rng(), connection, user_id, character_id)
    }

    fn connect_client_with<R: Rng>(
        &mut self,
        rng: &mut R,
        connection: ConnectionHandle,
        user_id: String,
        character_id: i32,
    ) -> Result<u32, RegistryError> {
        if self.clients.values().any(|client| client.user_id == user_id) {
            return Err(RegistryError::AlreadyConnected(user_id));
        }

        if let Some(max_clients) = self.max_clients {
            if self.clients.len() >= max_clients {
                return Err(RegistryError::ServerFull);
            }
        }

        let client_id = self.generate_client_id(rng)?;
        info!(
            "Client {} connected as user {} (character {}) on connection {}",
            client_id,
            user_id,
            character_id,
            connection.id()
        );

        self.clients.insert(
            client_id,
            Client {
                id: client_id,
                user_id: user_id.clone(),
                character_id,
                connection,
                udp_address: None,
            },
        );
        self.notify(ConnectionEvent::Connect {
            client_id,
            user_id,
            character_id,
        });

        Ok(client_id)
    }

    fn generate_client_id<R: Rng>(&self, rng: &mut R) -> Result<u32, RegistryError> {
        for _ in 0..CLIENT_ID_MAX_RETRIES {
            let candidate: u32 = rng.gen();
            if candidate != 0 && !self.clients.contains_key(&candidate) {
                return Ok(candidate);
            }
        }
        Err(RegistryError::IdSpaceExhausted)
    }

    /// Removes a client. Returns false if they were already gone.
    pub fn disconnect_client(&mut self, client_id: u32) -> bool {
        if let Some(client) = self.clients.remove(&client_id) {
            info!("Client {} (user {}) disconnected", client.id, client.user_id);
            self.notify(ConnectionEvent::Disconnect { client_id });
            true
        } else {
            false
        }
    }

    /// Records the UDP return address from the client's first ping. Returns
    /// true only if something was written. A bound address is kept for the
    /// rest of the session: client ids are visible to every player, so a
    /// ping naming someone else's id must not redirect their datagrams.
    pub fn set_udp_address(&mut self, client_id: u32, addr: SocketAddr) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => match client.udp_address {
                None => {
                    info!("Client {} UDP address set to {}", client_id, addr);
                    client.udp_address = Some(addr);
                    true
                }
                Some(bound) if bound != addr => {
                    warn!(
                        "Client {} is bound to UDP {}, ignoring address {}",
                        client_id, bound, addr
                    );
                    false
                }
                Some(_) => false,
            },
            None => false,
        }
    }

    /// Whether a datagram from `addr` may act for the client.
    pub fn owns_udp_address(&self, client_id: u32, addr: SocketAddr) -> bool {
        self.clients
            .get(&client_id)
            .map_or(false, |client| client.udp_address == Some(addr))
    }

    pub fn client(&self, client_id: u32) -> Option<Client> {
        self.clients.get(&client_id).cloned()
    }

    /// Copies of every client record.
    pub fn clients(&self) -> Vec<Client> {
        self.clients.values().cloned().collect()
    }

    pub fn exists(&self, client_id: u32) -> bool {
        self.clients.contains_key(&client_id)
    }

    pub fn client_id_by_connection(&self, connection_id: ConnectionId) -> Option<u32> {
        self.clients
            .values()
            .find(|client| client.connection.id() == connection_id)
            .map(|client| client.id)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    fn notify(&self, event: ConnectionEvent) {
        if self.events.send(event).is_err() {
            warn!("Connection event receiver dropped");
        }
    }
}
