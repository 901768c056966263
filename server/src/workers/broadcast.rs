//! Fan-out of simulation output to every connected client.

use crate::client_manager::{Client, ClientManager};
use crate::network::ConnectionKind;
use log::{debug, error, info, warn};
use shared::codec::{self, CodecError, MAX_DATAGRAM_SIZE};
use shared::messages::{
    ServerGameUpdate, ServerNpcHit, ServerNpcKill, ServerNpcUpdate, ServerPlayerConnect,
    ServerPlayerDisconnect, ServerPlayerHit, ServerPlayerKill, ServerPlayerUpdate,
};
use shared::Message;
use std::io;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Everything the simulation tells clients about.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastMessage {
    GameUpdate(ServerGameUpdate),
    PlayerUpdate(ServerPlayerUpdate),
    NpcUpdate(ServerNpcUpdate),
    PlayerConnect(ServerPlayerConnect),
    PlayerDisconnect(ServerPlayerDisconnect),
    PlayerHit(ServerPlayerHit),
    PlayerKill(ServerPlayerKill),
    NpcHit(ServerNpcHit),
    NpcKill(ServerNpcKill),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// TCP stream or WebSocket.
    Reliable,
    /// UDP datagram, or the WebSocket for clients without UDP.
    Unreliable,
}

impl BroadcastMessage {
    /// State updates are superseded every tick and go unreliable; discrete
    /// events must arrive.
    pub fn delivery(&self) -> Delivery {
        match self {
            BroadcastMessage::GameUpdate(_)
            | BroadcastMessage::PlayerUpdate(_)
            | BroadcastMessage::NpcUpdate(_) => Delivery::Unreliable,
            _ => Delivery::Reliable,
        }
    }

    /// Server-origin messages carry client id zero.
    pub fn to_message(&self) -> Result<Message, CodecError> {
        match self {
            BroadcastMessage::GameUpdate(p) => Message::new(0, p),
            BroadcastMessage::PlayerUpdate(p) => Message::new(0, p),
            BroadcastMessage::NpcUpdate(p) => Message::new(0, p),
            BroadcastMessage::PlayerConnect(p) => Message::new(0, p),
            BroadcastMessage::PlayerDisconnect(p) => Message::new(0, p),
            BroadcastMessage::PlayerHit(p) => Message::new(0, p),
            BroadcastMessage::PlayerKill(p) => Message::new(0, p),
            BroadcastMessage::NpcHit(p) => Message::new(0, p),
            BroadcastMessage::NpcKill(p) => Message::new(0, p),
        }
    }
}

pub struct BroadcastWorker {
    clients: Arc<RwLock<ClientManager>>,
    udp: Arc<UdpSocket>,
}

impl BroadcastWorker {
    pub fn new(clients: Arc<RwLock<ClientManager>>, udp: Arc<UdpSocket>) -> Self {
        BroadcastWorker { clients, udp }
    }

    /// Runs until every sender is dropped.
    pub async fn run(self, mut messages: mpsc::Receiver<BroadcastMessage>) {
        while let Some(message) = messages.recv().await {
            self.broadcast(&message).await;
        }
        info!("Broadcast worker stopped");
    }

    /// Encodes once, then sends to every client without waiting on any.
    pub async fn broadcast(&self, message: &BroadcastMessage) {
        let bytes = match message.to_message().and_then(|m| codec::encode(&m)) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Failed to encode broadcast: {}", e);
                return;
            }
        };

        let mut delivery = message.delivery();
        if delivery == Delivery::Unreliable && bytes.len() > MAX_DATAGRAM_SIZE {
            debug!("{} byte update exceeds a datagram, sending reliably", bytes.len());
            delivery = Delivery::Reliable;
        }

        let clients = self.clients.read().await.clients();
        for client in &clients {
            self.deliver(client, delivery, &bytes);
        }
    }

    fn deliver(&self, client: &Client, delivery: Delivery, bytes: &[u8]) {
        match (delivery, client.kind()) {
            (Delivery::Unreliable, ConnectionKind::TcpUdp) => {
                let Some(addr) = client.udp_address else {
                    return;
                };
                match self.udp.try_send_to(bytes, addr) {
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        debug!("UDP socket busy, dropping update for client {}", client.id);
                    }
                    Err(e) => warn!("UDP send to client {} at {} failed: {}", client.id, addr, e),
                }
            }
            _ => {
                client.connection.send(bytes.to_vec());
            }
        }
    }
}
