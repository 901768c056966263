//! Transport servers and the types they share with the dispatcher.
//!
//! Every transport turns raw bytes into [`TransportEvent`]s on one channel
//! and never looks at what a message means. Writes go through per-connection
//! channels so nothing holding the client registry ever touches a socket.

pub mod tcp;
pub mod udp;
pub mod websocket;

use log::{debug, error, warn};
use shared::{codec, Message};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Frames buffered per connection before new ones are dropped.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// How a client is attached to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// Reliable TCP stream plus a UDP address learned from pings.
    TcpUdp,
    /// One WebSocket carrying both reliable and unreliable traffic.
    WebSocket,
}

/// Write side of a reliable connection.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    kind: ConnectionKind,
    sender: mpsc::Sender<Vec<u8>>,
}

impl ConnectionHandle {
    pub fn new(kind: ConnectionKind, sender: mpsc::Sender<Vec<u8>>) -> Self {
        ConnectionHandle {
            id: next_connection_id(),
            kind,
            sender,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn kind(&self) -> ConnectionKind {
        self.kind
    }

    /// Queues an encoded frame without waiting. Returns false if the frame
    /// was dropped because the connection is slow or gone.
    pub fn send(&self, bytes: Vec<u8>) -> bool {
        match self.sender.try_send(bytes) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("Outbound queue full for connection {}, dropping frame", self.id);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Connection {} closed, dropping frame", self.id);
                false
            }
        }
    }

    pub fn send_message(&self, message: &Message) -> bool {
        match codec::encode(message) {
            Ok(bytes) => self.send(bytes),
            Err(e) => {
                error!("Failed to encode {}: {}", message.message_type, e);
                false
            }
        }
    }
}

/// Where an inbound message came from.
#[derive(Debug, Clone)]
pub enum Origin {
    /// A TCP or WebSocket connection.
    Connection(ConnectionHandle),
    /// A UDP datagram.
    Datagram(SocketAddr),
}

#[derive(Debug)]
pub enum TransportEvent {
    Message { origin: Origin, message: Message },
    /// A UDP ping from a client; the address is where pongs should go.
    Ping { client_id: u32, addr: SocketAddr },
    Closed { connection_id: ConnectionId },
}
