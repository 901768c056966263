//! Unreliable UDP transport. One socket serves every client.

use super::{Origin, TransportEvent};
use crate::error::ServerError;
use log::{debug, error, info, warn};
use shared::codec::{self, MAX_DATAGRAM_SIZE};
use shared::MessageType;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};

pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    pub async fn bind(addr: &str) -> Result<Self, ServerError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                transport: "udp",
                addr: addr.to_string(),
                source,
            })?;
        info!("UDP server listening on {}", addr);
        Ok(UdpTransport {
            socket: Arc::new(socket),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// The socket, shared with everything that sends datagrams.
    pub fn socket(&self) -> Arc<UdpSocket> {
        Arc::clone(&self.socket)
    }

    pub async fn run(self, events: mpsc::Sender<TransportEvent>, mut shutdown: watch::Receiver<bool>) {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buffer) => {
                    match received {
                        Ok((len, addr)) => {
                            if let Some(event) = datagram_event(&buffer[..len], addr) {
                                match events.try_send(event) {
                                    Ok(()) => {}
                                    Err(TrySendError::Full(_)) => {
                                        warn!("Transport queue full, dropping datagram from {}", addr);
                                    }
                                    Err(TrySendError::Closed(_)) => break,
                                }
                            }
                        }
                        // ICMP port unreachable from a departed client surfaces here
                        Err(e) => error!("Error receiving datagram: {}", e),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("UDP server stopped");
    }
}

/// Decodes one datagram. Anything undecodable or without a client id is
/// dropped here.
fn datagram_event(bytes: &[u8], addr: SocketAddr) -> Option<TransportEvent> {
    let message = match codec::decode(bytes) {
        Ok(message) => message,
        Err(e) => {
            debug!("Dropping malformed datagram from {}: {}", addr, e);
            return None;
        }
    };

    if message.client_id == 0 {
        debug!("Dropping anonymous {} from {}", message.message_type, addr);
        return None;
    }

    if message.message_type == MessageType::ClientPing {
        return Some(TransportEvent::Ping {
            client_id: message.client_id,
            addr,
        });
    }

    Some(TransportEvent::Message {
        origin: Origin::Datagram(addr),
        message,
    })
}
