//! Reliable TCP transport.
//!
//! Frames are a big-endian `u32` length followed by one encoded envelope.

use super::{ConnectionHandle, ConnectionKind, Origin, TransportEvent, OUTBOUND_QUEUE_CAPACITY};
use crate::error::ServerError;
use log::{debug, error, info, warn};
use shared::codec::{self, MAX_MESSAGE_SIZE};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};

/// LZ4 output can be slightly larger than its input.
pub const MAX_FRAME_SIZE: usize = MAX_MESSAGE_SIZE + MAX_MESSAGE_SIZE / 255 + 64;

/// Reads one frame. `Ok(None)` means the peer closed cleanly between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }

    let mut frame = vec![0u8; len];
    reader.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &[u8]) -> io::Result<()> {
    let len = u32::try_from(frame.len())
        .ok()
        .filter(|len| *len as usize <= MAX_FRAME_SIZE)
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(frame).await?;
    writer.flush().await
}

pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    pub async fn bind(addr: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                transport: "tcp",
                addr: addr.to_string(),
                source,
            })?;
        info!("TCP server listening on {}", addr);
        Ok(TcpTransport { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until shutdown.
    pub async fn run(
        self,
        events: mpsc::Sender<TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tokio::spawn(handle_connection(
                                stream,
                                peer,
                                events.clone(),
                                shutdown.clone(),
                            ));
                        }
                        Err(e) => error!("Failed to accept TCP connection: {}", e),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("TCP server stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::Sender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY for {}: {}", peer, e);
    }

    let (mut reader, writer) = stream.into_split();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let handle = ConnectionHandle::new(ConnectionKind::TcpUdp, tx);
    let connection_id = handle.id();
    info!("TCP connection {} from {}", connection_id, peer);

    tokio::spawn(write_loop(writer, rx, peer));

    loop {
        tokio::select! {
            frame = read_frame(&mut reader) => {
                match frame {
                    Ok(Some(bytes)) => match codec::decode(&bytes) {
                        Ok(message) => {
                            let event = TransportEvent::Message {
                                origin: Origin::Connection(handle.clone()),
                                message,
                            };
                            if events.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping malformed frame from {}: {}", peer, e),
                    },
                    Ok(None) => {
                        debug!("TCP peer {} closed the connection", peer);
                        break;
                    }
                    Err(e) => {
                        warn!("TCP read from {} failed: {}", peer, e);
                        break;
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("TCP connection {} from {} closed", connection_id, peer);
    if events.send(TransportEvent::Closed { connection_id }).await.is_err() {
        debug!("Dispatcher gone, close of connection {} not delivered", connection_id);
    }
}

/// Drains the connection's outbound queue. Ends when every sender is
/// dropped or the socket fails.
async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::Receiver<Vec<u8>>, peer: SocketAddr) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &frame).await {
            debug!("TCP write to {} failed: {}", peer, e);
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_frame_round_trip() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        write_frame(&mut client, b"hello").await.unwrap();
        write_frame(&mut client, b"").await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server).await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(read_frame(&mut server).await.unwrap(), Some(Vec::new()));
        assert_eq!(read_frame(&mut server).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client
            .write_all(&((MAX_FRAME_SIZE + 1) as u32).to_be_bytes())
            .await
            .unwrap();

        let err = read_frame(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn test_truncated_frame_is_error() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&10u32.to_be_bytes()).await.unwrap();
        client.write_all(b"abc").await.unwrap();
        drop(client);

        assert!(read_frame(&mut server).await.is_err());
    }

    async fn accepted_pair() -> (TcpStream, TcpStream, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (server, peer) = listener.accept().await.unwrap();
        (client, server, peer)
    }

    #[tokio::test]
    async fn test_peer_close_reports_closed() {
        let (client, server, peer) = accepted_pair().await;
        let (events_tx, mut events) = mpsc::channel(4);
        let (_shutdown_tx, shutdown) = watch::channel(false);

        let task = tokio::spawn(handle_connection(server, peer, events_tx, shutdown));
        drop(client);

        let event = tokio::time::timeout(std::time::Duration::from_secs(1), events.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(TransportEvent::Closed { .. })));
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_close_without_dispatcher_still_ends_connection() {
        let (client, server, peer) = accepted_pair().await;
        let (events_tx, events) = mpsc::channel(4);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        drop(events);

        let task = tokio::spawn(handle_connection(server, peer, events_tx, shutdown));
        drop(client);

        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
