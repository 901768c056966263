//! WebSocket transport for browser clients.
//!
//! Binary frames carry the same envelope as TCP. The socket is both the
//! reliable and the unreliable path, so WebSocket clients never need UDP.

use super::{ConnectionHandle, ConnectionKind, Origin, TransportEvent, OUTBOUND_QUEUE_CAPACITY};
use crate::error::ServerError;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::codec;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;

pub struct WebSocketTransport {
    listener: TcpListener,
}

impl WebSocketTransport {
    pub async fn bind(addr: &str) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                transport: "websocket",
                addr: addr.to_string(),
                source,
            })?;
        info!("WebSocket server listening on {}", addr);
        Ok(WebSocketTransport { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self, events: mpsc::Sender<TransportEvent>, mut shutdown: watch::Receiver<bool>) {
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
                        Err(e) => error!("Failed to accept WebSocket connection: {}", e),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("WebSocket server stopped");
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::Sender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let socket = match tokio_tungstenite::accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", peer, e);
            return;
        }
    };

    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
    let handle = ConnectionHandle::new(ConnectionKind::WebSocket, tx);
    let connection_id = handle.id();
    info!("WebSocket connection {} from {}", connection_id, peer);

    tokio::spawn(write_loop(sink, rx, peer));

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Binary(bytes))) => match codec::decode(&bytes) {
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
                    Some(Ok(WsMessage::Close(_))) | None => {
                        debug!("WebSocket peer {} closed the connection", peer);
                        break;
                    }
                    Some(Ok(WsMessage::Text(_))) => {
                        debug!("Ignoring text frame from {}", peer);
                    }
                    // ping/pong replies are handled by tungstenite
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("WebSocket read from {} failed: {}", peer, e);
                        break;
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("WebSocket connection {} from {} closed", connection_id, peer);
    if events.send(TransportEvent::Closed { connection_id }).await.is_err() {
        debug!("Dispatcher gone, close of connection {} not delivered", connection_id);
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocketStream<TcpStream>, WsMessage>,
    mut rx: mpsc::Receiver<Vec<u8>>,
    peer: SocketAddr,
) {
    while let Some(frame) = rx.recv().await {
        if let Err(e) = sink.send(WsMessage::Binary(frame)).await {
            debug!("WebSocket write to {} failed: {}", peer, e);
            break;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_close_without_dispatcher_still_ends_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (events_tx, events) = mpsc::channel(4);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        drop(events);

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            handle_connection(stream, peer, events_tx, shutdown).await;
        });
        let (mut client, _) = tokio_tungstenite::connect_async(url).await.unwrap();
        client.close(None).await.unwrap();

        timeout(Duration::from_secs(1), server).await.unwrap().unwrap();
    }
}
