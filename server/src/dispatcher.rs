//! Protocol dispatcher: the only place that interprets client messages
//! before they reach the simulation.
//!
//! Session traffic (login, logout, time sync, pings) is answered here.
//! Gameplay messages from logged-in clients are queued for the next tick.

use crate::auth::TokenVerifier;
use crate::client_manager::ClientManager;
use crate::network::{ConnectionHandle, ConnectionId, Origin, TransportEvent};
use crate::utils::unix_millis;
use log::{debug, error, info, warn};
use shared::messages::{
    ClientLogin, ClientSyncTime, ServerLoginFailure, ServerLoginSuccess, ServerSyncTime,
};
use shared::{codec, Message, MessageType, Payload};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, RwLock};

pub struct Dispatcher {
    clients: Arc<RwLock<ClientManager>>,
    auth: Arc<dyn TokenVerifier>,
    udp: Arc<UdpSocket>,
    inbound: mpsc::Sender<Message>,
}

impl Dispatcher {
    pub fn new(
        clients: Arc<RwLock<ClientManager>>,
        auth: Arc<dyn TokenVerifier>,
        udp: Arc<UdpSocket>,
        inbound: mpsc::Sender<Message>,
    ) -> Self {
        Dispatcher {
            clients,
            auth,
            udp,
            inbound,
        }
    }

    pub async fn run(
        self,
        mut events: mpsc::Receiver<TransportEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                _ = shutdown.changed() => break,
            }
        }
        info!("Dispatcher stopped");
    }

    pub async fn handle(&self, event: TransportEvent) {
        match event {
            TransportEvent::Message {
                origin: Origin::Connection(handle),
                message,
            } => self.handle_connection_message(handle, message).await,
            TransportEvent::Message {
                origin: Origin::Datagram(addr),
                message,
            } => self.handle_datagram(addr, message).await,
            TransportEvent::Ping { client_id, addr } => self.handle_ping(client_id, addr).await,
            TransportEvent::Closed { connection_id } => self.handle_closed(connection_id).await,
        }
    }

    async fn handle_connection_message(&self, handle: ConnectionHandle, message: Message) {
        let bound = self
            .clients
            .read()
            .await
            .client_id_by_connection(handle.id());

        if message.message_type == MessageType::ClientLogin {
            self.login(&handle, bound, &message).await;
            return;
        }

        let Some(client_id) = bound else {
            warn!(
                "Dropping {} from connection {} before login",
                message.message_type,
                handle.id()
            );
            return;
        };
        if message.client_id != client_id {
            warn!(
                "Connection {} bound to client {} sent {} as client {}",
                handle.id(),
                client_id,
                message.message_type,
                message.client_id
            );
            return;
        }

        match message.message_type {
            MessageType::ClientLogout => {
                info!("Client {} logged out", client_id);
                self.clients.write().await.disconnect_client(client_id);
            }
            MessageType::ClientSyncTime => match message.decode_payload::<ClientSyncTime>() {
                Ok(request) => {
                    let reply = ServerSyncTime {
                        timestamp: unix_millis(),
                        client_timestamp: request.timestamp,
                    };
                    reply_to(&handle, &reply);
                }
                Err(e) => warn!("Malformed time sync from client {}: {}", client_id, e),
            },
            MessageType::ClientPing => {
                handle.send_message(&Message::empty(0, MessageType::ServerPong));
            }
            message_type if message_type.is_client_message() => self.forward(message),
            message_type => warn!("Client {} sent server message {}", client_id, message_type),
        }
    }

    async fn login(&self, handle: &ConnectionHandle, bound: Option<u32>, message: &Message) {
        if message.client_id != 0 {
            reply_failure(handle, "login must not carry a client id");
            return;
        }
        if let Some(client_id) = bound {
            reply_failure(handle, &format!("already logged in as client {}", client_id));
            return;
        }

        let login = match message.decode_payload::<ClientLogin>() {
            Ok(login) => login,
            Err(e) => {
                warn!("Malformed login on connection {}: {}", handle.id(), e);
                reply_failure(handle, "malformed login");
                return;
            }
        };

        let user_id = match self.auth.verify_token(&login.token).await {
            Ok(user_id) => user_id,
            Err(e) => {
                info!("Login rejected on connection {}: {}", handle.id(), e);
                reply_failure(handle, &e.to_string());
                return;
            }
        };

        let result = self
            .clients
            .write()
            .await
            .connect_client(handle.clone(), user_id, login.character_id);
        match result {
            Ok(client_id) => reply_to(handle, &ServerLoginSuccess { client_id }),
            Err(e) => {
                info!("Login refused on connection {}: {}", handle.id(), e);
                reply_failure(handle, &e.to_string());
            }
        }
    }

    async fn handle_datagram(&self, addr: SocketAddr, message: Message) {
        if !self.clients.read().await.owns_udp_address(message.client_id, addr) {
            debug!(
                "Dropping {} for client {} from unbound address {}",
                message.message_type, message.client_id, addr
            );
            return;
        }
        if message.message_type != MessageType::ClientPlayerUpdate {
            debug!("Dropping {} datagram from {}", message.message_type, addr);
            return;
        }
        self.forward(message);
    }

    async fn handle_ping(&self, client_id: u32, addr: SocketAddr) {
        {
            let mut clients = self.clients.write().await;
            if !clients.exists(client_id) {
                debug!("Ping from unknown client {} at {}", client_id, addr);
                return;
            }
            clients.set_udp_address(client_id, addr);
            if !clients.owns_udp_address(client_id, addr) {
                return;
            }
        }

        match codec::encode(&Message::empty(0, MessageType::ServerPong)) {
            Ok(bytes) => {
                if let Err(e) = self.udp.send_to(&bytes, addr).await {
                    warn!("Failed to send pong to {}: {}", addr, e);
                }
            }
            Err(e) => error!("Failed to encode pong: {}", e),
        }
    }

    async fn handle_closed(&self, connection_id: ConnectionId) {
        let mut clients = self.clients.write().await;
        if let Some(client_id) = clients.client_id_by_connection(connection_id) {
            clients.disconnect_client(client_id);
        }
    }

    fn forward(&self, message: Message) {
        match self.inbound.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(message)) => warn!(
                "Inbound queue full, dropping {} from client {}",
                message.message_type, message.client_id
            ),
            Err(TrySendError::Closed(_)) => debug!("Simulation gone, dropping message"),
        }
    }
}

fn reply_to<P: Payload>(handle: &ConnectionHandle, payload: &P) {
    match Message::new(0, payload) {
        Ok(message) => {
            handle.send_message(&message);
        }
        Err(e) => error!("Failed to encode {}: {}", P::MESSAGE_TYPE, e),
    }
}

fn reply_failure(handle: &ConnectionHandle, reason: &str) {
    reply_to(
        handle,
        &ServerLoginFailure {
            reason: reason.to_string(),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticTokenVerifier;
    use crate::client_manager::ConnectionEvent;
    use crate::network::ConnectionKind;
    use shared::messages::ClientPlayerUpdate;
    use shared::codec::MAX_DATAGRAM_SIZE;
    use std::time::Duration;
    use tokio::time::timeout;

    struct Harness {
        dispatcher: Dispatcher,
        clients: Arc<RwLock<ClientManager>>,
        inbound: mpsc::Receiver<Message>,
        connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    }

    async fn harness() -> Harness {
        let (events_tx, connection_events) = mpsc::unbounded_channel();
        let clients = Arc::new(RwLock::new(ClientManager::new(None, events_tx)));
        let auth = Arc::new(StaticTokenVerifier::new([
            ("token-a", "alice"),
            ("token-a2", "alice"),
            ("token-b", "bob"),
        ]));
        let udp = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let (inbound_tx, inbound) = mpsc::channel(2);
        Harness {
            dispatcher: Dispatcher::new(Arc::clone(&clients), auth, udp, inbound_tx),
            clients,
            inbound,
            connection_events,
        }
    }

    fn connection() -> (ConnectionHandle, mpsc::Receiver<Vec<u8>>) {
        let (tx, rx) = mpsc::channel(8);
        (ConnectionHandle::new(ConnectionKind::TcpUdp, tx), rx)
    }

    fn on(handle: &ConnectionHandle, message: Message) -> TransportEvent {
        TransportEvent::Message {
            origin: Origin::Connection(handle.clone()),
            message,
        }
    }

    fn login(token: &str) -> Message {
        Message::new(
            0,
            &ClientLogin {
                token: token.to_string(),
                character_id: 1,
            },
        )
        .unwrap()
    }

    fn received(rx: &mut mpsc::Receiver<Vec<u8>>) -> Message {
        codec::decode(&rx.try_recv().unwrap()).unwrap()
    }

    async fn logged_in(h: &Harness, token: &str) -> (ConnectionHandle, mpsc::Receiver<Vec<u8>>, u32) {
        let (handle, mut rx) = connection();
        h.dispatcher.handle(on(&handle, login(token))).await;
        let reply = received(&mut rx);
        let success: ServerLoginSuccess = reply.decode_payload().unwrap();
        (handle, rx, success.client_id)
    }

    #[tokio::test]
    async fn test_login_success() {
        let mut h = harness().await;
        let (_handle, _rx, client_id) = logged_in(&h, "token-a").await;

        assert_ne!(client_id, 0);
        assert!(h.clients.read().await.exists(client_id));
        assert!(matches!(
            h.connection_events.try_recv(),
            Ok(ConnectionEvent::Connect { user_id, .. }) if user_id == "alice"
        ));
    }

    #[tokio::test]
    async fn test_bad_token_registers_nothing() {
        let h = harness().await;
        let (handle, mut rx) = connection();
        h.dispatcher.handle(on(&handle, login("nope"))).await;

        let reply = received(&mut rx);
        assert_eq!(reply.message_type, MessageType::ServerLoginFailure);
        assert!(h.clients.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_user_rejected() {
        let h = harness().await;
        logged_in(&h, "token-a").await;

        let (handle, mut rx) = connection();
        h.dispatcher.handle(on(&handle, login("token-a2"))).await;

        let failure: ServerLoginFailure = received(&mut rx).decode_payload().unwrap();
        assert!(failure.reason.contains("alice"));
        assert_eq!(h.clients.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_second_login_on_same_connection_rejected() {
        let h = harness().await;
        let (handle, mut rx, _) = logged_in(&h, "token-a").await;

        h.dispatcher.handle(on(&handle, login("token-b"))).await;
        assert_eq!(received(&mut rx).message_type, MessageType::ServerLoginFailure);
        assert_eq!(h.clients.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_gameplay_requires_login_and_matching_id() {
        let mut h = harness().await;
        let (anonymous, _anon_rx) = connection();
        let input = Message::new(5, &ClientPlayerUpdate::default()).unwrap();
        h.dispatcher.handle(on(&anonymous, input)).await;
        assert!(h.inbound.try_recv().is_err());

        let (handle, _rx, client_id) = logged_in(&h, "token-a").await;
        let spoofed = Message::new(client_id.wrapping_add(1), &ClientPlayerUpdate::default()).unwrap();
        h.dispatcher.handle(on(&handle, spoofed)).await;
        assert!(h.inbound.try_recv().is_err());

        let genuine = Message::new(client_id, &ClientPlayerUpdate::default()).unwrap();
        h.dispatcher.handle(on(&handle, genuine.clone())).await;
        assert_eq!(h.inbound.try_recv().unwrap(), genuine);
    }

    #[tokio::test]
    async fn test_full_inbound_queue_drops() {
        let mut h = harness().await;
        let (handle, _rx, client_id) = logged_in(&h, "token-a").await;

        for timestamp in 1..=3 {
            let update = ClientPlayerUpdate {
                timestamp,
                ..Default::default()
            };
            let message = Message::new(client_id, &update).unwrap();
            h.dispatcher.handle(on(&handle, message)).await;
        }

        assert!(h.inbound.try_recv().is_ok());
        assert!(h.inbound.try_recv().is_ok());
        assert!(h.inbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_time_sync_echoes_client_timestamp() {
        let h = harness().await;
        let (handle, mut rx, client_id) = logged_in(&h, "token-a").await;

        let request = Message::new(client_id, &ClientSyncTime { timestamp: 1234 }).unwrap();
        let before = unix_millis();
        h.dispatcher.handle(on(&handle, request)).await;

        let reply: ServerSyncTime = received(&mut rx).decode_payload().unwrap();
        assert_eq!(reply.client_timestamp, 1234);
        assert!(reply.timestamp >= before);
    }

    #[tokio::test]
    async fn test_udp_ping_is_idempotent() {
        let h = harness().await;
        let (_handle, _rx, client_id) = logged_in(&h, "token-a").await;
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = peer.local_addr().unwrap();
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        for _ in 0..2 {
            h.dispatcher
                .handle(TransportEvent::Ping { client_id, addr })
                .await;
            let (len, _) = timeout(Duration::from_secs(1), peer.recv_from(&mut buffer))
                .await
                .unwrap()
                .unwrap();
            let pong = codec::decode(&buffer[..len]).unwrap();
            assert_eq!(pong.message_type, MessageType::ServerPong);
        }

        let mut clients = h.clients.write().await;
        assert_eq!(clients.client(client_id).unwrap().udp_address, Some(addr));
        assert!(!clients.set_udp_address(client_id, addr));
    }

    fn datagram(addr: SocketAddr, message: Message) -> TransportEvent {
        TransportEvent::Message {
            origin: Origin::Datagram(addr),
            message,
        }
    }

    #[tokio::test]
    async fn test_datagrams_need_a_bound_address() {
        let mut h = harness().await;
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = peer.local_addr().unwrap();
        let input = Message::new(77, &ClientPlayerUpdate::default()).unwrap();
        h.dispatcher.handle(datagram(addr, input)).await;
        assert!(h.inbound.try_recv().is_err());

        let (_handle, _rx, client_id) = logged_in(&h, "token-b").await;
        let input = Message::new(client_id, &ClientPlayerUpdate::default()).unwrap();
        h.dispatcher.handle(datagram(addr, input.clone())).await;
        assert!(h.inbound.try_recv().is_err());

        h.dispatcher
            .handle(TransportEvent::Ping { client_id, addr })
            .await;
        h.dispatcher.handle(datagram(addr, input)).await;
        assert!(h.inbound.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_foreign_ping_cannot_take_over_udp_stream() {
        let mut h = harness().await;
        let (_handle, _rx, alice) = logged_in(&h, "token-a").await;
        let owner = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let intruder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let owner_addr = owner.local_addr().unwrap();
        let intruder_addr = intruder.local_addr().unwrap();
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        h.dispatcher
            .handle(TransportEvent::Ping {
                client_id: alice,
                addr: owner_addr,
            })
            .await;
        timeout(Duration::from_secs(1), owner.recv_from(&mut buffer))
            .await
            .unwrap()
            .unwrap();

        h.dispatcher
            .handle(TransportEvent::Ping {
                client_id: alice,
                addr: intruder_addr,
            })
            .await;
        assert!(timeout(Duration::from_millis(100), intruder.recv_from(&mut buffer))
            .await
            .is_err());
        assert_eq!(
            h.clients.read().await.client(alice).unwrap().udp_address,
            Some(owner_addr)
        );

        let forged = Message::new(alice, &ClientPlayerUpdate::default()).unwrap();
        h.dispatcher.handle(datagram(intruder_addr, forged.clone())).await;
        let elsewhere: SocketAddr = "10.9.9.9:1".parse().unwrap();
        h.dispatcher.handle(datagram(elsewhere, forged.clone())).await;
        assert!(h.inbound.try_recv().is_err());

        h.dispatcher.handle(datagram(owner_addr, forged.clone())).await;
        assert_eq!(h.inbound.try_recv().unwrap(), forged);
    }

    #[tokio::test]
    async fn test_close_and_logout_disconnect() {
        let h = harness().await;
        let (handle_a, _rx_a, a) = logged_in(&h, "token-a").await;
        let (handle_b, _rx_b, b) = logged_in(&h, "token-b").await;

        h.dispatcher
            .handle(TransportEvent::Closed {
                connection_id: handle_a.id(),
            })
            .await;
        assert!(!h.clients.read().await.exists(a));

        h.dispatcher
            .handle(on(&handle_b, Message::empty(b, MessageType::ClientLogout)))
            .await;
        assert!(h.clients.read().await.is_empty());
    }
}
