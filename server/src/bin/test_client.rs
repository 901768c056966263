use clap::Parser;
use server::network::tcp::{read_frame, write_frame};
use server::utils::unix_millis;
use shared::codec::{self, MAX_DATAGRAM_SIZE};
use shared::messages::{
    ClientLogin, ClientPlayerUpdate, ClientSyncTime, ServerGameUpdate, ServerLoginFailure,
    ServerLoginSuccess, ServerPlayerUpdate, ServerSyncTime,
};
use shared::{Message, MessageType};
use std::time::Duration;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{sleep, timeout};

/// Logs in over TCP, registers a UDP address, walks back and forth for a
/// few seconds and prints what the server reports.
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(long, default_value = "127.0.0.1")]
    host: String,
    #[clap(long, default_value = "8888")]
    tcp_port: u16,
    #[clap(long, default_value = "8889")]
    udp_port: u16,
    /// Login token; with dev auth this is the user id
    #[clap(long, default_value = "test-user")]
    token: String,
    #[clap(long, default_value = "1")]
    character_id: i32,
    /// Number of inputs to send, one every 50ms
    #[clap(long, default_value = "100")]
    inputs: u32,
}

async fn send(stream: &mut TcpStream, message: &Message) -> Result<(), Box<dyn std::error::Error>> {
    write_frame(stream, &codec::encode(message)?).await?;
    Ok(())
}

async fn receive(stream: &mut TcpStream) -> Result<Message, Box<dyn std::error::Error>> {
    match read_frame(stream).await? {
        Some(frame) => Ok(codec::decode(&frame)?),
        None => Err("server closed the connection".into()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let tcp_addr = format!("{}:{}", args.host, args.tcp_port);
    let udp_addr = format!("{}:{}", args.host, args.udp_port);

    let mut stream = TcpStream::connect(&tcp_addr).await?;
    println!("Connected to {}", tcp_addr);

    let login = ClientLogin {
        token: args.token.clone(),
        character_id: args.character_id,
    };
    send(&mut stream, &Message::new(0, &login)?).await?;

    let reply = receive(&mut stream).await?;
    let client_id = match reply.message_type {
        MessageType::ServerLoginSuccess => reply.decode_payload::<ServerLoginSuccess>()?.client_id,
        MessageType::ServerLoginFailure => {
            let failure: ServerLoginFailure = reply.decode_payload()?;
            println!("Login failed: {}", failure.reason);
            return Ok(());
        }
        other => return Err(format!("unexpected reply {}", other).into()),
    };
    println!("Logged in as client {}", client_id);

    let sync = ClientSyncTime {
        timestamp: unix_millis(),
    };
    send(&mut stream, &Message::new(client_id, &sync)?).await?;

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&udp_addr).await?;
    socket
        .send(&codec::encode(&Message::empty(client_id, MessageType::ClientPing))?)
        .await?;

    let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
    match timeout(Duration::from_secs(2), socket.recv(&mut buffer)).await {
        Ok(Ok(len)) => println!("UDP reply: {}", codec::decode(&buffer[..len])?.message_type),
        _ => println!("No UDP reply; updates will not arrive"),
    }

    for i in 0..args.inputs {
        let input = ClientPlayerUpdate {
            timestamp: unix_millis(),
            input_x: if (i / 20) % 2 == 0 { 1.0 } else { -1.0 },
            input_jump: i % 40 == 10,
            input_attack: i % 30 == 25,
            delta_time: 0.05,
            ..Default::default()
        };
        socket
            .send(&codec::encode(&Message::new(client_id, &input)?)?)
            .await?;

        while let Ok(len) = socket.try_recv(&mut buffer) {
            let message = codec::decode(&buffer[..len])?;
            match message.message_type {
                MessageType::ServerPlayerUpdate => {
                    let update: ServerPlayerUpdate = message.decode_payload()?;
                    if update.client_id == client_id {
                        let p = update.player_state.position;
                        println!("  me: ({:.1}, {:.1}) {:?}", p.x, p.y, update.player_state.animation);
                    }
                }
                MessageType::ServerGameUpdate => {
                    let update: ServerGameUpdate = message.decode_payload()?;
                    println!(
                        "Game update at {}: {} players, {} npcs",
                        update.timestamp,
                        update.players.len(),
                        update.npcs.len()
                    );
                }
                _ => {}
            }
        }

        sleep(Duration::from_millis(50)).await;
    }

    // Reliable traffic (time sync, hits, joins) queued up meanwhile.
    while let Ok(Ok(message)) = timeout(Duration::from_millis(100), receive(&mut stream)).await {
        if message.message_type == MessageType::ServerSyncTime {
            let sync: ServerSyncTime = message.decode_payload()?;
            println!(
                "Clock offset ~{} ms",
                sync.timestamp - (sync.client_timestamp + unix_millis()) / 2
            );
        } else {
            println!("Reliable: {}", message.message_type);
        }
    }

    send(&mut stream, &Message::empty(client_id, MessageType::ClientLogout)).await?;
    println!("Test client finished");
    Ok(())
}
