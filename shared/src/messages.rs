//! The wire message envelope and every payload carried inside it.

use crate::codec::{self, CodecError};
use crate::state::{NpcState, PlayerState};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Closed set of message kinds. Discriminants are part of the wire format
/// and must never be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    ClientLogin = 1,
    ClientLogout = 2,
    ClientPing = 3,
    ClientSyncTime = 4,
    ClientPlayerUpdate = 5,

    ServerLoginSuccess = 64,
    ServerLoginFailure = 65,
    ServerPong = 66,
    ServerSyncTime = 67,
    ServerGameUpdate = 68,
    ServerPlayerUpdate = 69,
    ServerNpcUpdate = 70,
    ServerPlayerConnect = 71,
    ServerPlayerDisconnect = 72,
    ServerPlayerHit = 73,
    ServerPlayerKill = 74,
    ServerNpcHit = 75,
    ServerNpcKill = 76,
}

impl MessageType {
    pub fn is_client_message(self) -> bool {
        (self as u8) < 64
    }
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        let message_type = match value {
            1 => MessageType::ClientLogin,
            2 => MessageType::ClientLogout,
            3 => MessageType::ClientPing,
            4 => MessageType::ClientSyncTime,
            5 => MessageType::ClientPlayerUpdate,
            64 => MessageType::ServerLoginSuccess,
            65 => MessageType::ServerLoginFailure,
            66 => MessageType::ServerPong,
            67 => MessageType::ServerSyncTime,
            68 => MessageType::ServerGameUpdate,
            69 => MessageType::ServerPlayerUpdate,
            70 => MessageType::ServerNpcUpdate,
            71 => MessageType::ServerPlayerConnect,
            72 => MessageType::ServerPlayerDisconnect,
            73 => MessageType::ServerPlayerHit,
            74 => MessageType::ServerPlayerKill,
            75 => MessageType::ServerNpcHit,
            76 => MessageType::ServerNpcKill,
            other => return Err(CodecError::UnknownMessageType(other)),
        };
        Ok(message_type)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// The envelope every transport carries.
///
/// `client_id` is zero for server-origin messages and for anything sent
/// before the client has been assigned an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub client_id: u32,
    pub message_type: MessageType,
    pub payload: Vec<u8>,
}

impl Message {
    /// Builds a message by encoding a typed payload.
    pub fn new<P: Payload>(client_id: u32, payload: &P) -> Result<Self, CodecError> {
        Ok(Message {
            client_id,
            message_type: P::MESSAGE_TYPE,
            payload: codec::encode_payload(payload)?,
        })
    }

    /// A message whose type carries all the information.
    pub fn empty(client_id: u32, message_type: MessageType) -> Self {
        Message {
            client_id,
            message_type,
            payload: Vec::new(),
        }
    }

    /// Decodes the payload, checking it matches the declared type first.
    pub fn decode_payload<P: Payload>(&self) -> Result<P, CodecError> {
        if self.message_type != P::MESSAGE_TYPE {
            return Err(CodecError::UnexpectedMessageType {
                expected: P::MESSAGE_TYPE,
                actual: self.message_type,
            });
        }
        codec::decode_payload(&self.payload)
    }
}

/// A typed payload bound to exactly one [`MessageType`].
pub trait Payload: Serialize + DeserializeOwned {
    const MESSAGE_TYPE: MessageType;
}

macro_rules! payload {
    ($ty:ty => $message_type:ident) => {
        impl Payload for $ty {
            const MESSAGE_TYPE: MessageType = MessageType::$message_type;
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientLogin {
    pub token: String,
    pub character_id: i32,
}
payload!(ClientLogin => ClientLogin);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClientSyncTime {
    /// Client clock in unix milliseconds.
    pub timestamp: i64,
}
payload!(ClientSyncTime => ClientSyncTime);

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClientPlayerUpdate {
    pub timestamp: i64,
    /// Horizontal intent in `[-1, 1]`.
    pub input_x: f64,
    pub input_y: f64,
    pub input_jump: bool,
    pub input_attack: bool,
    pub input_respawn: bool,
    /// Seconds of simulation this input covers.
    pub delta_time: f64,
}
payload!(ClientPlayerUpdate => ClientPlayerUpdate);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLoginSuccess {
    pub client_id: u32,
}
payload!(ServerLoginSuccess => ServerLoginSuccess);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerLoginFailure {
    pub reason: String,
}
payload!(ServerLoginFailure => ServerLoginFailure);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSyncTime {
    /// Server clock in unix milliseconds when the reply was built.
    pub timestamp: i64,
    /// Echo of the client's request timestamp.
    pub client_timestamp: i64,
}
payload!(ServerSyncTime => ServerSyncTime);

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ServerGameUpdate {
    pub timestamp: i64,
    pub players: HashMap<u32, PlayerState>,
    pub npcs: HashMap<u32, NpcState>,
}
payload!(ServerGameUpdate => ServerGameUpdate);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerPlayerUpdate {
    pub timestamp: i64,
    pub client_id: u32,
    pub player_state: PlayerState,
}
payload!(ServerPlayerUpdate => ServerPlayerUpdate);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerNpcUpdate {
    pub timestamp: i64,
    pub npc_id: u32,
    pub npc_state: NpcState,
}
payload!(ServerNpcUpdate => ServerNpcUpdate);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerPlayerConnect {
    pub client_id: u32,
    pub player_state: PlayerState,
}
payload!(ServerPlayerConnect => ServerPlayerConnect);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPlayerDisconnect {
    pub client_id: u32,
}
payload!(ServerPlayerDisconnect => ServerPlayerDisconnect);

/// An NPC landed a hit on a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPlayerHit {
    pub client_id: u32,
    pub npc_id: u32,
    pub damage: i16,
}
payload!(ServerPlayerHit => ServerPlayerHit);

/// An NPC killed a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerPlayerKill {
    pub client_id: u32,
    pub npc_id: u32,
}
payload!(ServerPlayerKill => ServerPlayerKill);

/// A player landed a hit on an NPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerNpcHit {
    pub npc_id: u32,
    pub client_id: u32,
    pub damage: i16,
}
payload!(ServerNpcHit => ServerNpcHit);

/// A player killed an NPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerNpcKill {
    pub npc_id: u32,
    pub client_id: u32,
}
payload!(ServerNpcKill => ServerNpcKill);
