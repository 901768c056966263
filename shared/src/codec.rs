//! Binary wire codec.
//!
//! An envelope is serialized with a fixed bincode layout and the whole
//! thing is LZ4 compressed with the decompressed size prepended as a
//! little-endian `u32`. That size is checked before anything is allocated.

use crate::messages::{Message, MessageType};
use bincode::Options;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PROTOCOL_VERSION: u8 = 1;

/// Upper bound for a decompressed envelope.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Largest payload a single UDP datagram can carry.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

const SIZE_PREFIX_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("buffer too short to hold a message")]
    Truncated,
    #[error("declared message size {size} exceeds the limit")]
    TooLarge { size: usize },
    #[error("decompression failed: {0}")]
    Decompression(#[from] lz4_flex::block::DecompressError),
    #[error("malformed message: {0}")]
    Malformed(#[from] bincode::Error),
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u8),
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("expected {expected} payload, got {actual}")]
    UnexpectedMessageType {
        expected: MessageType,
        actual: MessageType,
    },
}

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    version: u8,
    client_id: u32,
    message_type: u8,
    payload: &'a [u8],
}

#[derive(Deserialize)]
struct Envelope {
    version: u8,
    client_id: u32,
    message_type: u8,
    payload: Vec<u8>,
}

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_MESSAGE_SIZE as u64)
        .with_little_endian()
        .with_fixint_encoding()
}

pub fn encode(message: &Message) -> Result<Vec<u8>, CodecError> {
    let envelope = EnvelopeRef {
        version: PROTOCOL_VERSION,
        client_id: message.client_id,
        message_type: message.message_type as u8,
        payload: &message.payload,
    };
    let raw = options().serialize(&envelope)?;
    Ok(lz4_flex::compress_prepend_size(&raw))
}

pub fn decode(bytes: &[u8]) -> Result<Message, CodecError> {
    if bytes.len() < SIZE_PREFIX_LEN {
        return Err(CodecError::Truncated);
    }

    let mut prefix = [0u8; SIZE_PREFIX_LEN];
    prefix.copy_from_slice(&bytes[..SIZE_PREFIX_LEN]);
    let size = u32::from_le_bytes(prefix) as usize;
    if size > MAX_MESSAGE_SIZE {
        return Err(CodecError::TooLarge { size });
    }

    let raw = lz4_flex::decompress(&bytes[SIZE_PREFIX_LEN..], size)?;
    let envelope: Envelope = options().deserialize(&raw)?;

    if envelope.version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion(envelope.version));
    }

    Ok(Message {
        client_id: envelope.client_id,
        message_type: MessageType::try_from(envelope.message_type)?,
        payload: envelope.payload,
    })
}

/// Serializes a payload body. Compression happens once, at envelope level.
pub fn encode_payload<T: Serialize>(payload: &T) -> Result<Vec<u8>, CodecError> {
    Ok(options().serialize(payload)?)
}

pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(options().deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinematic::Vector2;
    use crate::messages::{ClientPlayerUpdate, ServerGameUpdate};
    use crate::state::{GameState, NpcMode, NpcState, PlayerAnimation, PlayerState};

    fn sample_state() -> GameState {
        let mut state = GameState::new();
        state.timestamp = 1_700_000_000_123;

        let mut alice = PlayerState::new(11, "alice");
        alice.position = Vector2::new(123.25, 16.0);
        alice.velocity = Vector2::new(-350.0, 0.0);
        alice.is_on_ground = true;
        alice.animation = PlayerAnimation::Run;
        alice.animation_flip = true;
        alice.animation_sequence = 200;
        alice.last_processed_timestamp = 99;
        state.players.insert(4_000_000_001, alice);

        let mut bob = PlayerState::new(12, "bob");
        bob.is_attacking = true;
        bob.attack_time_left = 0.35;
        bob.hitpoints = 40;
        state.players.insert(7, bob);

        let mut npc = NpcState::new(Vector2::new(200.0, 16.0));
        npc.mode = NpcMode::Follow;
        npc.follow_target = Some(7);
        state.npcs.insert(1, npc);

        state
    }

    #[test]
    fn test_game_state_round_trip() {
        let state = sample_state();
        let bytes = encode_payload(&state).unwrap();
        let decoded: GameState = decode_payload(&bytes).unwrap();
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_envelope_round_trip() {
        let state = sample_state();
        let update = ServerGameUpdate {
            timestamp: state.timestamp,
            players: state.players.clone(),
            npcs: state.existing_npcs(),
        };
        let message = Message::new(0, &update).unwrap();

        let bytes = encode(&message).unwrap();
        let decoded = decode(&bytes).unwrap();

        assert_eq!(decoded, message);
        assert_eq!(decoded.decode_payload::<ServerGameUpdate>().unwrap(), update);
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let message = Message::empty(42, MessageType::ClientPing);
        let decoded = decode(&encode(&message).unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_truncated_buffers_rejected() {
        assert!(matches!(decode(&[]), Err(CodecError::Truncated)));
        assert!(matches!(decode(&[1, 0]), Err(CodecError::Truncated)));

        let message = Message::new(
            3,
            &ClientPlayerUpdate {
                timestamp: 5,
                input_x: 1.0,
                delta_time: 0.05,
                ..Default::default()
            },
        )
        .unwrap();
        let bytes = encode(&message).unwrap();
        for len in SIZE_PREFIX_LEN..bytes.len() {
            assert!(decode(&bytes[..len]).is_err(), "prefix of {len} bytes decoded");
        }
    }

    #[test]
    fn test_garbage_rejected() {
        let garbage: Vec<u8> = (0..64u32).map(|i| (i * 37 + 11) as u8).collect();
        assert!(decode(&garbage).is_err());
    }

    #[test]
    fn test_oversized_declaration_rejected() {
        let mut bytes = ((MAX_MESSAGE_SIZE + 1) as u32).to_le_bytes().to_vec();
        bytes.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::TooLarge { size }) if size == MAX_MESSAGE_SIZE + 1
        ));
    }

    #[test]
    fn test_unknown_type_and_version_rejected() {
        let raw = options()
            .serialize(&EnvelopeRef {
                version: PROTOCOL_VERSION,
                client_id: 1,
                message_type: 200,
                payload: &[],
            })
            .unwrap();
        let bytes = lz4_flex::compress_prepend_size(&raw);
        assert!(matches!(decode(&bytes), Err(CodecError::UnknownMessageType(200))));

        let raw = options()
            .serialize(&EnvelopeRef {
                version: PROTOCOL_VERSION + 1,
                client_id: 1,
                message_type: MessageType::ClientPing as u8,
                payload: &[],
            })
            .unwrap();
        let bytes = lz4_flex::compress_prepend_size(&raw);
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::UnsupportedVersion(v)) if v == PROTOCOL_VERSION + 1
        ));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode_payload(&5i64).unwrap();
        bytes.push(0);
        assert!(decode_payload::<i64>(&bytes).is_err());
    }
}
