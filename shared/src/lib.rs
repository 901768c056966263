//! Types shared by the game server and its clients: gameplay constants,
//! kinematic math, level geometry, the state data model, the wire message
//! envelope and the binary codec.

pub mod codec;
pub mod collision;
pub mod kinematic;
pub mod messages;
pub mod state;

pub use codec::{decode, decode_payload, encode, encode_payload, CodecError};
pub use collision::{Rect, Space};
pub use kinematic::Vector2;
pub use messages::{Message, MessageType, Payload};
pub use state::{GameState, NpcState, PlayerState};

pub const PLAYER_SPEED: f64 = 350.0;
pub const PLAYER_JUMP_SPEED: f64 = 850.0;
pub const PLAYER_WIDTH: f64 = 64.0;
pub const PLAYER_HEIGHT: f64 = 64.0;
pub const PLAYER_STARTING_X: f64 = 640.0 - PLAYER_WIDTH / 2.0;
pub const PLAYER_STARTING_Y: f64 = 240.0 - PLAYER_HEIGHT / 2.0;
pub const PLAYER_GRAVITY_MULTIPLIER: f64 = 500.0;
pub const PLAYER_HITPOINTS: i16 = 100;

/// Full attack window: channel time plus cooldown, in seconds.
pub const PLAYER_ATTACK_DURATION: f64 = 0.6;
/// Time between the attack request and the hit registering.
pub const PLAYER_ATTACK_CHANNEL_TIME: f64 = 0.2;
pub const PLAYER_ATTACK_HITBOX_WIDTH: f64 = PLAYER_WIDTH;
pub const PLAYER_ATTACK_HITBOX_OFFSET: f64 = PLAYER_WIDTH / 2.0;
pub const PLAYER_ATTACK_DAMAGE: i16 = 30;

pub const NPC_SPEED: f64 = 100.0;
pub const NPC_WIDTH: f64 = 64.0;
pub const NPC_HEIGHT: f64 = 64.0;
pub const NPC_GRAVITY_MULTIPLIER: f64 = 500.0;
pub const NPC_HITPOINTS: i16 = 100;
/// Seconds between an NPC dying and reappearing at its spawn point.
pub const NPC_RESPAWN_TIME: f64 = 10.0;
/// Seconds a dead NPC stays visible before it is removed from updates.
pub const NPC_DEAD_LINGER_TIME: f64 = 2.0;
/// Aggro radius.
pub const NPC_LINE_OF_SIGHT: f64 = 320.0;
pub const NPC_ATTACK_RANGE: f64 = 48.0;

/// Largest per-input delta time the server accepts, in seconds.
pub const MAX_INPUT_DELTA_TIME: f64 = 0.25;

/// Timing and reach of a single attack variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttackSpec {
    pub duration: f64,
    pub channel_time: f64,
    pub hitbox_width: f64,
    pub hitbox_offset: f64,
    pub damage: i16,
}

pub const PLAYER_ATTACK: AttackSpec = AttackSpec {
    duration: PLAYER_ATTACK_DURATION,
    channel_time: PLAYER_ATTACK_CHANNEL_TIME,
    hitbox_width: PLAYER_ATTACK_HITBOX_WIDTH,
    hitbox_offset: PLAYER_ATTACK_HITBOX_OFFSET,
    damage: PLAYER_ATTACK_DAMAGE,
};

pub const NPC_ATTACK_1: AttackSpec = AttackSpec {
    duration: 1.4,
    channel_time: 0.7,
    hitbox_width: NPC_WIDTH,
    hitbox_offset: NPC_WIDTH / 2.0,
    damage: 30,
};

pub const NPC_ATTACK_2: AttackSpec = AttackSpec {
    duration: 1.0,
    channel_time: 0.4,
    hitbox_width: NPC_WIDTH,
    hitbox_offset: NPC_WIDTH / 2.0,
    damage: 20,
};

pub const NPC_ATTACK_3: AttackSpec = AttackSpec {
    duration: 1.8,
    channel_time: 1.0,
    hitbox_width: NPC_WIDTH * 1.5,
    hitbox_offset: NPC_WIDTH / 2.0,
    damage: 40,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attack_windows_are_consistent() {
        for spec in [PLAYER_ATTACK, NPC_ATTACK_1, NPC_ATTACK_2, NPC_ATTACK_3] {
            assert!(spec.duration > 0.0);
            assert!(spec.channel_time >= 0.0);
            assert!(spec.channel_time < spec.duration);
            assert!(spec.damage > 0);
        }
    }

    #[test]
    fn test_npc_attack_reaches_adjacent_player() {
        // A player standing at the edge of attack range must overlap the hitbox.
        let near_edge = NPC_ATTACK_RANGE - NPC_WIDTH / 2.0;
        for spec in [NPC_ATTACK_1, NPC_ATTACK_2, NPC_ATTACK_3] {
            assert!(near_edge < spec.hitbox_offset + spec.hitbox_width / 2.0);
        }
    }
}
