//! The authoritative world data model.
//!
//! Everything here is plain data: the server owns and mutates it, clients
//! receive it through the codec. Collision shapes are derived from the
//! position on demand so they can never drift apart.

use crate::collision::Rect;
use crate::kinematic::Vector2;
use crate::{
    AttackSpec, NPC_ATTACK_1, NPC_ATTACK_2, NPC_ATTACK_3, NPC_HEIGHT, NPC_HITPOINTS, NPC_WIDTH,
    PLAYER_HEIGHT, PLAYER_HITPOINTS, PLAYER_STARTING_X, PLAYER_STARTING_Y, PLAYER_WIDTH,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlayerAnimation {
    #[default]
    Idle,
    Run,
    Jump,
    Fall,
    Attack,
    Dead,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NpcAnimation {
    #[default]
    Idle,
    Walk,
    Dead,
    Attack1,
    Attack2,
    Attack3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NpcMode {
    #[default]
    Idle,
    Follow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NpcAttack {
    #[default]
    Attack1,
    Attack2,
    Attack3,
}

impl NpcAttack {
    pub const ALL: [NpcAttack; 3] = [NpcAttack::Attack1, NpcAttack::Attack2, NpcAttack::Attack3];

    pub fn spec(self) -> AttackSpec {
        match self {
            NpcAttack::Attack1 => NPC_ATTACK_1,
            NpcAttack::Attack2 => NPC_ATTACK_2,
            NpcAttack::Attack3 => NPC_ATTACK_3,
        }
    }

    pub fn animation(self) -> NpcAnimation {
        match self {
            NpcAttack::Attack1 => NpcAnimation::Attack1,
            NpcAttack::Attack2 => NpcAnimation::Attack2,
            NpcAttack::Attack3 => NpcAnimation::Attack3,
        }
    }
}

/// Server-side state of a connected player's character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Timestamp of the most recent input applied to this player.
    pub last_processed_timestamp: i64,
    pub character_id: i32,
    pub name: String,
    pub position: Vector2,
    pub velocity: Vector2,
    pub is_on_ground: bool,
    pub is_attacking: bool,
    pub attack_time_left: f64,
    pub is_attack_hitting: bool,
    pub did_attack_hit: bool,
    pub animation: PlayerAnimation,
    pub animation_flip: bool,
    pub animation_sequence: u8,
    pub hitpoints: i16,
}

impl PlayerState {
    /// A fresh character standing at the start position with full hitpoints.
    pub fn new(character_id: i32, name: impl Into<String>) -> Self {
        PlayerState {
            last_processed_timestamp: 0,
            character_id,
            name: name.into(),
            position: Self::start_position(),
            velocity: Vector2::ZERO,
            is_on_ground: false,
            is_attacking: false,
            attack_time_left: 0.0,
            is_attack_hitting: false,
            did_attack_hit: false,
            animation: PlayerAnimation::Idle,
            animation_flip: false,
            animation_sequence: 0,
            hitpoints: PLAYER_HITPOINTS,
        }
    }

    pub fn start_position() -> Vector2 {
        Vector2::new(PLAYER_STARTING_X, PLAYER_STARTING_Y)
    }

    pub fn shape(&self) -> Rect {
        Rect::at(self.position, PLAYER_WIDTH, PLAYER_HEIGHT)
    }

    pub fn is_alive(&self) -> bool {
        self.hitpoints > 0
    }
}

/// Server-side state of a non-player character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NpcState {
    pub spawn_position: Vector2,
    pub position: Vector2,
    pub velocity: Vector2,
    pub is_on_ground: bool,
    pub mode: NpcMode,
    /// Client id of the player being followed. Resolved against the player
    /// map every tick; a missing entry means the target is gone.
    pub follow_target: Option<u32>,
    pub is_in_attack_range: bool,
    pub is_attacking: bool,
    pub current_attack: NpcAttack,
    pub attack_time_left: f64,
    pub is_attack_hitting: bool,
    pub did_attack_hit: bool,
    pub animation: NpcAnimation,
    pub animation_flip: bool,
    pub animation_sequence: u8,
    pub hitpoints: i16,
    /// Seconds until a dead NPC respawns. Zero while alive.
    pub respawn_time_left: f64,
    /// False while the NPC is dead and removed from the world.
    pub exists: bool,
}

impl NpcState {
    pub fn new(spawn_position: Vector2) -> Self {
        NpcState {
            spawn_position,
            position: spawn_position,
            velocity: Vector2::ZERO,
            is_on_ground: false,
            mode: NpcMode::Idle,
            follow_target: None,
            is_in_attack_range: false,
            is_attacking: false,
            current_attack: NpcAttack::Attack1,
            attack_time_left: 0.0,
            is_attack_hitting: false,
            did_attack_hit: false,
            animation: NpcAnimation::Idle,
            animation_flip: false,
            animation_sequence: 0,
            hitpoints: NPC_HITPOINTS,
            respawn_time_left: 0.0,
            exists: true,
        }
    }

    pub fn shape(&self) -> Rect {
        Rect::at(self.position, NPC_WIDTH, NPC_HEIGHT)
    }

    pub fn is_alive(&self) -> bool {
        self.exists && self.hitpoints > 0
    }

    /// Restores the NPC at its spawn point as if newly created, keeping
    /// the animation counter monotonic so clients notice the reset.
    pub fn respawn(&mut self) {
        let sequence = self.animation_sequence.wrapping_add(1);
        *self = NpcState::new(self.spawn_position);
        self.animation_sequence = sequence;
    }
}

/// Complete world state at one tick.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GameState {
    /// Unix milliseconds of the tick that produced this state.
    pub timestamp: i64,
    pub players: HashMap<u32, PlayerState>,
    pub npcs: HashMap<u32, NpcState>,
}

impl GameState {
    pub fn new() -> Self {
        GameState::default()
    }

    /// NPCs currently present in the world.
    pub fn existing_npcs(&self) -> HashMap<u32, NpcState> {
        self.npcs
            .iter()
            .filter(|(_, npc)| npc.exists)
            .map(|(id, npc)| (*id, npc.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_player_defaults() {
        let player = PlayerState::new(7, "alice");
        assert_eq!(player.character_id, 7);
        assert_eq!(player.name, "alice");
        assert_eq!(player.hitpoints, PLAYER_HITPOINTS);
        assert_eq!(player.position, PlayerState::start_position());
        assert_eq!(player.last_processed_timestamp, 0);
        assert!(player.is_alive());
    }

    #[test]
    fn test_shape_follows_position() {
        let mut player = PlayerState::new(1, "bob");
        player.position = Vector2::new(10.0, 20.0);
        let shape = player.shape();
        assert_eq!(shape.x, 10.0);
        assert_eq!(shape.y, 20.0);
        assert_eq!(shape.width, PLAYER_WIDTH);
        assert_eq!(shape.height, PLAYER_HEIGHT);
    }

    #[test]
    fn test_npc_respawn_resets_state() {
        let spawn = Vector2::new(200.0, 16.0);
        let mut npc = NpcState::new(spawn);
        npc.position = Vector2::new(500.0, 300.0);
        npc.hitpoints = 0;
        npc.exists = false;
        npc.mode = NpcMode::Follow;
        npc.follow_target = Some(42);
        npc.animation_sequence = 255;

        npc.respawn();

        assert_eq!(npc.position, spawn);
        assert_eq!(npc.hitpoints, NPC_HITPOINTS);
        assert!(npc.exists);
        assert_eq!(npc.mode, NpcMode::Idle);
        assert_eq!(npc.follow_target, None);
        assert_eq!(npc.animation_sequence, 0);
    }

    #[test]
    fn test_snapshot_is_deep_copy() {
        let mut state = GameState::new();
        state.players.insert(1, PlayerState::new(1, "carol"));
        let snapshot = state.clone();

        if let Some(player) = state.players.get_mut(&1) {
            player.position.x += 100.0;
        }

        assert_ne!(snapshot.players[&1].position, state.players[&1].position);
    }

    #[test]
    fn test_existing_npcs_skips_removed() {
        let mut state = GameState::new();
        state.npcs.insert(1, NpcState::new(Vector2::new(100.0, 16.0)));
        let mut gone = NpcState::new(Vector2::new(300.0, 16.0));
        gone.exists = false;
        state.npcs.insert(2, gone);

        let visible = state.existing_npcs();
        assert_eq!(visible.len(), 1);
        assert!(visible.contains_key(&1));
    }
}
