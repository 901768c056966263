//! The authoritative world: game state plus the rules that advance it.

use super::animation;
use super::combat::{self, Combatant};
use super::npc;
use super::physics::{self, Body, MotionInput, MotionParams};
use crate::workers::broadcast::BroadcastMessage;
use log::info;
use rand::rngs::StdRng;
use shared::messages::{
    ClientPlayerUpdate, ServerNpcHit, ServerNpcKill, ServerPlayerConnect, ServerPlayerDisconnect,
};
use shared::{
    GameState, NpcState, PlayerState, Space, Vector2, MAX_INPUT_DELTA_TIME, PLAYER_ATTACK,
    PLAYER_GRAVITY_MULTIPLIER, PLAYER_HEIGHT, PLAYER_HITPOINTS, PLAYER_JUMP_SPEED, PLAYER_SPEED,
    PLAYER_WIDTH,
};
use thiserror::Error;

pub const PLAYER_MOTION: MotionParams = MotionParams {
    speed: PLAYER_SPEED,
    jump_speed: PLAYER_JUMP_SPEED,
    gravity_multiplier: PLAYER_GRAVITY_MULTIPLIER,
    width: PLAYER_WIDTH,
    height: PLAYER_HEIGHT,
};

#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("no player for client {0}")]
    UnknownPlayer(u32),
    #[error("delta time {0} out of range")]
    InvalidDeltaTime(f64),
    #[error("non-finite movement input")]
    InvalidAxis,
}

pub struct World {
    state: GameState,
    space: Space,
    rng: StdRng,
    next_npc_id: u32,
    events: Vec<BroadcastMessage>,
}

impl World {
    pub fn new(space: Space, rng: StdRng) -> Self {
        World {
            state: GameState::new(),
            space,
            rng,
            next_npc_id: 1,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn space(&self) -> &Space {
        &self.space
    }

    pub fn player(&self, client_id: u32) -> Option<&PlayerState> {
        self.state.players.get(&client_id)
    }

    pub fn npc(&self, npc_id: u32) -> Option<&NpcState> {
        self.state.npcs.get(&npc_id)
    }

    pub fn spawn_npc(&mut self, position: Vector2) -> u32 {
        let npc_id = self.next_npc_id;
        self.next_npc_id += 1;
        self.state.npcs.insert(npc_id, NpcState::new(position));
        npc_id
    }

    pub fn set_timestamp(&mut self, timestamp: i64) {
        self.state.timestamp = timestamp;
    }

    /// Events produced since the last call, in the order they happened.
    pub fn take_events(&mut self) -> Vec<BroadcastMessage> {
        std::mem::take(&mut self.events)
    }

    pub fn connect_player(&mut self, client_id: u32, player: PlayerState) {
        info!(
            "Player {} ({}) joined at ({:.1}, {:.1})",
            client_id, player.name, player.position.x, player.position.y
        );
        self.events
            .push(BroadcastMessage::PlayerConnect(ServerPlayerConnect {
                client_id,
                player_state: player.clone(),
            }));
        self.state.players.insert(client_id, player);
    }

    /// Removes a player, returning their final state for saving.
    pub fn disconnect_player(&mut self, client_id: u32) -> Option<PlayerState> {
        let player = self.state.players.remove(&client_id)?;
        info!("Player {} ({}) left", client_id, player.name);
        self.events
            .push(BroadcastMessage::PlayerDisconnect(ServerPlayerDisconnect { client_id }));
        Some(player)
    }

    /// Applies one input. Returns `Ok(false)` if it was stale and ignored.
    ///
    /// Inputs are applied in delivery order; anything not newer than the
    /// player's watermark is dropped, so a late datagram can never rewind
    /// or replay movement.
    pub fn apply_input(
        &mut self,
        client_id: u32,
        input: &ClientPlayerUpdate,
    ) -> Result<bool, InputError> {
        let dt = input.delta_time;
        if !dt.is_finite() || !(0.0..=MAX_INPUT_DELTA_TIME).contains(&dt) {
            return Err(InputError::InvalidDeltaTime(dt));
        }
        if !input.input_x.is_finite() || !input.input_y.is_finite() {
            return Err(InputError::InvalidAxis);
        }

        let GameState { players, npcs, .. } = &mut self.state;
        let player = players
            .get_mut(&client_id)
            .ok_or(InputError::UnknownPlayer(client_id))?;

        if input.timestamp <= player.last_processed_timestamp {
            return Ok(false);
        }
        player.last_processed_timestamp = input.timestamp;

        if !step_player(player, input, &self.space) {
            return Ok(true);
        }

        let hitbox = combat::hitbox(&player.shape(), player.animation_flip, &PLAYER_ATTACK);
        let mut targets: Vec<u32> = npcs
            .iter()
            .filter(|(_, npc)| npc.is_alive() && hitbox.intersects(&npc.shape()))
            .map(|(id, _)| *id)
            .collect();
        targets.sort_unstable();

        for npc_id in targets {
            if let Some(npc) = npcs.get_mut(&npc_id) {
                self.events.push(BroadcastMessage::NpcHit(ServerNpcHit {
                    npc_id,
                    client_id,
                    damage: PLAYER_ATTACK.damage,
                }));
                if npc::take_hit(npc, PLAYER_ATTACK.damage) {
                    info!("Client {} killed NPC {}", client_id, npc_id);
                    self.events
                        .push(BroadcastMessage::NpcKill(ServerNpcKill { npc_id, client_id }));
                }
            }
        }

        Ok(true)
    }

    /// Advances every NPC by `dt` seconds, in id order.
    pub fn update_npcs(&mut self, dt: f64) {
        let GameState { players, npcs, .. } = &mut self.state;
        let mut ids: Vec<u32> = npcs.keys().copied().collect();
        ids.sort_unstable();

        for npc_id in ids {
            if let Some(npc) = npcs.get_mut(&npc_id) {
                npc::update(
                    npc_id,
                    npc,
                    players,
                    &self.space,
                    &mut self.rng,
                    dt,
                    &mut self.events,
                );
            }
        }
    }
}

fn respawn_player(player: &mut PlayerState) {
    player.position = PlayerState::start_position();
    player.velocity = Vector2::ZERO;
    player.is_on_ground = false;
    player.attack_state().cancel();
    player.did_attack_hit = false;
    player.hitpoints = PLAYER_HITPOINTS;
}

/// Runs one input through the player's state machine. Returns true on the
/// step the player's attack lands.
fn step_player(player: &mut PlayerState, input: &ClientPlayerUpdate, space: &Space) -> bool {
    let dt = input.delta_time;
    let mut restarted = false;

    if player.is_alive() {
        if input.input_attack && !player.is_attacking {
            player.attack_state().start(&PLAYER_ATTACK);
            restarted = true;
        }
    } else if input.input_respawn {
        respawn_player(player);
    }

    let hit = player.attack_state().advance(dt, &PLAYER_ATTACK);

    let in_control = player.is_alive() && !player.is_attacking;
    let motion = MotionInput {
        x: if in_control { input.input_x } else { 0.0 },
        jump: in_control && input.input_jump,
    };
    physics::step(
        Body {
            position: &mut player.position,
            velocity: &mut player.velocity,
            is_on_ground: &mut player.is_on_ground,
        },
        &PLAYER_MOTION,
        motion,
        dt,
        space,
    );
    animation::update_player(player, restarted);

    hit
}
