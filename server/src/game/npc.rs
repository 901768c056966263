//! NPC behaviour: perception, following, attacking, dying and respawning.

use super::animation;
use super::combat::{self, Combatant};
use super::physics::{self, Body, MotionInput, MotionParams};
use crate::workers::broadcast::BroadcastMessage;
use log::debug;
use rand::Rng;
use shared::messages::{ServerPlayerHit, ServerPlayerKill};
use shared::state::{NpcAttack, NpcMode};
use shared::{
    NpcState, PlayerState, Space, NPC_ATTACK_RANGE, NPC_DEAD_LINGER_TIME, NPC_GRAVITY_MULTIPLIER,
    NPC_HEIGHT, NPC_LINE_OF_SIGHT, NPC_RESPAWN_TIME, NPC_SPEED, NPC_WIDTH,
};
use std::collections::HashMap;

pub const NPC_MOTION: MotionParams = MotionParams {
    speed: NPC_SPEED,
    jump_speed: 0.0,
    gravity_multiplier: NPC_GRAVITY_MULTIPLIER,
    width: NPC_WIDTH,
    height: NPC_HEIGHT,
};

/// True if the NPC can currently perceive the player.
fn can_see(npc: &NpcState, player: &PlayerState, space: &Space) -> bool {
    if !player.is_alive() {
        return false;
    }
    let eye = npc.shape().center();
    let target = player.shape().center();
    eye.distance(&target) <= NPC_LINE_OF_SIGHT && space.line_of_sight(eye, target)
}

/// Nearest visible living player. Ties go to the lower client id.
fn find_target(npc: &NpcState, players: &HashMap<u32, PlayerState>, space: &Space) -> Option<u32> {
    let eye = npc.shape().center();
    players
        .iter()
        .filter(|(_, player)| can_see(npc, player, space))
        .map(|(id, player)| (eye.distance(&player.shape().center()), *id))
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, id)| id)
}

/// Switches between Idle and Follow based on what the NPC can see.
fn perceive(npc_id: u32, npc: &mut NpcState, players: &HashMap<u32, PlayerState>, space: &Space) {
    if npc.mode == NpcMode::Follow {
        let visible = npc
            .follow_target
            .and_then(|id| players.get(&id))
            .map_or(false, |player| can_see(npc, player, space));
        if !visible {
            debug!("NPC {} lost {:?}", npc_id, npc.follow_target);
            npc.mode = NpcMode::Idle;
            npc.follow_target = None;
        }
    }

    if npc.mode == NpcMode::Idle {
        if let Some(target) = find_target(npc, players, space) {
            debug!("NPC {} following client {}", npc_id, target);
            npc.mode = NpcMode::Follow;
            npc.follow_target = Some(target);
        }
    }
}

fn kill(npc: &mut NpcState) {
    npc.hitpoints = 0;
    npc.attack_state().cancel();
    npc.mode = NpcMode::Idle;
    npc.follow_target = None;
    npc.is_in_attack_range = false;
    npc.velocity.x = 0.0;
    npc.respawn_time_left = NPC_RESPAWN_TIME;
}

/// Applies a player's blow. Returns true if it killed the NPC.
pub fn take_hit(npc: &mut NpcState, damage: i16) -> bool {
    if !npc.is_alive() {
        return false;
    }
    let fatal = combat::apply_damage(&mut npc.hitpoints, damage);
    if fatal {
        kill(npc);
    }
    fatal
}

fn update_dead(npc: &mut NpcState, dt: f64, space: &Space) {
    npc.respawn_time_left -= dt;

    if npc.respawn_time_left <= 0.0 {
        npc.respawn();
        return;
    }

    if npc.exists && npc.respawn_time_left <= NPC_RESPAWN_TIME - NPC_DEAD_LINGER_TIME {
        npc.exists = false;
    }

    if npc.exists {
        physics::step(
            Body {
                position: &mut npc.position,
                velocity: &mut npc.velocity,
                is_on_ground: &mut npc.is_on_ground,
            },
            &NPC_MOTION,
            MotionInput::default(),
            dt,
            space,
        );
    }
    animation::update_npc(npc, false);
}

/// Advances one NPC by one tick.
pub fn update<R: Rng>(
    npc_id: u32,
    npc: &mut NpcState,
    players: &mut HashMap<u32, PlayerState>,
    space: &Space,
    rng: &mut R,
    dt: f64,
    events: &mut Vec<BroadcastMessage>,
) {
    if !npc.is_alive() {
        update_dead(npc, dt, space);
        return;
    }

    perceive(npc_id, npc, players, space);

    let mut input_x = 0.0;
    let mut restarted = false;
    npc.is_in_attack_range = false;

    let target = match npc.mode {
        NpcMode::Follow => npc.follow_target.and_then(|id| players.get(&id)),
        NpcMode::Idle => None,
    };
    if let Some(target) = target {
        let dx = target.position.x - npc.position.x;
        let shape = npc.shape();
        let target_shape = target.shape();
        let vertical_overlap =
            shape.bottom() < target_shape.top() && target_shape.bottom() < shape.top();
        npc.is_in_attack_range = dx.abs() <= NPC_ATTACK_RANGE && vertical_overlap;

        if !npc.is_attacking {
            if npc.is_in_attack_range {
                npc.current_attack = NpcAttack::ALL[rng.gen_range(0..NpcAttack::ALL.len())];
                npc.animation_flip = dx < 0.0;
                let spec = npc.current_attack.spec();
                npc.attack_state().start(&spec);
                restarted = true;
            } else if dt > 0.0 {
                // never step past the target
                input_x = (dx / (NPC_SPEED * dt)).clamp(-1.0, 1.0);
            }
        }
    }

    let spec = npc.current_attack.spec();
    if npc.attack_state().advance(dt, &spec) {
        let hitbox = combat::hitbox(&npc.shape(), npc.animation_flip, &spec);
        let mut victims: Vec<u32> = players
            .iter()
            .filter(|(_, player)| player.is_alive() && hitbox.intersects(&player.shape()))
            .map(|(id, _)| *id)
            .collect();
        victims.sort_unstable();

        for client_id in victims {
            if let Some(player) = players.get_mut(&client_id) {
                events.push(BroadcastMessage::PlayerHit(ServerPlayerHit {
                    client_id,
                    npc_id,
                    damage: spec.damage,
                }));
                if combat::apply_damage(&mut player.hitpoints, spec.damage) {
                    player.attack_state().cancel();
                    player.velocity.x = 0.0;
                    events.push(BroadcastMessage::PlayerKill(ServerPlayerKill { client_id, npc_id }));
                }
            }
        }
    }

    physics::step(
        Body {
            position: &mut npc.position,
            velocity: &mut npc.velocity,
            is_on_ground: &mut npc.is_on_ground,
        },
        &NPC_MOTION,
        MotionInput {
            x: input_x,
            jump: false,
        },
        dt,
        space,
    );
    animation::update_npc(npc, restarted);
}
