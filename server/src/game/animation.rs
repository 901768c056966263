//! Animation selection from gameplay flags.

use shared::state::{NpcAnimation, PlayerAnimation};
use shared::{NpcState, PlayerState};

/// Sets the animation, bumping the wrapping sequence counter when it
/// changes or when the same animation starts over.
fn transition<A: PartialEq + Copy>(current: &mut A, sequence: &mut u8, next: A, restarted: bool) {
    if *current != next || restarted {
        *sequence = sequence.wrapping_add(1);
    }
    *current = next;
}

fn face(flip: &mut bool, vx: f64) {
    if vx < 0.0 {
        *flip = true;
    } else if vx > 0.0 {
        *flip = false;
    }
}

pub fn update_player(player: &mut PlayerState, attack_restarted: bool) {
    let next = if !player.is_alive() {
        PlayerAnimation::Dead
    } else if player.is_attacking {
        PlayerAnimation::Attack
    } else if !player.is_on_ground {
        if player.velocity.y > 0.0 {
            PlayerAnimation::Jump
        } else {
            PlayerAnimation::Fall
        }
    } else if player.velocity.x != 0.0 {
        PlayerAnimation::Run
    } else {
        PlayerAnimation::Idle
    };

    if player.is_alive() && !player.is_attacking {
        face(&mut player.animation_flip, player.velocity.x);
    }
    transition(
        &mut player.animation,
        &mut player.animation_sequence,
        next,
        attack_restarted,
    );
}

pub fn update_npc(npc: &mut NpcState, attack_restarted: bool) {
    let next = if !npc.is_alive() {
        NpcAnimation::Dead
    } else if npc.is_attacking {
        npc.current_attack.animation()
    } else if npc.velocity.x != 0.0 {
        NpcAnimation::Walk
    } else {
        NpcAnimation::Idle
    };

    if npc.is_alive() && !npc.is_attacking {
        face(&mut npc.animation_flip, npc.velocity.x);
    }
    transition(
        &mut npc.animation,
        &mut npc.animation_sequence,
        next,
        attack_restarted,
    );
}
