//! Attack state machine shared by players and NPCs.
//!
//! An attack runs for `duration` seconds. Once `channel_time` has elapsed the
//! attacker is "hitting" for exactly one step; the `did_attack_hit` latch
//! keeps it from landing twice. When the timer runs out control returns.

use shared::{AttackSpec, NpcState, PlayerState, Rect};

/// Borrowed view over an actor's attack fields.
pub struct AttackState<'a> {
    pub is_attacking: &'a mut bool,
    pub attack_time_left: &'a mut f64,
    pub is_attack_hitting: &'a mut bool,
    pub did_attack_hit: &'a mut bool,
}

impl AttackState<'_> {
    pub fn start(&mut self, spec: &AttackSpec) {
        *self.is_attacking = true;
        *self.attack_time_left = spec.duration;
        *self.is_attack_hitting = false;
        *self.did_attack_hit = false;
    }

    /// Advances the timer. Returns true on the one step the hit lands.
    pub fn advance(&mut self, dt: f64, spec: &AttackSpec) -> bool {
        *self.is_attack_hitting = false;
        if !*self.is_attacking {
            return false;
        }

        *self.attack_time_left -= dt;
        if !*self.did_attack_hit && *self.attack_time_left <= spec.duration - spec.channel_time {
            *self.did_attack_hit = true;
            *self.is_attack_hitting = true;
        }

        if *self.attack_time_left <= 0.0 {
            *self.is_attacking = false;
            *self.attack_time_left = 0.0;
        }

        *self.is_attack_hitting
    }

    pub fn cancel(&mut self) {
        *self.is_attacking = false;
        *self.attack_time_left = 0.0;
        *self.is_attack_hitting = false;
    }
}

pub trait Combatant {
    fn attack_state(&mut self) -> AttackState<'_>;
}

impl Combatant for PlayerState {
    fn attack_state(&mut self) -> AttackState<'_> {
        AttackState {
            is_attacking: &mut self.is_attacking,
            attack_time_left: &mut self.attack_time_left,
            is_attack_hitting: &mut self.is_attack_hitting,
            did_attack_hit: &mut self.did_attack_hit,
        }
    }
}

impl Combatant for NpcState {
    fn attack_state(&mut self) -> AttackState<'_> {
        AttackState {
            is_attacking: &mut self.is_attacking,
            attack_time_left: &mut self.attack_time_left,
            is_attack_hitting: &mut self.is_attack_hitting,
            did_attack_hit: &mut self.did_attack_hit,
        }
    }
}

/// The area an attack covers, in front of the attacker. `flip` means the
/// attacker faces left.
pub fn hitbox(shape: &Rect, flip: bool, spec: &AttackSpec) -> Rect {
    let center = shape.center();
    let reach_center = if flip {
        center.x - spec.hitbox_offset
    } else {
        center.x + spec.hitbox_offset
    };
    Rect::new(
        reach_center - spec.hitbox_width / 2.0,
        shape.y,
        spec.hitbox_width,
        shape.height,
    )
}

/// Applies damage and returns true if this blow was fatal.
pub fn apply_damage(hitpoints: &mut i16, damage: i16) -> bool {
    if *hitpoints <= 0 {
        return false;
    }
    *hitpoints = hitpoints.saturating_sub(damage).max(0);
    *hitpoints == 0
}
