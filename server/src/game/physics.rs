//! Kinematic stepping shared by players and NPCs.

use shared::kinematic::{displacement, final_velocity, GRAVITY};
use shared::{Rect, Space, Vector2};

///Per-actor movement constants.
#[derive(Debug, Clone, Copy)]
pub struct MotionParams {
    pub speed: f64,
    pub jump_speed: f64,
    pub gravity_multiplier: f64,
    pub width: f64,
    pub height: f64,
}

///The intent driving one step.
#[derive(Debug, Clone, Copy, Default)]
pub struct MotionInput {
    ///Horizontal intent in `[-1, 1]`.
    pub x: f64,
    ///Only honoured while grounded.
    pub jump: bool,
}

///Mutable kinematic state of an actor.
pub struct Body<'a> {
    pub position: &'a mut Vector2,
    pub velocity: &'a mut Vector2,
    pub is_on_ground: &'a mut bool,
}

///Advances a body by `dt` seconds against the level geometry.
///
///Horizontal motion has no acceleration: velocity is the input times the
///actor's speed. Vertical motion integrates gravity unless the body is
///resting on something. The move is swept along X first, then along Y;
///each axis stops at the first contact and loses its velocity.
pub fn step(body: Body<'_>, params: &MotionParams, input: MotionInput, dt: f64, space: &Space) {
    let mut vx = input.x.clamp(-1.0, 1.0) * params.speed;
    let mut vy = body.velocity.y;

    if input.jump && *body.is_on_ground {
        vy = params.jump_speed;
        *body.is_on_ground = false;
    }

    let shape = Rect::at(*body.position, params.width, params.height);
    let resting = *body.is_on_ground && vy == 0.0 && space.is_supported(&shape);
    let ay = if resting {
        0.0
    } else {
        GRAVITY * params.gravity_multiplier
    };

    let mut dx = displacement(vx, dt, 0.0);
    let mut dy = displacement(vy, dt, ay);
    vy = final_velocity(vy, dt, ay);

    if let Some(contact) = space.sweep_x(&shape, dx) {
        dx = contact;
        vx = 0.0;
    }
    body.position.x += dx;

    let shape = Rect::at(*body.position, params.width, params.height);
    match space.sweep_y(&shape, dy) {
        Some(contact) => {
            if dy < 0.0 {
                *body.is_on_ground = true;
            }
            dy = contact;
            vy = 0.0;
        }
        None if dy != 0.0 => *body.is_on_ground = false,
        None => {}
    }
    body.position.y += dy;

    *body.velocity = Vector2::new(vx, vy);
}
