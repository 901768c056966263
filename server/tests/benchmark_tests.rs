//! Performance benchmarks for critical game systems

use rand::rngs::StdRng;
use rand::SeedableRng;
use server::game::{World, DEFAULT_NPC_SPAWNS};
use shared::messages::{ClientPlayerUpdate, ServerGameUpdate};
use shared::{codec, GameState, Message, PlayerState, Space, Vector2};
use std::time::Instant;

fn populated_state(players: u32) -> GameState {
    let mut state = GameState::new();
    for id in 1..=players {
        let mut player = PlayerState::new(id as i32, format!("player-{}", id));
        player.position = Vector2::new(40.0 * id as f64, 16.0);
        state.players.insert(id, player);
    }
    state
}

/// Benchmarks encoding a full game update for a busy server
#[test]
fn benchmark_game_update_encoding() {
    let state = populated_state(32);
    let update = ServerGameUpdate {
        timestamp: state.timestamp,
        players: state.players.clone(),
        npcs: state.npcs.clone(),
    };

    let iterations = 1_000;
    let start = Instant::now();

    let mut bytes = 0;
    for _ in 0..iterations {
        let message = Message::new(0, &update).unwrap();
        bytes = codec::encode(&message).unwrap().len();
    }

    let duration = start.elapsed();
    println!(
        "Game update encoding: {} iterations in {:?} ({:.2} μs/iter, {} bytes)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64,
        bytes
    );

    assert!(bytes <= codec::MAX_DATAGRAM_SIZE);
    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks decoding of player inputs, the hottest inbound path
#[test]
fn benchmark_input_decoding() {
    let input = ClientPlayerUpdate {
        timestamp: 1,
        input_x: 1.0,
        delta_time: 0.016,
        ..Default::default()
    };
    let bytes = codec::encode(&Message::new(42, &input).unwrap()).unwrap();

    let iterations = 100_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let message = codec::decode(&bytes).unwrap();
        let _: ClientPlayerUpdate = message.decode_payload().unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Input decoding: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks world simulation with many players and the default NPCs
#[test]
fn benchmark_world_ticks() {
    let mut world = World::new(Space::default_level(), StdRng::seed_from_u64(3));
    for spawn in DEFAULT_NPC_SPAWNS {
        world.spawn_npc(spawn);
    }
    for (id, player) in populated_state(16).players {
        world.connect_player(id, player);
    }

    let ticks = 1_000;
    let start = Instant::now();

    for tick in 1..=ticks {
        for id in 1..=16 {
            let input = ClientPlayerUpdate {
                timestamp: tick,
                input_x: if tick % 100 < 50 { 1.0 } else { -1.0 },
                input_jump: tick % 37 == 0,
                input_attack: tick % 23 == 0,
                delta_time: 0.05,
                ..Default::default()
            };
            world.apply_input(id, &input).unwrap();
        }
        world.update_npcs(0.05);
        world.take_events();
    }

    let duration = start.elapsed();
    println!(
        "World simulation: {} ticks with 16 players in {:?} ({:.2} μs/tick)",
        ticks,
        duration,
        duration.as_micros() as f64 / ticks as f64
    );

    // A 20 Hz tick has 50ms; stay far below that
    assert!(duration.as_millis() < 5000);
}
