//! Fixed-tick authoritative simulation.
//!
//! The [`GameManager`] task owns the [`World`]. Everything reaches it over
//! channels and everything leaves it through non-blocking sends, so a tick
//! never waits on I/O.

pub mod animation;
pub mod combat;
pub mod npc;
pub mod physics;
pub mod world;

pub use world::{InputError, World};

use crate::utils::unix_millis;
use crate::workers::broadcast::BroadcastMessage;
use crate::workers::persistence::SaveRequest;
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::messages::{ClientPlayerUpdate, ServerGameUpdate, ServerNpcUpdate, ServerPlayerUpdate};
use shared::{GameState, Message, MessageType, PlayerState, Space, Vector2};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

/// Where the default level's NPCs stand.
pub const DEFAULT_NPC_SPAWNS: [Vector2; 3] = [
    Vector2::new(160.0, 16.0),
    Vector2::new(1056.0, 16.0),
    Vector2::new(384.0, 176.0),
];

/// Players entering and leaving, already resolved against the repository.
#[derive(Debug, Clone, PartialEq)]
pub enum SimulationEvent {
    ConnectPlayer {
        client_id: u32,
        player_state: PlayerState,
    },
    DisconnectPlayer {
        client_id: u32,
    },
}

/// The default level with its NPCs.
pub fn default_world() -> World {
    let mut world = World::new(Space::default_level(), StdRng::from_entropy());
    for spawn in DEFAULT_NPC_SPAWNS {
        world.spawn_npc(spawn);
    }
    world
}

pub struct GameManager {
    world: World,
    previous: GameState,
    tick_duration: Duration,
    game_update_interval: u32,
    tick: u64,
    broadcast: mpsc::Sender<BroadcastMessage>,
    saves: mpsc::Sender<SaveRequest>,
    snapshots: watch::Sender<GameState>,
}

impl GameManager {
    pub fn new(
        world: World,
        tick_duration: Duration,
        game_update_interval: u32,
        broadcast: mpsc::Sender<BroadcastMessage>,
        saves: mpsc::Sender<SaveRequest>,
        snapshots: watch::Sender<GameState>,
    ) -> Self {
        GameManager {
            world,
            previous: GameState::new(),
            tick_duration,
            game_update_interval: game_update_interval.max(1),
            tick: 0,
            broadcast,
            saves,
            snapshots,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Ticks until shutdown, then asks for one last save of everything.
    pub async fn run(
        mut self,
        mut events: mpsc::Receiver<SimulationEvent>,
        mut inbound: mpsc::Receiver<Message>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut timer = interval(self.tick_duration);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // The first tick fires immediately
        timer.tick().await;

        info!(
            "Game loop running at {:.0} Hz",
            1.0 / self.tick_duration.as_secs_f64()
        );

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    let mut pending_events = Vec::new();
                    while let Ok(event) = events.try_recv() {
                        pending_events.push(event);
                    }
                    let mut messages = Vec::new();
                    while let Ok(message) = inbound.try_recv() {
                        messages.push(message);
                    }
                    self.tick(pending_events, messages, unix_millis());
                }
                _ = shutdown.changed() => break,
            }
        }

        let state = self.world.state().clone();
        info!("Game loop stopping, saving {} players", state.players.len());
        if self.saves.send(SaveRequest::Game { state }).await.is_err() {
            warn!("Persistence worker gone, final save skipped");
        }
    }

    /// Runs one simulation step at wall-clock time `now`.
    pub fn tick(&mut self, events: Vec<SimulationEvent>, messages: Vec<Message>, now: i64) {
        self.tick += 1;

        for event in events {
            self.handle_event(event, now);
        }
        for message in messages {
            self.handle_message(&message);
        }

        self.world.update_npcs(self.tick_duration.as_secs_f64());
        self.world.set_timestamp(now);

        for event in self.world.take_events() {
            self.publish(event);
        }
        self.publish_deltas(now);
        if self.tick % u64::from(self.game_update_interval) == 0 {
            let state = self.world.state();
            self.publish(BroadcastMessage::GameUpdate(ServerGameUpdate {
                timestamp: state.timestamp,
                players: state.players.clone(),
                npcs: state.existing_npcs(),
            }));
        }

        let snapshot = self.world.state().clone();
        self.snapshots.send_replace(snapshot.clone());
        self.previous = snapshot;
    }

    fn handle_event(&mut self, event: SimulationEvent, now: i64) {
        match event {
            SimulationEvent::ConnectPlayer {
                client_id,
                player_state,
            } => self.world.connect_player(client_id, player_state),
            SimulationEvent::DisconnectPlayer { client_id } => {
                let Some(player_state) = self.world.disconnect_player(client_id) else {
                    debug!("Disconnect for unknown player {}", client_id);
                    return;
                };
                let request = SaveRequest::Player {
                    timestamp: now,
                    character_id: player_state.character_id,
                    player_state,
                };
                if let Err(e) = self.saves.try_send(request) {
                    warn!("Dropping save for departed client {}: {}", client_id, e);
                }
            }
        }
    }

    fn handle_message(&mut self, message: &Message) {
        if message.message_type != MessageType::ClientPlayerUpdate {
            debug!(
                "Ignoring {} from client {}",
                message.message_type, message.client_id
            );
            return;
        }

        let input = match message.decode_payload::<ClientPlayerUpdate>() {
            Ok(input) => input,
            Err(e) => {
                warn!("Malformed input from client {}: {}", message.client_id, e);
                return;
            }
        };

        match self.world.apply_input(message.client_id, &input) {
            Ok(true) => {}
            Ok(false) => debug!(
                "Stale input {} from client {}",
                input.timestamp, message.client_id
            ),
            Err(e) => warn!("Rejected input from client {}: {}", message.client_id, e),
        }
    }

    /// Sends an update for every actor that changed since the last tick.
    fn publish_deltas(&self, now: i64) {
        let state = self.world.state();

        let mut player_ids: Vec<u32> = state.players.keys().copied().collect();
        player_ids.sort_unstable();
        for client_id in player_ids {
            let player = &state.players[&client_id];
            if self.previous.players.get(&client_id) != Some(player) {
                self.publish(BroadcastMessage::PlayerUpdate(ServerPlayerUpdate {
                    timestamp: now,
                    client_id,
                    player_state: player.clone(),
                }));
            }
        }

        let mut npc_ids: Vec<u32> = state.npcs.keys().copied().collect();
        npc_ids.sort_unstable();
        for npc_id in npc_ids {
            let npc = &state.npcs[&npc_id];
            let previous = self.previous.npcs.get(&npc_id);
            // A removed NPC is announced once, then goes quiet until respawn.
            let visible = npc.exists || previous.map_or(true, |p| p.exists);
            if visible && previous != Some(npc) {
                self.publish(BroadcastMessage::NpcUpdate(ServerNpcUpdate {
                    timestamp: now,
                    npc_id,
                    npc_state: npc.clone(),
                }));
            }
        }
    }

    fn publish(&self, message: BroadcastMessage) {
        match self.broadcast.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("Broadcast queue full, dropping message"),
            Err(TrySendError::Closed(_)) => debug!("Broadcast worker gone"),
        }
    }
}
