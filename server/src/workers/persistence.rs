//! Saves player and world state through the repository, off the tick path.

use crate::repository::Repository;
use log::{debug, error, info};
use shared::{GameState, PlayerState};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

#[derive(Debug, Clone, PartialEq)]
pub enum SaveRequest {
    /// Final state of a departing player.
    Player {
        timestamp: i64,
        character_id: i32,
        player_state: PlayerState,
    },
    /// Every player in the world, e.g. at shutdown.
    Game { state: GameState },
}

pub struct PersistenceWorker {
    repository: Arc<dyn Repository>,
    save_interval: Duration,
}

impl PersistenceWorker {
    pub fn new(repository: Arc<dyn Repository>, save_interval: Duration) -> Self {
        PersistenceWorker {
            repository,
            save_interval,
        }
    }

    /// Serves save requests and periodically saves the latest published
    /// snapshot. Runs until the request channel closes, so a final save
    /// sent during shutdown is never lost.
    pub async fn run(
        self,
        mut requests: mpsc::Receiver<SaveRequest>,
        mut snapshots: watch::Receiver<GameState>,
    ) {
        let mut timer = time::interval_at(Instant::now() + self.save_interval, self.save_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => self.handle(request).await,
                    None => break,
                },
                _ = timer.tick() => self.save_snapshot(&mut snapshots).await,
            }
        }
        info!("Persistence worker stopped");
    }

    pub async fn handle(&self, request: SaveRequest) {
        match request {
            SaveRequest::Player {
                timestamp,
                character_id,
                player_state,
            } => {
                match self
                    .repository
                    .save_player_state(timestamp, character_id, &player_state)
                    .await
                {
                    Ok(()) => debug!("Saved character {}", character_id),
                    Err(e) => error!("Failed to save character {}: {}", character_id, e),
                }
            }
            SaveRequest::Game { state } => self.save_game_state(&state).await,
        }
    }

    async fn save_snapshot(&self, snapshots: &mut watch::Receiver<GameState>) {
        // A dropped publisher means there is nothing new to save.
        if !snapshots.has_changed().unwrap_or(false) {
            return;
        }
        let state = snapshots.borrow_and_update().clone();
        self.save_game_state(&state).await;
    }

    async fn save_game_state(&self, state: &GameState) {
        match self.repository.save_game_state(state).await {
            Ok(()) => debug!(
                "Saved game state at {} ({} players)",
                state.timestamp,
                state.players.len()
            ),
            Err(e) => error!("Failed to save game state: {}", e),
        }
    }
}
