//! Turns registry lifecycle events into simulation events, loading the
//! character's saved state on the way in.

use crate::client_manager::ConnectionEvent;
use crate::error::RepositoryError;
use crate::game::SimulationEvent;
use crate::repository::Repository;
use log::{error, info, warn};
use shared::PlayerState;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

pub struct ConnectionWorker {
    repository: Arc<dyn Repository>,
}

impl ConnectionWorker {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        ConnectionWorker { repository }
    }

    /// Handles events one at a time so a quick reconnect can never overtake
    /// the disconnect before it.
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
        simulation: mpsc::Sender<SimulationEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    let Some(event) = self.handle(event).await else { continue };
                    if simulation.send(event).await.is_err() {
                        break;
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
        info!("Connection worker stopped");
    }

    /// Resolves one registry event. `None` means no player should spawn.
    pub async fn handle(&self, event: ConnectionEvent) -> Option<SimulationEvent> {
        match event {
            ConnectionEvent::Connect {
                client_id,
                user_id,
                character_id,
            } => {
                let character = match self.repository.get_character(&user_id, character_id).await {
                    Ok(character) => character,
                    Err(e) => {
                        error!(
                            "Client {}: cannot load character {} for {}: {}",
                            client_id, character_id, user_id, e
                        );
                        return None;
                    }
                };

                let mut player_state = match self.repository.load_player_state(character.id).await
                {
                    Ok(player_state) => player_state,
                    Err(RepositoryError::NotFound) => PlayerState::new(character.id, ""),
                    Err(e) => {
                        warn!(
                            "Client {}: failed to load character {}, using defaults: {}",
                            client_id, character.id, e
                        );
                        PlayerState::new(character.id, "")
                    }
                };
                player_state.name = character.name;

                Some(SimulationEvent::ConnectPlayer {
                    client_id,
                    player_state,
                })
            }
            ConnectionEvent::Disconnect { client_id } => {
                Some(SimulationEvent::DisconnectPlayer { client_id })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{Character, InMemoryRepository};
    use shared::{Vector2, PLAYER_HITPOINTS};

    fn connect(user_id: &str, character_id: i32) -> ConnectionEvent {
        ConnectionEvent::Connect {
            client_id: 11,
            user_id: user_id.to_string(),
            character_id,
        }
    }

    #[tokio::test]
    async fn test_new_character_gets_defaults() {
        let worker = ConnectionWorker::new(Arc::new(InMemoryRepository::new()));

        let event = worker.handle(connect("alice", 3)).await;
        match event {
            Some(SimulationEvent::ConnectPlayer {
                client_id,
                player_state,
            }) => {
                assert_eq!(client_id, 11);
                assert_eq!(player_state.character_id, 3);
                assert_eq!(player_state.name, "alice");
                assert_eq!(player_state.position, PlayerState::start_position());
                assert_eq!(player_state.hitpoints, PLAYER_HITPOINTS);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_saved_state_is_restored() {
        let repository = Arc::new(InMemoryRepository::new());
        repository
            .insert_character(Character {
                id: 3,
                user_id: "alice".to_string(),
                name: "Sir Alice".to_string(),
            })
            .await;
        let mut saved = PlayerState::new(3, "");
        saved.position = Vector2::new(900.0, 16.0);
        saved.hitpoints = 40;
        repository.save_player_state(1, 3, &saved).await.unwrap();

        let worker = ConnectionWorker::new(repository);
        let Some(SimulationEvent::ConnectPlayer { player_state, .. }) =
            worker.handle(connect("alice", 3)).await
        else {
            panic!("expected a connect");
        };

        assert_eq!(player_state.name, "Sir Alice");
        assert_eq!(player_state.position, Vector2::new(900.0, 16.0));
        assert_eq!(player_state.hitpoints, 40);
    }

    #[tokio::test]
    async fn test_foreign_character_spawns_nothing() {
        let repository = Arc::new(InMemoryRepository::new());
        repository
            .insert_character(Character {
                id: 3,
                user_id: "alice".to_string(),
                name: "alice".to_string(),
            })
            .await;
        let worker = ConnectionWorker::new(repository);

        assert!(worker.handle(connect("mallory", 3)).await.is_none());
    }

    #[tokio::test]
    async fn test_events_forwarded_in_order() {
        let worker = ConnectionWorker::new(Arc::new(InMemoryRepository::new()));
        let (events_tx, events) = mpsc::unbounded_channel();
        let (simulation, mut simulation_rx) = mpsc::channel(4);
        let (_shutdown_tx, shutdown) = watch::channel(false);
        tokio::spawn(worker.run(events, simulation, shutdown));

        events_tx.send(connect("bob", 1)).unwrap();
        events_tx
            .send(ConnectionEvent::Disconnect { client_id: 11 })
            .unwrap();

        assert!(matches!(
            simulation_rx.recv().await,
            Some(SimulationEvent::ConnectPlayer { client_id: 11, .. })
        ));
        assert_eq!(
            simulation_rx.recv().await,
            Some(SimulationEvent::DisconnectPlayer { client_id: 11 })
        );
    }
}
