//! Persistence collaborator.
//!
//! The simulation only ever talks to the [`Repository`] trait; which backend
//! sits behind it is decided once at startup.

use crate::error::RepositoryError;
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use shared::{GameState, PlayerState, Vector2};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// A playable character owned by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: i32,
    pub user_id: String,
    pub name: String,
}

#[async_trait]
pub trait Repository: Send + Sync {
    /// Persists every player in the snapshot.
    async fn save_game_state(&self, state: &GameState) -> Result<(), RepositoryError>;

    async fn save_player_state(
        &self,
        timestamp: i64,
        character_id: i32,
        state: &PlayerState,
    ) -> Result<(), RepositoryError>;

    /// Returns [`RepositoryError::NotFound`] for a character that was never saved.
    async fn load_player_state(&self, character_id: i32) -> Result<PlayerState, RepositoryError>;

    async fn get_character(
        &self,
        user_id: &str,
        character_id: i32,
    ) -> Result<Character, RepositoryError>;
}

/// The persisted part of a player: where they were and how healthy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct PlayerRecord {
    timestamp: i64,
    x: f64,
    y: f64,
    hitpoints: i16,
}

impl PlayerRecord {
    fn from_state(timestamp: i64, state: &PlayerState) -> Self {
        PlayerRecord {
            timestamp,
            x: state.position.x,
            y: state.position.y,
            hitpoints: state.hitpoints,
        }
    }

    fn to_state(self, character_id: i32) -> PlayerState {
        let mut state = PlayerState::new(character_id, String::new());
        state.position = Vector2::new(self.x, self.y);
        state.hitpoints = self.hitpoints;
        state
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Store {
    characters: HashMap<i32, Character>,
    players: HashMap<i32, PlayerRecord>,
}

impl Store {
    /// Looks up a character, creating it for `user_id` on first use.
    /// Returns the character and whether the store changed.
    fn character(
        &mut self,
        user_id: &str,
        character_id: i32,
    ) -> Result<(Character, bool), RepositoryError> {
        if let Some(character) = self.characters.get(&character_id) {
            if character.user_id != user_id {
                return Err(RepositoryError::NotOwned {
                    user_id: user_id.to_string(),
                    character_id,
                });
            }
            return Ok((character.clone(), false));
        }

        let character = Character {
            id: character_id,
            user_id: user_id.to_string(),
            name: user_id.to_string(),
        };
        info!(
            "Provisioned character {} for user {}",
            character_id, user_id
        );
        self.characters.insert(character_id, character.clone());
        Ok((character, true))
    }

    fn save_game_state(&mut self, state: &GameState) {
        for player in state.players.values() {
            self.players.insert(
                player.character_id,
                PlayerRecord::from_state(state.timestamp, player),
            );
        }
    }

    fn save_player_state(&mut self, timestamp: i64, character_id: i32, state: &PlayerState) {
        self.players
            .insert(character_id, PlayerRecord::from_state(timestamp, state));
    }

    fn load_player_state(&self, character_id: i32) -> Result<PlayerState, RepositoryError> {
        self.players
            .get(&character_id)
            .map(|record| record.to_state(character_id))
            .ok_or(RepositoryError::NotFound)
    }
}

/// Process-local repository. Characters are created on first login.
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    store: RwLock<Store>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        InMemoryRepository::default()
    }

    /// Registers a character ahead of time, e.g. to give it a display name.
    pub async fn insert_character(&self, character: Character) {
        self.store
            .write()
            .await
            .characters
            .insert(character.id, character);
    }

    /// Timestamp of the most recent save for a character.
    pub async fn saved_at(&self, character_id: i32) -> Option<i64> {
        self.store
            .read()
            .await
            .players
            .get(&character_id)
            .map(|record| record.timestamp)
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn save_game_state(&self, state: &GameState) -> Result<(), RepositoryError> {
        self.store.write().await.save_game_state(state);
        Ok(())
    }

    async fn save_player_state(
        &self,
        timestamp: i64,
        character_id: i32,
        state: &PlayerState,
    ) -> Result<(), RepositoryError> {
        self.store
            .write()
            .await
            .save_player_state(timestamp, character_id, state);
        Ok(())
    }

    async fn load_player_state(&self, character_id: i32) -> Result<PlayerState, RepositoryError> {
        self.store.read().await.load_player_state(character_id)
    }

    async fn get_character(
        &self,
        user_id: &str,
        character_id: i32,
    ) -> Result<Character, RepositoryError> {
        let (character, _) = self.store.write().await.character(user_id, character_id)?;
        Ok(character)
    }
}

/// Repository persisted as a single JSON document.
///
/// The whole document is rewritten on every change, through a temporary
/// file and a rename so a crash never leaves a half-written document.
#[derive(Debug)]
pub struct FileRepository {
    path: PathBuf,
    store: RwLock<Store>,
}

impl FileRepository {
    /// Opens the document at `path`, starting empty if it does not exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let path = path.as_ref().to_path_buf();
        let store = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No data file at {}, starting empty", path.display());
                Store::default()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(FileRepository {
            path,
            store: RwLock::new(store),
        })
    }

    async fn flush(&self, store: &Store) -> Result<(), RepositoryError> {
        let bytes = serde_json::to_vec_pretty(store)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Wrote {} bytes to {}", bytes.len(), self.path.display());
        Ok(())
    }
}

#[async_trait]
impl Repository for FileRepository {
    async fn save_game_state(&self, state: &GameState) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        store.save_game_state(state);
        self.flush(&store).await
    }

    async fn save_player_state(
        &self,
        timestamp: i64,
        character_id: i32,
        state: &PlayerState,
    ) -> Result<(), RepositoryError> {
        let mut store = self.store.write().await;
        store.save_player_state(timestamp, character_id, state);
        self.flush(&store).await
    }

    async fn load_player_state(&self, character_id: i32) -> Result<PlayerState, RepositoryError> {
        self.store.read().await.load_player_state(character_id)
    }

    async fn get_character(
        &self,
        user_id: &str,
        character_id: i32,
    ) -> Result<Character, RepositoryError> {
        let mut store = self.store.write().await;
        let (character, changed) = store.character(user_id, character_id)?;
        if changed {
            self.flush(&store).await?;
        }
        Ok(character)
    }
}
