//! Error types, one enum per concern.

use std::io;
use thiserror::Error;

/// Failures while registering a client.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("user {0} is already connected")]
    AlreadyConnected(String),
    #[error("server is full")]
    ServerFull,
    #[error("could not generate a unique client id")]
    IdSpaceExhausted,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid token")]
    InvalidToken,
}

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("character {character_id} does not belong to user {user_id}")]
    NotOwned { user_id: String, character_id: i32 },
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("storage document is invalid: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Startup failures. These are the only fatal errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {transport} listener on {addr}: {source}")]
    Bind {
        transport: &'static str,
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
