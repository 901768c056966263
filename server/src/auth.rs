//! Token verification against the identity provider.

use crate::error::{AuthError, ServerError};
use async_trait::async_trait;
use std::collections::HashMap;

/// Resolves a login token to the user id it was issued for.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify_token(&self, token: &str) -> Result<String, AuthError>;
}

/// Verifier backed by a fixed token table.
#[derive(Debug, Default, Clone)]
pub struct StaticTokenVerifier {
    tokens: HashMap<String, String>,
}

impl StaticTokenVerifier {
    pub fn new<I, T, U>(tokens: I) -> Self
    where
        I: IntoIterator<Item = (T, U)>,
        T: Into<String>,
        U: Into<String>,
    {
        StaticTokenVerifier {
            tokens: tokens
                .into_iter()
                .map(|(token, user)| (token.into(), user.into()))
                .collect(),
        }
    }

    /// Parses `token=user_id` pairs as given on the command line.
    pub fn from_pairs(pairs: &[String]) -> Result<Self, ServerError> {
        let mut tokens = HashMap::new();
        for pair in pairs {
            match pair.split_once('=') {
                Some((token, user)) if !token.is_empty() && !user.is_empty() => {
                    tokens.insert(token.to_string(), user.to_string());
                }
                _ => {
                    return Err(ServerError::InvalidConfig(format!(
                        "expected token=user_id, got {:?}",
                        pair
                    )))
                }
            }
        }
        Ok(StaticTokenVerifier { tokens })
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify_token(&self, token: &str) -> Result<String, AuthError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or(AuthError::InvalidToken)
    }
}

/// Development verifier: the token is the user id.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevTokenVerifier;

#[async_trait]
impl TokenVerifier for DevTokenVerifier {
    async fn verify_token(&self, token: &str) -> Result<String, AuthError> {
        let user_id = token.trim();
        if user_id.is_empty() {
            return Err(AuthError::InvalidToken);
        }
        Ok(user_id.to_string())
    }
}
