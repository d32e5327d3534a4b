use crate::error::AuthError;
use async_trait::async_trait;
use callkit_core::ParticipantId;
use std::collections::HashMap;

/// Maps the token of an `authenticate` frame to the participant it identifies.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<ParticipantId, AuthError>;
}

/// Development authenticator: the token is the participant id.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenAsIdentity;

#[async_trait]
impl Authenticator for TokenAsIdentity {
    async fn authenticate(&self, token: &str) -> Result<ParticipantId, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        Ok(ParticipantId::from(token))
    }
}

#[derive(Debug, Default, Clone)]
pub struct StaticTokens {
    tokens: HashMap<String, ParticipantId>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, participant: impl Into<ParticipantId>) -> Self {
        self.tokens.insert(token.into(), participant.into());
        self
    }
}

#[async_trait]
impl Authenticator for StaticTokens {
    async fn authenticate(&self, token: &str) -> Result<ParticipantId, AuthError> {
        if token.is_empty() {
            return Err(AuthError::EmptyToken);
        }
        self.tokens.get(token).cloned().ok_or(AuthError::UnknownToken)
    }
}
