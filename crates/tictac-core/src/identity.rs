//! Verified identities and the credential resolver contract

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::GameResult;
use crate::types::UserId;

/// Identity issued by the external authentication component
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Identity {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            roles: Vec::new(),
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Turns a bearer credential into a verified identity
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Fails with `GameError::Unauthenticated` for missing or invalid credentials
    async fn resolve(&self, credential: &str) -> GameResult<Identity>;
}
