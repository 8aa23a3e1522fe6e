//! Static bearer-token identity resolver

use std::collections::HashMap;

use async_trait::async_trait;
use tictac_core::{GameError, GameResult, Identity, IdentityResolver};

/// Token table loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, Identity>,
}

impl StaticTokenResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }

    pub fn with_token(mut self, token: impl Into<String>, identity: Identity) -> Self {
        self.register(token, identity);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl FromIterator<(String, Identity)> for StaticTokenResolver {
    fn from_iter<I: IntoIterator<Item = (String, Identity)>>(iter: I) -> Self {
        Self {
            tokens: iter.into_iter().collect(),
        }
    }
}

#[async_trait]
impl IdentityResolver for StaticTokenResolver {
    async fn resolve(&self, credential: &str) -> GameResult<Identity> {
        let token = credential.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(GameError::Unauthenticated);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or(GameError::Unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tictac_core::UserId;

    #[tokio::test]
    async fn test_resolves_plain_and_bearer_tokens() {
        let resolver = StaticTokenResolver::new()
            .with_token("secret-a", Identity::new(UserId::new(1), "alice").with_roles(["Admin"]));

        let identity = resolver.resolve("secret-a").await.unwrap();
        assert_eq!(identity.username, "alice");
        assert!(identity.has_role("Admin"));
        assert_eq!(resolver.resolve("Bearer secret-a").await.unwrap(), identity);
    }

    #[tokio::test]
    async fn test_unknown_or_empty_credentials_are_rejected() {
        let resolver = StaticTokenResolver::new();
        assert!(matches!(
            resolver.resolve("").await,
            Err(GameError::Unauthenticated)
        ));
        assert!(matches!(
            resolver.resolve("nope").await,
            Err(GameError::Unauthenticated)
        ));
    }
}
