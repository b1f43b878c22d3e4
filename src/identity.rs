//! Identity provider collaborator
//!
//! Session and token management live outside the ledger. All the ledger
//! needs is to turn an opaque token into an authenticated caller and, for
//! agents, the company they act for.

use crate::types::{CallerIdentity, LedgerError};
use async_trait::async_trait;
use dashmap::DashMap;

/// Resolves opaque tokens into authenticated callers
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Authenticate a token
    ///
    /// Fails with `Unauthenticated` for empty or unknown tokens.
    async fn authenticate(&self, token: &str) -> Result<CallerIdentity, LedgerError>;
}

/// Identity provider backed by a fixed table of agent tokens
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    agents: DashMap<String, CallerIdentity>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the identity bound to a token
    pub fn register(&self, identity: CallerIdentity) {
        self.agents.insert(identity.token.clone(), identity);
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl FromIterator<CallerIdentity> for StaticIdentityProvider {
    fn from_iter<I: IntoIterator<Item = CallerIdentity>>(iter: I) -> Self {
        let provider = Self::new();
        for identity in iter {
            provider.register(identity);
        }
        provider
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn authenticate(&self, token: &str) -> Result<CallerIdentity, LedgerError> {
        if token.trim().is_empty() {
            return Err(LedgerError::unauthenticated(
                "only signed-in agents can validate deposits",
            ));
        }

        self.agents
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| LedgerError::unauthenticated("unknown or expired identity token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_authenticate_known_token() {
        let provider: StaticIdentityProvider =
            [CallerIdentity::agent("tok-a", "agent-a", "C1")].into_iter().collect();

        let identity = provider.authenticate("tok-a").await.unwrap();

        assert_eq!(identity.agent_id, "agent-a");
        assert_eq!(identity.company_id.as_deref(), Some("C1"));
    }

    #[tokio::test]
    async fn test_authenticate_rejects_unknown_and_empty_tokens() {
        let provider = StaticIdentityProvider::new();

        for token in ["", "   ", "tok-missing"] {
            assert!(matches!(
                provider.authenticate(token).await,
                Err(LedgerError::Unauthenticated { .. })
            ));
        }
    }

    #[test]
    fn test_register_replaces_binding() {
        let provider = StaticIdentityProvider::new();
        provider.register(CallerIdentity::agent("tok", "agent", "C1"));
        provider.register(CallerIdentity::agent("tok", "agent", "C2"));

        assert_eq!(provider.len(), 1);
    }
}
