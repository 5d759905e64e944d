//! Session-token boundary.
//!
//! Obtaining and refreshing the token (FIEL certificate handling, the
//! authentication web service) is entirely the collaborator's
//! responsibility; the client only needs something that yields the current
//! opaque token string.

use async_trait::async_trait;

use tributo_core::retrieval::client::RegistryCallError;

/// Yields the current session token for registry calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// The token to attach to the next call.
    async fn token(&self) -> Result<String, RegistryCallError>;
}

/// A fixed token handed in at startup (e.g. from the environment).
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Wraps an already-obtained session token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn token(&self) -> Result<String, RegistryCallError> {
        if self.token.is_empty() {
            return Err(RegistryCallError::Api {
                code: None,
                message: "no session token configured".to_string(),
            });
        }
        Ok(self.token.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token_round_trips() {
        let provider = StaticTokenProvider::new("opaque-token");
        assert_eq!(provider.token().await.unwrap(), "opaque-token");
    }

    #[tokio::test]
    async fn test_empty_token_is_an_error() {
        let provider = StaticTokenProvider::new("");
        assert!(provider.token().await.is_err());
    }
}
