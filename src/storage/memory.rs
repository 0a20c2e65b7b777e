use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::Error;
use crate::token::TokenState;

use super::TokenStorage;

/// Process-local storage. Starts empty unless seeded.
#[derive(Debug, Default)]
pub struct MemoryTokenStorage {
    state: RwLock<Option<TokenState>>,
}

impl MemoryTokenStorage {
    pub fn new(state: TokenState) -> Self {
        Self {
            state: RwLock::new(Some(state)),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStorage for MemoryTokenStorage {
    async fn get(&self) -> Result<TokenState, Error> {
        self.state
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::StorageUnavailable("no credentials stored".into()))
    }

    async fn update(&self, state: &TokenState) -> Result<(), Error> {
        *self.state.write().await = Some(state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_storage_is_unavailable() {
        let storage = MemoryTokenStorage::empty();
        let err = storage.get().await.expect_err("nothing stored");
        assert!(matches!(err, Error::StorageUnavailable(_)));
    }

    #[tokio::test]
    async fn update_replaces_state() {
        let storage = MemoryTokenStorage::new(TokenState::new("T0", None));
        let next = TokenState::new("T1", Some("R1".into()));
        storage.update(&next).await.unwrap();
        assert_eq!(storage.get().await.unwrap(), next);
    }
}
