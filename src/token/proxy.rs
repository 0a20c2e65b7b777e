use std::sync::{Arc, Mutex};

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use crate::errors::Error;
use crate::locker::Locker;
use crate::storage::TokenStorage;

use super::{RefreshResponse, TokenState, unix_now};

/// The single object shared by every request path for one credential.
///
/// Reads always go to storage, so proxies in different processes that share
/// the medium agree on the current token. The locker only coordinates who
/// performs a refresh.
pub struct TokenProxy {
    storage: Arc<dyn TokenStorage>,
    locker: Arc<dyn Locker>,
    last_read_timestamp: Mutex<Option<f64>>,
}

impl TokenProxy {
    pub fn new(storage: Arc<dyn TokenStorage>, locker: Arc<dyn Locker>) -> Self {
        Self {
            storage,
            locker,
            last_read_timestamp: Mutex::new(None),
        }
    }

    /// Waits out any refresh in flight, then builds the bearer header from storage.
    pub async fn get_auth_header(&self) -> Result<HeaderMap, Error> {
        self.locker.wait_for_release().await?;
        let state = self.storage.get().await?;
        self.mark_read();

        let value = HeaderValue::from_str(&format!("Bearer {}", state.access_token))
            .map_err(|e| Error::InvalidHeader(format!("access token: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, value);
        Ok(headers)
    }

    /// Body for the refresh endpoint. The caller must already hold the lock.
    pub async fn get_refresh_data(&self) -> Result<serde_json::Value, Error> {
        let state = self.storage.get().await?;
        let refresh_token = state.refresh_token.ok_or(Error::MissingRefreshToken)?;
        Ok(serde_json::json!({ "refresh_token": refresh_token }))
    }

    /// Persists the successor of the stored state built from `refresh_result`.
    pub async fn update(&self, refresh_result: RefreshResponse) -> Result<TokenState, Error> {
        let prior = self.storage.get().await?;
        let next = prior.refreshed(refresh_result, unix_now());
        self.storage.update(&next).await?;
        debug!(
            last_refresh_timestamp = next.last_refresh_timestamp,
            rotated_refresh_token = next.refresh_token != prior.refresh_token,
            "token_proxy.updated"
        );
        Ok(next)
    }

    /// `true` means this caller is responsible for the refresh.
    pub async fn lock_for_update(&self) -> Result<bool, Error> {
        self.locker.try_acquire().await
    }

    pub async fn release_lock(&self) -> Result<(), Error> {
        self.locker.release().await
    }

    /// Suspends until no refresh is in progress.
    pub async fn wait_for_release(&self) -> Result<(), Error> {
        self.locker.wait_for_release().await
    }

    /// Whether storage was refreshed after this proxy last built a header.
    pub async fn is_updated(&self) -> Result<bool, Error> {
        let Some(last_read) = self.last_read_timestamp() else {
            return Ok(false);
        };
        let state = self.storage.get().await?;
        Ok(state.last_refresh_timestamp > last_read)
    }

    /// A fresh read of the stored state, bypassing the locker.
    pub async fn current_state(&self) -> Result<TokenState, Error> {
        self.storage.get().await
    }

    pub fn last_read_timestamp(&self) -> Option<f64> {
        *self
            .last_read_timestamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mark_read(&self) {
        let mut last_read = self
            .last_read_timestamp
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *last_read = Some(unix_now());
    }
}
