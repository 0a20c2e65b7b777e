//! Durable homes for [`TokenState`].

use async_trait::async_trait;

use crate::errors::Error;
use crate::token::TokenState;

mod file;
mod memory;

pub use file::FileTokenStorage;
pub use memory::MemoryTokenStorage;

/// Get/put access to the persisted credentials.
///
/// Implementations must make `update` atomic with respect to a concurrent
/// `get` on the same medium: a reader sees the old or the new state in full.
#[async_trait]
pub trait TokenStorage: Send + Sync {
    /// Fails with [`Error::StorageUnavailable`] when the medium cannot be read
    /// or the payload does not decode.
    async fn get(&self) -> Result<TokenState, Error>;

    /// Replaces the stored state. Fails with [`Error::StorageUnavailable`].
    async fn update(&self, state: &TokenState) -> Result<(), Error>;
}
