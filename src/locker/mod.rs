//! Coordination primitive serializing refresh attempts.

use async_trait::async_trait;

use crate::errors::Error;

mod local;

pub use local::LocalLocker;

/// Binary free/held lock with a non-blocking acquire and a wait that never acquires.
///
/// Ownership is not enforced: only the caller that saw `try_acquire() == true`
/// should call `release`. Cross-process implementations (shared store with a
/// lease, database advisory lock) must keep the same three operations.
#[async_trait]
pub trait Locker: Send + Sync {
    /// Moves free -> held and returns `true`, or returns `false` untouched if held.
    async fn try_acquire(&self) -> Result<bool, Error>;

    /// Returns once the lock is free. Does not take the lock.
    async fn wait_for_release(&self) -> Result<(), Error>;

    /// Moves held -> free. A no-op when already free.
    async fn release(&self) -> Result<(), Error>;
}
