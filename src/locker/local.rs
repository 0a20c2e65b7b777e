use async_trait::async_trait;
use tokio::sync::watch;
use tracing::trace;

use crate::errors::Error;

use super::Locker;

/// In-process locker for tasks sharing one runtime or several threads.
///
/// There is no lease: a holder that is dropped without calling `release`
/// keeps every waiter suspended. Callers that need a bound should use a
/// wait timeout.
#[derive(Debug)]
pub struct LocalLocker {
    held: watch::Sender<bool>,
}

impl LocalLocker {
    pub fn new() -> Self {
        Self {
            held: watch::Sender::new(false),
        }
    }

    pub fn is_held(&self) -> bool {
        *self.held.borrow()
    }
}

impl Default for LocalLocker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Locker for LocalLocker {
    async fn try_acquire(&self) -> Result<bool, Error> {
        let acquired = self.held.send_if_modified(|held| {
            if *held {
                false
            } else {
                *held = true;
                true
            }
        });
        trace!(acquired, "locker.try_acquire");
        Ok(acquired)
    }

    async fn wait_for_release(&self) -> Result<(), Error> {
        let mut rx = self.held.subscribe();
        // The sender lives in `self`, so the channel cannot close under us.
        let _ = rx.wait_for(|held| !*held).await;
        Ok(())
    }

    async fn release(&self) -> Result<(), Error> {
        let released = self.held.send_if_modified(|held| std::mem::replace(held, false));
        trace!(released, "locker.release");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_until_release() {
        let locker = LocalLocker::new();
        assert!(locker.try_acquire().await.unwrap());
        assert!(!locker.try_acquire().await.unwrap());
        locker.release().await.unwrap();
        assert!(locker.try_acquire().await.unwrap());
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let locker = LocalLocker::new();
        locker.release().await.unwrap();
        locker.release().await.unwrap();
        assert!(!locker.is_held());
        assert!(locker.try_acquire().await.unwrap());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_free_and_does_not_acquire() {
        let locker = LocalLocker::new();
        tokio::time::timeout(Duration::from_secs(1), locker.wait_for_release())
            .await
            .expect("free lock must not block")
            .unwrap();
        assert!(!locker.is_held());
    }

    #[tokio::test]
    async fn wait_suspends_until_holder_releases() {
        let locker = Arc::new(LocalLocker::new());
        assert!(locker.try_acquire().await.unwrap());

        let waiter = tokio::spawn({
            let locker = Arc::clone(&locker);
            async move { locker.wait_for_release().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished(), "waiter must block while held");

        locker.release().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake on release")
            .unwrap()
            .unwrap();
        assert!(!locker.is_held());
    }
}
