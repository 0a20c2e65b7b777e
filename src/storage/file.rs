use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::errors::Error;
use crate::token::TokenState;

use super::TokenStorage;

/// JSON record in a single file.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// concurrent reader never observes a partial record. Writers within this
/// process are serialized by `write_lock`; writers in other processes are
/// expected to be serialized by the refresh locker they share.
#[derive(Debug)]
pub struct FileTokenStorage {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileTokenStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tokens".to_string());
        self.path
            .with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()))
    }
}

#[async_trait]
impl TokenStorage for FileTokenStorage {
    async fn get(&self) -> Result<TokenState, Error> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            Error::StorageUnavailable(format!("failed to read {}: {e}", self.path.display()))
        })?;
        serde_json::from_str(&contents).map_err(|e| {
            Error::StorageUnavailable(format!("failed to decode {}: {e}", self.path.display()))
        })
    }

    async fn update(&self, state: &TokenState) -> Result<(), Error> {
        let json = serde_json::to_vec_pretty(state)
            .map_err(|e| Error::StorageUnavailable(format!("failed to encode tokens: {e}")))?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::StorageUnavailable(format!("failed to create {}: {e}", parent.display()))
            })?;
        }

        let tmp = self.temp_path();
        if let Err(e) = write_synced(&tmp, &json).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::StorageUnavailable(format!(
                "failed to write {}: {e}",
                tmp.display()
            )));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::StorageUnavailable(format!(
                "failed to replace {}: {e}",
                self.path.display()
            )));
        }
        debug!(path = %self.path.display(), "token_storage.updated");
        Ok(())
    }
}

/// Writes `bytes` and flushes them to disk before the rename makes them visible.
async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}
