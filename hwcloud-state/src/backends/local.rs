//! Local file backend
//!
//! State lives in a JSON file (default `hwcloud.state.json`); a sibling
//! `.lock` file created exclusively guards against concurrent runs.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::backend::{BackendError, BackendResult, StateBackend};
use crate::lock::LockInfo;
use crate::state::StateFile;

pub struct LocalBackend {
    state_path: PathBuf,
    lock_path: PathBuf,
}

impl LocalBackend {
    pub const DEFAULT_STATE_FILE: &'static str = "hwcloud.state.json";

    pub fn new() -> Self {
        Self::with_path(Self::DEFAULT_STATE_FILE)
    }

    pub fn with_path(state_path: impl Into<PathBuf>) -> Self {
        let state_path = state_path.into();
        let lock_path = state_path.with_extension("lock");
        Self {
            state_path,
            lock_path,
        }
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    async fn read_lock(&self) -> BackendResult<Option<LockInfo>> {
        match fs::read_to_string(&self.lock_path).await {
            Ok(content) => Ok(serde_json::from_str(&content).ok()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io(&self.lock_path)(e)),
        }
    }

    async fn remove_lock(&self) -> BackendResult<()> {
        fs::remove_file(&self.lock_path)
            .await
            .map_err(BackendError::io(&self.lock_path))
    }

    /// Create the lock file, failing if it already exists
    async fn try_create_lock(&self, lock: &LockInfo) -> BackendResult<bool> {
        let content = serde_json::to_vec_pretty(lock)?;
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.lock_path)
            .await;
        let mut file = match file {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(BackendError::io(&self.lock_path)(e)),
        };
        file.write_all(&content)
            .await
            .map_err(BackendError::io(&self.lock_path))?;
        file.flush().await.map_err(BackendError::io(&self.lock_path))?;
        Ok(true)
    }
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateBackend for LocalBackend {
    async fn read_state(&self) -> BackendResult<Option<StateFile>> {
        let content = match fs::read_to_string(&self.state_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BackendError::io(&self.state_path)(e)),
        };
        let state: StateFile =
            serde_json::from_str(&content).map_err(|source| BackendError::InvalidState {
                path: self.state_path.clone(),
                source,
            })?;
        if state.version > StateFile::CURRENT_VERSION {
            return Err(BackendError::UnsupportedVersion(state.version));
        }
        Ok(Some(state))
    }

    async fn write_state(&self, state: &StateFile) -> BackendResult<()> {
        if let Some(existing) = self.read_state().await?
            && existing.lineage != state.lineage
        {
            return Err(BackendError::LineageMismatch {
                expected: existing.lineage,
                actual: state.lineage.clone(),
            });
        }

        // Write next to the target and rename so a crash never leaves half a file
        let content = serde_json::to_string_pretty(state)?;
        let tmp_path = self.state_path.with_extension("json.tmp");
        fs::write(&tmp_path, content)
            .await
            .map_err(BackendError::io(&tmp_path))?;
        fs::rename(&tmp_path, &self.state_path)
            .await
            .map_err(BackendError::io(&self.state_path))?;
        log::debug!("Wrote state serial {} to {}", state.serial, self.state_path.display());
        Ok(())
    }

    async fn acquire_lock(&self, operation: &str) -> BackendResult<LockInfo> {
        let lock = LockInfo::new(operation);
        if self.try_create_lock(&lock).await? {
            return Ok(lock);
        }

        match self.read_lock().await? {
            Some(existing) if !existing.is_expired() => Err(BackendError::locked(&existing)),
            stale => {
                log::warn!(
                    "Removing stale lock {}",
                    stale.map(|l| l.id).unwrap_or_else(|| "(unreadable)".to_string())
                );
                self.remove_lock().await?;
                if self.try_create_lock(&lock).await? {
                    Ok(lock)
                } else {
                    // Another process won the race
                    match self.read_lock().await? {
                        Some(winner) => Err(BackendError::locked(&winner)),
                        None => Err(BackendError::LockNotFound(lock.id)),
                    }
                }
            }
        }
    }

    async fn release_lock(&self, lock: &LockInfo) -> BackendResult<()> {
        let existing = self
            .read_lock()
            .await?
            .ok_or_else(|| BackendError::LockNotFound(lock.id.clone()))?;
        if existing.id != lock.id {
            return Err(BackendError::LockMismatch {
                expected: lock.id.clone(),
                actual: existing.id,
            });
        }
        self.remove_lock().await
    }

    async fn force_unlock(&self, lock_id: &str) -> BackendResult<()> {
        if !fs::try_exists(&self.lock_path)
            .await
            .map_err(BackendError::io(&self.lock_path))?
        {
            return Err(BackendError::LockNotFound(lock_id.to_string()));
        }
        if let Some(existing) = self.read_lock().await?
            && existing.id != lock_id
        {
            return Err(BackendError::LockMismatch {
                expected: lock_id.to_string(),
                actual: existing.id,
            });
        }
        self.remove_lock().await
    }
}
