//! Locked JSON file storage
//!
//! Every shared resource (document, rule set, scheduler queue, ...) lives in
//! its own JSON file under the data directory and is guarded by its own
//! async mutex. Callers that read a resource in order to write it back must
//! go through [`Store::update`], which holds the resource lock across the
//! whole load-modify-save sequence.
//!
//! The locks live in memory and are shared only by clones of one [`Store`].
//! There is no cross-process file locking, so a data directory must be
//! owned by a single process running a single `Store`.

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::fs;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A value persisted as one JSON file
pub trait Resource: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// File name inside the data directory; also the lock key
    const FILE_NAME: &'static str;
}

/// Store errors
///
/// Only writes can fail: a missing or unreadable file is read back as the
/// resource default.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to write {resource}: {source}")]
    Write {
        resource: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {resource}: {source}")]
    Serialize {
        resource: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Typed access to the JSON resources of one data directory
///
/// Cloning is cheap and clones share the same locks. Two stores created
/// separately over the same directory do not coordinate.
#[derive(Clone)]
pub struct Store {
    data_dir: Arc<PathBuf>,
    locks: Arc<DashMap<&'static str, Arc<Mutex<()>>>>,
}

impl Store {
    /// Create a store rooted at `data_dir`
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Arc::new(data_dir.into()),
            locks: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the file backing `R`
    #[must_use]
    pub fn path_of<R: Resource>(&self) -> PathBuf {
        self.data_dir.join(R::FILE_NAME)
    }

    async fn lock<R: Resource>(&self) -> OwnedMutexGuard<()> {
        let mutex = Arc::clone(&self.locks.entry(R::FILE_NAME).or_default());
        mutex.lock_owned().await
    }

    /// Load the last successfully written value of `R`
    ///
    /// Falls back to the `.bak` copy, then to `R::default()`.
    pub async fn load<R: Resource>(&self) -> R {
        let _guard = self.lock::<R>().await;
        read_or_default(&self.path_of::<R>()).await
    }

    /// Replace `R` on disk
    pub async fn save<R: Resource>(&self, value: &R) -> Result<(), StoreError> {
        let _guard = self.lock::<R>().await;
        write_atomic(&self.path_of::<R>(), R::FILE_NAME, value).await
    }

    /// Read-modify-write `R` inside a single critical section
    ///
    /// The closure's return value is handed back once the new value has
    /// been written.
    pub async fn update<R, T, F>(&self, f: F) -> Result<T, StoreError>
    where
        R: Resource,
        F: FnOnce(&mut R) -> T,
    {
        let _guard = self.lock::<R>().await;
        let path = self.path_of::<R>();
        let mut value: R = read_or_default(&path).await;
        let out = f(&mut value);
        write_atomic(&path, R::FILE_NAME, &value).await?;
        Ok(out)
    }

    /// Write the default value of `R` if its file does not exist yet
    ///
    /// Returns `true` when a file was created.
    pub async fn ensure<R: Resource>(&self) -> Result<bool, StoreError> {
        let _guard = self.lock::<R>().await;
        let path = self.path_of::<R>();
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(false);
        }
        write_atomic(&path, R::FILE_NAME, &R::default()).await?;
        tracing::info!("Created default {} at {:?}", R::FILE_NAME, path);
        Ok(true)
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

async fn read_json<R: Resource>(path: &Path) -> Option<R> {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<R>(&contents) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Failed to parse {:?}: {}", path, e);
                None
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No file found at {:?}", path);
            None
        }
        Err(e) => {
            tracing::warn!("Failed to read {:?}: {}", path, e);
            None
        }
    }
}

async fn read_or_default<R: Resource>(path: &Path) -> R {
    if let Some(value) = read_json(path).await {
        return value;
    }
    if let Some(value) = read_json(&backup_path(path)).await {
        tracing::info!("Recovered {} from backup", R::FILE_NAME);
        return value;
    }
    R::default()
}

async fn write_atomic<R: Resource>(
    path: &Path,
    resource: &'static str,
    value: &R,
) -> Result<(), StoreError> {
    let write_err = |source| StoreError::Write { resource, source };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|source| StoreError::Serialize { resource, source })?;

    // Write atomically: write to temp file, keep the previous copy, then rename
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &json).await.map_err(write_err)?;
    if fs::try_exists(path).await.unwrap_or(false) {
        if let Err(e) = fs::copy(path, backup_path(path)).await {
            tracing::warn!("Failed to back up {:?}: {}", path, e);
        }
    }
    fs::rename(&tmp_path, path).await.map_err(write_err)?;

    tracing::debug!("Saved {} to {:?}", resource, path);
    Ok(())
}
