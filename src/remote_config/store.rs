//! Persistence of the locally entered configuration fields.

use async_trait::async_trait;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use super::{ConfigKey, Configuration};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Stored configuration is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Storage task failed: {reason}")]
    Task { reason: String },
}

/// Flat key/value storage for configuration fields
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Everything stored so far; empty when nothing was saved yet
    async fn load(&self) -> Result<Configuration, StoreError>;

    /// Overlay the fields set in `fields` onto what is stored
    async fn set(&self, fields: &Configuration) -> Result<(), StoreError>;

    async fn remove(&self, key: ConfigKey) -> Result<(), StoreError>;
}

/// JSON file store; writers hold an exclusive advisory lock on the file
#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut Configuration) + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || update_locked(&path, change))
            .await
            .map_err(|e| StoreError::Task {
                reason: e.to_string(),
            })?
    }
}

fn parse_stored(text: &str) -> Result<Configuration, StoreError> {
    if text.trim().is_empty() {
        return Ok(Configuration::default());
    }
    Ok(serde_json::from_str(text)?)
}

fn update_locked<F>(path: &Path, change: F) -> Result<(), StoreError>
where
    F: FnOnce(&mut Configuration),
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;
    let mut lock = fd_lock::RwLock::new(file);
    let mut guard = lock.write()?;

    let mut text = String::new();
    guard.read_to_string(&mut text)?;
    let mut stored = parse_stored(&text)?;
    change(&mut stored);

    let json = serde_json::to_string_pretty(&stored)?;
    guard.set_len(0)?;
    guard.seek(SeekFrom::Start(0))?;
    guard.write_all(json.as_bytes())?;
    guard.sync_all()?;

    debug!(path = %path.display(), "Configuration store updated");
    Ok(())
}

#[async_trait]
impl ConfigStore for FileConfigStore {
    async fn load(&self) -> Result<Configuration, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => parse_stored(&text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Configuration::default()),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, fields: &Configuration) -> Result<(), StoreError> {
        let fields = fields.clone();
        self.update(move |stored| stored.merge(&fields)).await
    }

    async fn remove(&self, key: ConfigKey) -> Result<(), StoreError> {
        self.update(move |stored| stored.remove(key)).await
    }
}

/// Process-local store, used by tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    stored: Mutex<Configuration>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fields(fields: Configuration) -> Self {
        Self {
            stored: Mutex::new(fields),
        }
    }

    pub fn snapshot(&self) -> Configuration {
        self.stored.lock().map(|c| c.clone()).unwrap_or_default()
    }

    fn with_stored(&self, change: impl FnOnce(&mut Configuration)) -> Result<(), StoreError> {
        let mut stored = self.stored.lock().map_err(|e| StoreError::Task {
            reason: e.to_string(),
        })?;
        change(&mut stored);
        Ok(())
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn load(&self) -> Result<Configuration, StoreError> {
        Ok(self.snapshot())
    }

    async fn set(&self, fields: &Configuration) -> Result<(), StoreError> {
        self.with_stored(|stored| stored.merge(fields))
    }

    async fn remove(&self, key: ConfigKey) -> Result<(), StoreError> {
        self.with_stored(|stored| stored.remove(key))
    }
}
