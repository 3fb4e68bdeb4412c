//! JSON-file store.
//!
//! The whole store is one JSON object on disk. It is loaded once on
//! [`FileStore::open`] and rewritten (temp file + rename) after every
//! mutation, so a crash mid-write leaves the previous snapshot intact.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::KvStore;
use crate::{HuginnError, Result};

/// File name used under the platform data directory.
const DEFAULT_FILE_NAME: &str = "store.json";

/// Durable [`KvStore`] persisted as a JSON document.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<HashMap<String, String>>,
    /// Serializes flushes so an older snapshot never overwrites a newer one.
    flush_gate: tokio::sync::Mutex<()>,
}

impl FileStore {
    /// Open (or lazily create) a store at `path`.
    ///
    /// A missing file yields an empty store; an unreadable one is an error
    /// rather than silently discarding persisted state.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => HashMap::new(),
            Ok(content) => serde_json::from_str(&content).map_err(|e| {
                HuginnError::Storage(format!("corrupt store file {path:?}: {e}"))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(HuginnError::Storage(format!(
                    "failed to read store file {path:?}: {e}"
                )));
            }
        };
        debug!(path = %path.display(), entries = entries.len(), "opened file store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
            flush_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Open the store at [`default_path`](Self::default_path).
    pub async fn open_default() -> Result<Self> {
        Self::open(Self::default_path()).await
    }

    /// `<data dir>/huginn/store.json`, honouring `HUGINN_DATA_DIR`.
    pub fn default_path() -> PathBuf {
        std::env::var("HUGINN_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                dirs::data_dir()
                    .unwrap_or_else(|| PathBuf::from(".data"))
                    .join("huginn")
            })
            .join(DEFAULT_FILE_NAME)
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| HuginnError::Storage("file store lock poisoned".into()))
    }

    /// Apply `mutate` and persist the resulting snapshot.
    async fn mutate_and_flush(
        &self,
        mutate: impl FnOnce(&mut HashMap<String, String>),
    ) -> Result<()> {
        let _gate = self.flush_gate.lock().await;
        let snapshot = {
            let mut entries = self.lock()?;
            mutate(&mut entries);
            serde_json::to_string(&*entries)?
        };
        self.write_atomically(&snapshot).await
    }

    async fn write_atomically(&self, snapshot: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                HuginnError::Storage(format!("failed to create {parent:?}: {e}"))
            })?;
        }

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, snapshot)
            .await
            .map_err(|e| HuginnError::Storage(format!("failed to write {tmp:?}: {e}")))?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            warn!(path = %self.path.display(), error = %e, "store rename failed");
            return Err(HuginnError::Storage(format!(
                "failed to replace {:?}: {e}",
                self.path
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let key = key.to_string();
        self.mutate_and_flush(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.mutate_and_flush(|entries| {
            for key in keys {
                entries.remove(key);
            }
        })
        .await
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .lock()?
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }
}
