//! In-memory store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::KvStore;
use crate::{HuginnError, Result};

/// Process-local [`KvStore`] backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> T) -> Result<T> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| HuginnError::Storage("memory store lock poisoned".into()))?;
        Ok(f(&mut entries))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.with_entries(|entries| entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        self.with_entries(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    async fn len(&self) -> Result<usize> {
        self.with_entries(|entries| entries.len())
    }

    async fn remove_many(&self, keys: &[String]) -> Result<()> {
        self.with_entries(|entries| {
            for key in keys {
                entries.remove(key);
            }
        })
    }

    async fn keys(&self, prefix: &str) -> Result<Vec<String>> {
        self.with_entries(|entries| {
            entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect()
        })
    }
}
