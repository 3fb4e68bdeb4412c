//! Local key-value persistence.
//!
//! The rate bucket and the response cache both live in a [`KvStore`]. The
//! trait is the only thing they depend on, so embedders can back it with
//! whatever durable storage the host offers (browser storage bridge, sqlite,
//! a plain file).
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryStore`] — process-local, lost on exit. Tests and ephemeral use.
//! - [`FileStore`] — a single JSON document on disk, rewritten atomically
//!   on every mutation.
//!
//! Store calls are suspension points. Implementations must not hold the lock
//! guarding their entry map across an `.await`.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::Result;

/// Minimal string key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite a value.
    async fn set(&self, key: &str, value: String) -> Result<()>;

    /// Total number of keys in the store.
    async fn len(&self) -> Result<usize>;

    /// Remove all listed keys. Missing keys are ignored.
    async fn remove_many(&self, keys: &[String]) -> Result<()>;

    /// All keys starting with `prefix`, in no particular order.
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Whether the store holds no keys.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}
