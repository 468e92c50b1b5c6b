//! Storage port - raw document reads/writes behind a trait
//!
//! The engine persists four JSON documents (macros, categories, active set,
//! ordering). [`SledStorage`] keeps them in an embedded sled database;
//! [`MemoryStorage`] keeps them in a map for tests and dry runs.

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};

/// Persisted documents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Document {
    Macros,
    Categories,
    ActiveSet,
    Ordering,
}

impl Document {
    pub fn key(&self) -> &'static str {
        match self {
            Document::Macros => "macros",
            Document::Categories => "macro_categories",
            Document::ActiveSet => "active_macros",
            Document::Ordering => "macro_order",
        }
    }

    /// Key holding the last unparsable copy of this document
    pub fn corrupt_key(&self) -> String {
        format!("{}.corrupt", self.key())
    }
}

impl std::fmt::Display for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Read/write access to raw persisted documents
#[async_trait]
pub trait StoragePort: Send + Sync {
    /// Raw bytes stored under `key`, if any
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Replace the bytes stored under `key`
    async fn write(&self, key: &str, data: Vec<u8>) -> Result<()>;
}

/// Sled-backed storage
#[derive(Clone)]
pub struct SledStorage {
    db: sled::Db,
}

impl SledStorage {
    /// Open (or create) the sled database at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)
            .with_context(|| format!("Failed to open sled database at {}", path.display()))?;
        debug!("Opened macro database at {}", path.display());
        Ok(Self { db })
    }
}

#[async_trait]
impl StoragePort for SledStorage {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let db = self.db.clone();
        let key = key.to_string();
        let value = tokio::task::spawn_blocking(move || db.get(key.as_bytes()))
            .await
            .context("Sled read task panicked")?
            .context("Failed to read from sled")?;
        Ok(value.map(|v| v.to_vec()))
    }

    async fn write(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let db = self.db.clone();
        let owned_key = key.to_string();
        tokio::task::spawn_blocking(move || {
            db.insert(owned_key.as_bytes(), data)?;
            db.flush()?;
            Ok::<_, sled::Error>(())
        })
        .await
        .context("Sled write task panicked")?
        .with_context(|| format!("Failed to write '{}' to sled", key))?;
        trace!("Wrote '{}' to sled", key);
        Ok(())
    }
}

/// In-memory storage
#[derive(Default)]
pub struct MemoryStorage {
    docs: Mutex<HashMap<String, Vec<u8>>>,
    writes: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document before loading
    pub fn with_raw(self, key: &str, data: impl Into<Vec<u8>>) -> Self {
        self.docs.lock().insert(key.to_string(), data.into());
        self
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.docs.lock().get(key).cloned()
    }

    /// Number of writes performed so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StoragePort for MemoryStorage {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.docs.lock().get(key).cloned())
    }

    async fn write(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.docs.lock().insert(key.to_string(), data);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sled_write_then_read() {
        let temp = tempdir().unwrap();
        let storage = SledStorage::open(temp.path().join("macros.sled")).unwrap();

        storage
            .write(Document::ActiveSet.key(), b"[\"a\"]".to_vec())
            .await
            .unwrap();

        let data = storage.read(Document::ActiveSet.key()).await.unwrap();
        assert_eq!(data.as_deref(), Some(&b"[\"a\"]"[..]));
        assert!(storage.read(Document::Macros.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_storage_counts_writes() {
        let storage = MemoryStorage::new().with_raw("k", "v");
        assert_eq!(storage.read("k").await.unwrap(), Some(b"v".to_vec()));

        storage.write("k", b"w".to_vec()).await.unwrap();
        assert_eq!(storage.write_count(), 1);
        assert_eq!(storage.raw("k"), Some(b"w".to_vec()));
    }

    #[test]
    fn test_corrupt_key() {
        assert_eq!(Document::Macros.corrupt_key(), "macros.corrupt");
    }
}
