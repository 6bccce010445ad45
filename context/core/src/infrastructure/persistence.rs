// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Persistence Store Implementations
//!
//! Two implementations of [`PersistenceStore`]:
//!
//! - [`InMemoryPersistenceStore`]: process-local map, for tests and embedded use.
//! - [`LocalDirectoryStore`]: one file per key under a base directory, written
//!   via a temp file and rename so a crash never leaves a half-written value.
//!
//! **Limitations:**
//! - No locking across processes sharing a directory
//! - Keys are restricted to `[A-Za-z0-9._-]` so they map 1:1 onto file names

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::domain::persistence::{PersistenceError, PersistenceStore};

/// In-memory key/value store
#[derive(Default)]
pub struct InMemoryPersistenceStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryPersistenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl PersistenceStore for InMemoryPersistenceStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Filesystem-backed key/value store
pub struct LocalDirectoryStore {
    base_path: PathBuf,
}

impl LocalDirectoryStore {
    /// Create the store, creating `base_path` if needed.
    pub fn new(base_path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path)?;
        Ok(Self { base_path })
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && !key.starts_with('.')
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'));
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(format!("{}.json", key)))
    }
}

#[async_trait]
impl PersistenceStore for LocalDirectoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.resolve(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), PersistenceError> {
        let path = self.resolve(key)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &value).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_in_memory_round_trip() {
        let store = InMemoryPersistenceStore::new();
        assert!(store.get("missing").await.unwrap().is_none());
        store.put("k", b"value".to_vec()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"value".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_directory_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = LocalDirectoryStore::new(dir.path()).unwrap();

        assert!(store.get("context_history.samples").await.unwrap().is_none());
        store
            .put("context_history.samples", b"[1,2,3]".to_vec())
            .await
            .unwrap();
        assert_eq!(
            store.get("context_history.samples").await.unwrap(),
            Some(b"[1,2,3]".to_vec())
        );

        store.put("context_history.samples", b"[]".to_vec()).await.unwrap();
        assert_eq!(
            store.get("context_history.samples").await.unwrap(),
            Some(b"[]".to_vec())
        );
    }

    #[tokio::test]
    async fn test_directory_rejects_path_keys() {
        let dir = TempDir::new().unwrap();
        let store = LocalDirectoryStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.put("../escape", vec![]).await,
            Err(PersistenceError::InvalidKey(_))
        ));
        assert!(store.get("a/b").await.is_err());
    }
}
