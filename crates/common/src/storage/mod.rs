//! Artifact storage abstraction
//!
//! Thumbnail and export stages persist their artifacts through this
//! interface. Keys are content-addressed (SHA-256 of the bytes) under a
//! caller-supplied prefix, so repeated writes of identical content are
//! idempotent. Cloud backends are external collaborators behind the same
//! trait.

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;

/// Reference to a stored artifact
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageRef {
    pub key: String,
    pub size_bytes: u64,
}

/// Byte storage used by the thumbnail and export stages
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Store bytes under a content-addressed key below `prefix`
    async fn store(&self, prefix: &str, extension: &str, bytes: &[u8]) -> Result<StorageRef>;

    /// Retrieve bytes by key
    async fn retrieve(&self, key: &str) -> Result<Vec<u8>>;
}

/// Content-addressed key: `<prefix>/<sha256-hex>.<ext>`
pub fn content_key(prefix: &str, extension: &str, bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!(
        "{}/{}.{}",
        prefix.trim_end_matches('/'),
        hex::encode(digest),
        extension
    )
}

/// SHA-256 hex digest of arbitrary bytes (upload fingerprinting)
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Local-filesystem storage rooted at a configured directory
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl StorageService for LocalStorage {
    async fn store(&self, prefix: &str, extension: &str, bytes: &[u8]) -> Result<StorageRef> {
        let key = content_key(prefix, extension, bytes);
        let path = self.path_for(&key);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await?;

        Ok(StorageRef {
            key,
            size_bytes: bytes.len() as u64,
        })
    }

    async fn retrieve(&self, key: &str) -> Result<Vec<u8>> {
        tokio::fs::read(self.path_for(key))
            .await
            .map_err(|e| AppError::Storage {
                message: format!("read {}: {}", key, e),
            })
    }
}

/// In-memory storage for tests
pub struct InMemoryStorage {
    objects: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageService for InMemoryStorage {
    async fn store(&self, prefix: &str, extension: &str, bytes: &[u8]) -> Result<StorageRef> {
        let key = content_key(prefix, extension, bytes);
        self.objects
            .write()
            .await
            .insert(key.clone(), bytes.to_vec());
        Ok(StorageRef {
            key,
            size_bytes: bytes.len() as u64,
        })
    }

    async fn retrieve(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| AppError::Storage {
                message: format!("object not found: {}", key),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_key_is_deterministic() {
        let a = content_key("thumbs/job1", "jpg", b"pixels");
        let b = content_key("thumbs/job1/", "jpg", b"pixels");
        assert_eq!(a, b);
        assert!(a.starts_with("thumbs/job1/"));
        assert!(a.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn test_in_memory_store_retrieve() {
        let storage = InMemoryStorage::new();
        let stored = storage.store("exports", "json", b"{}").await.unwrap();
        assert_eq!(stored.size_bytes, 2);

        let bytes = storage.retrieve(&stored.key).await.unwrap();
        assert_eq!(bytes, b"{}");
    }

    #[tokio::test]
    async fn test_identical_content_is_idempotent() {
        let storage = InMemoryStorage::new();
        let a = storage.store("thumbs", "jpg", b"frame").await.unwrap();
        let b = storage.store("thumbs", "jpg", b"frame").await.unwrap();
        assert_eq!(a.key, b.key);
        assert_eq!(storage.len().await, 1);
    }

    #[tokio::test]
    async fn test_missing_key_errors() {
        let storage = InMemoryStorage::new();
        assert!(storage.retrieve("thumbs/missing.jpg").await.is_err());
    }
}
