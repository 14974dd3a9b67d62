// src/objects/mod.rs

//! Byte-level object store used to persist and retrieve serialized payloads
//! and the entity batches referenced by them.

use std::fmt::Debug;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, anyhow};
use async_trait::async_trait;

use crate::errors::{EtlError, Result};

pub mod memory;

pub use memory::InMemoryObjectStore;

/// Abstract object store keyed by `/`-separated paths.
#[async_trait]
pub trait ObjectStore: Send + Sync + Debug {
    async fn get(&self, path: &str) -> Result<Vec<u8>>;
    async fn put(&self, path: &str, contents: Vec<u8>) -> Result<()>;
}

/// Object store backed by a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileObjectStore {
    root: PathBuf,
}

impl FileObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map an object path onto the root directory, refusing anything that
    /// would escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || relative.as_os_str().is_empty() {
            return Err(EtlError::object_store(path, "invalid object path"));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FileObjectStore {
    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path)?;
        let bytes = tokio::task::spawn_blocking(move || {
            std::fs::read(&full).with_context(|| format!("reading object {:?}", full))
        })
        .await
        .map_err(|e| EtlError::object_store(path, e))?
        .map_err(|e| EtlError::object_store(path, format!("{e:#}")))?;
        Ok(bytes)
    }

    async fn put(&self, path: &str, contents: Vec<u8>) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::task::spawn_blocking(move || -> anyhow::Result<()> {
            let parent = full
                .parent()
                .ok_or_else(|| anyhow!("object {:?} has no parent directory", full))?;
            std::fs::create_dir_all(parent).with_context(|| format!("creating dir {:?}", parent))?;
            std::fs::write(&full, &contents).with_context(|| format!("writing object {:?}", full))?;
            Ok(())
        })
        .await
        .map_err(|e| EtlError::object_store(path, e))?
        .map_err(|e| EtlError::object_store(path, format!("{e:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_creates_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::new(dir.path());

        store.put("a/b/c.json", b"[1,2]".to_vec()).await.unwrap();
        assert!(dir.path().join("a/b/c.json").is_file());
        assert_eq!(store.get("/a/b/c.json").await.unwrap(), b"[1,2]".to_vec());
    }

    #[tokio::test]
    async fn missing_object_is_an_object_store_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::new(dir.path());

        match store.get("nope.json").await {
            Err(EtlError::ObjectStoreError { path, .. }) => assert_eq!(path, "nope.json"),
            other => panic!("expected ObjectStoreError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn parent_traversal_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileObjectStore::new(dir.path());
        assert!(store.put("../escape.json", Vec::new()).await.is_err());
        assert!(store.get("").await.is_err());
    }
}
