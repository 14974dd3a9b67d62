// src/objects/memory.rs

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::ObjectStore;
use crate::errors::{EtlError, Result};

#[derive(Debug, Clone, Default)]
pub struct InMemoryObjectStore {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    gets: Arc<AtomicUsize>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_object(&self, path: impl Into<String>, content: impl Into<Vec<u8>>) {
        let mut objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.insert(normalize(&path.into()), content.into());
    }

    /// Store `value` as JSON at `path`.
    pub fn add_json<T: serde::Serialize>(&self, path: impl Into<String>, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.add_object(path, bytes);
        Ok(())
    }

    pub fn contains(&self, path: &str) -> bool {
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects.contains_key(&normalize(path))
    }

    /// Number of `get` calls served so far, hits and misses alike.
    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

fn normalize(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        let objects = self.objects.lock().unwrap_or_else(|e| e.into_inner());
        objects
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| EtlError::object_store(path, "object not found"))
    }

    async fn put(&self, path: &str, contents: Vec<u8>) -> Result<()> {
        self.add_object(path, contents);
        Ok(())
    }
}
