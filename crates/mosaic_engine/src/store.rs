use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use mosaic_core::{CanonicalMedia, MediaType};
use tokio::time::Instant;

/// Key/value cache with per-entry expiry.
#[async_trait::async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
    async fn delete(&self, key: &str);
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        match entries.get(key) {
            Some((value, expires)) if *expires > Instant::now() => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        let expires = Instant::now() + ttl;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (value, expires));
    }

    async fn delete(&self, key: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("repository error: {0}")]
pub struct RepositoryError(pub String);

/// Durable store of resolved records, keyed by seed id and media type.
#[async_trait::async_trait]
pub trait MediaRepository: Send + Sync {
    async fn get(&self, id: &str, media_type: MediaType) -> Result<Option<CanonicalMedia>, RepositoryError>;
    async fn upsert(&self, media: &CanonicalMedia) -> Result<(), RepositoryError>;
}

#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: Mutex<HashMap<(String, MediaType), CanonicalMedia>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl MediaRepository for MemoryRepository {
    async fn get(&self, id: &str, media_type: MediaType) -> Result<Option<CanonicalMedia>, RepositoryError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&(id.to_string(), media_type))
            .cloned())
    }

    async fn upsert(&self, media: &CanonicalMedia) -> Result<(), RepositoryError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((media.id.clone(), media.media_type), media.clone());
        Ok(())
    }
}
