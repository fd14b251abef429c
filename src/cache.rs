//! Content-addressed memo of model responses. A response is keyed by the
//! exact question and the ordered contents of the images it was asked about

use crate::ingest::EncodedImage;
use crate::model::ModelResponse;
use crate::question::Query;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// SHA-256 over the length-prefixed query followed by the image digests
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    pub fn new(query: &Query, images: &[EncodedImage]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((query.as_str().len() as u64).to_be_bytes());
        hasher.update(query.as_str().as_bytes());
        hasher.update((images.len() as u64).to_be_bytes());
        for image in images {
            hasher.update(image.digest());
        }
        CacheKey(hasher.finalize().into())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", hex::encode(&self.0[..8]))
    }
}

/// Cache counters, as reported by `GET /cache/status`
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

#[derive(Debug, Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<CacheKey, ModelResponse>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, ModelResponse>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a response, counting the hit or miss
    pub fn get(&self, key: &CacheKey) -> Option<ModelResponse> {
        let found = self.entries().get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        debug!("cache {} for {key:?}", if found.is_some() { "hit" } else { "miss" });
        found
    }

    /// Like `get`, but leaves the counters alone
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries().contains_key(key)
    }

    pub fn insert(&self, key: CacheKey, response: ModelResponse) {
        self.entries().insert(key, response);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry, returning how many there were
    pub fn clear(&self) -> usize {
        let mut entries = self.entries();
        let evicted = entries.len();
        entries.clear();
        evicted
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}
