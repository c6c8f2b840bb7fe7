//! In-process cache store.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::http::{Request, Response};

use super::traits::{ensure_storable, CacheStore, CacheSummary, StoredEntry};

#[derive(Debug, Default)]
struct NamedCache {
  name: String,
  entries: Vec<StoredEntry>,
}

/// Cache store kept in memory. Lost when the process exits.
///
/// An optional quota caps the summed body size across all caches; a put that
/// would exceed it fails with `StoreError::QuotaExceeded`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
  caches: Mutex<Vec<NamedCache>>,
  quota: Option<u64>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  #[allow(dead_code)]
  pub fn with_quota(quota: u64) -> Self {
    Self {
      caches: Mutex::new(Vec::new()),
      quota: Some(quota),
    }
  }

  fn lock(&self) -> Result<MutexGuard<'_, Vec<NamedCache>>, StoreError> {
    self
      .caches
      .lock()
      .map_err(|e| StoreError::Unavailable(format!("lock poisoned: {}", e)))
  }
}

fn used_bytes(caches: &[NamedCache]) -> u64 {
  caches
    .iter()
    .flat_map(|c| c.entries.iter())
    .map(|e| e.response.body.len() as u64)
    .sum()
}

#[async_trait]
impl CacheStore for MemoryStorage {
  async fn open(&self, cache_name: &str) -> Result<(), StoreError> {
    let mut caches = self.lock()?;
    if !caches.iter().any(|c| c.name == cache_name) {
      caches.push(NamedCache {
        name: cache_name.to_string(),
        entries: Vec::new(),
      });
    }
    Ok(())
  }

  async fn has(&self, cache_name: &str) -> Result<bool, StoreError> {
    Ok(self.lock()?.iter().any(|c| c.name == cache_name))
  }

  async fn keys(&self) -> Result<Vec<String>, StoreError> {
    Ok(self.lock()?.iter().map(|c| c.name.clone()).collect())
  }

  async fn delete(&self, cache_name: &str) -> Result<bool, StoreError> {
    let mut caches = self.lock()?;
    let before = caches.len();
    caches.retain(|c| c.name != cache_name);
    Ok(caches.len() < before)
  }

  async fn put(
    &self,
    cache_name: &str,
    request: &Request,
    response: &Response,
  ) -> Result<(), StoreError> {
    ensure_storable(request, response)?;

    let mut caches = self.lock()?;
    let key = request.key();

    if let Some(quota) = self.quota {
      let replaced: u64 = caches
        .iter()
        .filter(|c| c.name == cache_name)
        .flat_map(|c| c.entries.iter())
        .filter(|e| e.request.key() == key)
        .map(|e| e.response.body.len() as u64)
        .sum();
      let used = used_bytes(&caches) - replaced;
      if used + response.body.len() as u64 > quota {
        return Err(StoreError::QuotaExceeded { used, quota });
      }
    }

    let idx = match caches.iter().position(|c| c.name == cache_name) {
      Some(idx) => idx,
      None => {
        caches.push(NamedCache {
          name: cache_name.to_string(),
          entries: Vec::new(),
        });
        caches.len() - 1
      }
    };

    let cache = &mut caches[idx];
    cache.entries.retain(|e| e.request.key() != key);
    cache.entries.push(StoredEntry {
      request: request.clone(),
      response: response.clone(),
      cached_at: Utc::now(),
    });

    Ok(())
  }

  async fn match_in(
    &self,
    cache_name: &str,
    request: &Request,
  ) -> Result<Option<Response>, StoreError> {
    let caches = self.lock()?;
    Ok(
      caches
        .iter()
        .find(|c| c.name == cache_name)
        .and_then(|c| c.entries.iter().find(|e| e.matches(request)))
        .map(|e| e.response.clone()),
    )
  }

  async fn summary(&self, cache_name: &str) -> Result<CacheSummary, StoreError> {
    let caches = self.lock()?;
    let Some(cache) = caches.iter().find(|c| c.name == cache_name) else {
      return Ok(CacheSummary::default());
    };
    Ok(CacheSummary {
      entries: cache.entries.len(),
      body_bytes: cache
        .entries
        .iter()
        .map(|e| e.response.body.len() as u64)
        .sum(),
      last_cached_at: cache.entries.iter().map(|e| e.cached_at).max(),
    })
  }
}
