//! Core traits and types for the caching system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;

use crate::error::StoreError;
use crate::http::headers::{vary_header_names, vary_matches};
use crate::http::{Request, Response};

/// Named-cache storage, shared by every concurrent request handler.
///
/// Writes overwrite by request key; the last writer for a key wins.
#[async_trait]
pub trait CacheStore: Send + Sync + 'static {
  /// Open the named cache, creating it if it does not exist.
  async fn open(&self, cache_name: &str) -> Result<(), StoreError>;

  /// Whether a cache with this name exists.
  async fn has(&self, cache_name: &str) -> Result<bool, StoreError>;

  /// Names of all caches, oldest first.
  async fn keys(&self) -> Result<Vec<String>, StoreError>;

  /// Delete a cache and all of its entries. Returns false if it did not exist.
  async fn delete(&self, cache_name: &str) -> Result<bool, StoreError>;

  /// Store a response for the request, creating the cache if needed.
  async fn put(
    &self,
    cache_name: &str,
    request: &Request,
    response: &Response,
  ) -> Result<(), StoreError>;

  /// Look up a request in one cache.
  async fn match_in(
    &self,
    cache_name: &str,
    request: &Request,
  ) -> Result<Option<Response>, StoreError>;

  /// Entry count, body size and last write of one cache.
  async fn summary(&self, cache_name: &str) -> Result<CacheSummary, StoreError>;

  /// Look up a request across every cache, oldest cache first.
  async fn match_any(&self, request: &Request) -> Result<Option<Response>, StoreError> {
    for cache_name in self.keys().await? {
      if let Some(response) = self.match_in(&cache_name, request).await? {
        return Ok(Some(response));
      }
    }
    Ok(None)
  }
}

/// A stored request/response pair.
#[derive(Debug, Clone)]
pub struct StoredEntry {
  pub request: Request,
  pub response: Response,
  pub cached_at: DateTime<Utc>,
}

impl StoredEntry {
  /// Whether this entry answers the query request
  pub fn matches(&self, query: &Request) -> bool {
    self.request.key() == query.key()
      && vary_matches(self.response.vary(), &query.headers, &self.request.headers)
  }
}

/// Size information about one cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSummary {
  pub entries: usize,
  pub body_bytes: u64,
  pub last_cached_at: Option<DateTime<Utc>>,
}

/// Reject what no cache may hold: non-GET requests, partial responses and
/// responses that vary on `*` (they could never be matched again).
pub fn ensure_storable(request: &Request, response: &Response) -> Result<(), StoreError> {
  if request.method != Method::GET {
    return Err(StoreError::NotStorable(format!(
      "{} requests are never cached",
      request.method
    )));
  }
  if response.status == reqwest::StatusCode::PARTIAL_CONTENT {
    return Err(StoreError::NotStorable(
      "partial content cannot be cached".to_string(),
    ));
  }
  if response
    .vary()
    .is_some_and(|vary| vary_header_names(vary).iter().any(|name| name == "*"))
  {
    return Err(StoreError::NotStorable(
      "responses with Vary: * cannot be cached".to_string(),
    ));
  }
  Ok(())
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Found in one of the caches
  Cache,
  /// Fetched from the network
  Network,
  /// Network unavailable, serving an offline fallback
  Offline,
  /// The cache store failed
  Error,
}

impl ResponseSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseSource::Cache => "cache",
      ResponseSource::Network => "network",
      ResponseSource::Offline => "offline",
      ResponseSource::Error => "error",
    }
  }
}
