//! Control messages posted to the worker by pages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::cache::CacheStore;
use crate::error::StoreError;

/// Messages the worker understands, tagged by their `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// Activate a waiting worker now
  SkipWaiting,
  /// Report total cache size on the reply port
  GetCacheSize,
}

impl ClientMessage {
  /// Parse a posted payload. Unknown or malformed payloads yield None.
  pub fn parse(data: &Value) -> Option<Self> {
    Self::deserialize(data).ok()
  }
}

/// Reply to `GET_CACHE_SIZE`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSizeReply {
  /// Megabytes, rounded to two decimals
  pub cache_size: f64,
}

impl CacheSizeReply {
  pub fn into_value(self) -> Result<Value, serde_json::Error> {
    serde_json::to_value(self)
  }
}

/// Summed body size of every entry in every cache
pub async fn total_cache_bytes<S: CacheStore + ?Sized>(store: &S) -> Result<u64, StoreError> {
  let mut total = 0;
  for cache_name in store.keys().await? {
    total += store.summary(&cache_name).await?.body_bytes;
  }
  Ok(total)
}

/// Bytes to megabytes, rounded to two decimals
pub fn megabytes(bytes: u64) -> f64 {
  (bytes as f64 / 1024.0 / 1024.0 * 100.0).round() / 100.0
}

/// Measure the store for a `GET_CACHE_SIZE` request. A store failure reports 0.
pub async fn cache_size_reply<S: CacheStore + ?Sized>(store: &S) -> CacheSizeReply {
  let cache_size = match total_cache_bytes(store).await {
    Ok(bytes) => megabytes(bytes),
    Err(e) => {
      error!(error = %e, "failed to calculate cache size");
      0.0
    }
  };
  CacheSizeReply { cache_size }
}
