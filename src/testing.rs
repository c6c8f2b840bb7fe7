//! Test doubles for the store and network capabilities.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use crate::cache::{CacheStore, CacheSummary, MemoryStorage};
use crate::error::{NetworkError, StoreError};
use crate::http::{Fetcher, Request, Response, ResponseType};

pub const ORIGIN: &str = "https://greenbite.example";

/// Absolute URL for a path on the test origin
pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

/// GET request for a path on the test origin
pub fn get(path: &str) -> Request {
  Request::get(url(path))
}

/// Same-origin 200 response
pub fn ok_response(body: &'static str, content_type: &'static str) -> Response {
  let mut headers = HeaderMap::new();
  headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
  Response {
    status: StatusCode::OK,
    headers,
    body: Bytes::from_static(body.as_bytes()),
    response_type: ResponseType::Basic,
  }
}

/// Let detached tasks (dynamic cache writes) run to completion.
/// Enough for stores whose puts never suspend.
pub async fn settle() {
  for _ in 0..16 {
    tokio::task::yield_now().await;
  }
}

/// Scripted network: URLs with a registered response succeed, everything
/// else fails as if offline.
#[derive(Default)]
pub struct FakeNetwork {
  responses: Mutex<HashMap<String, Response>>,
  calls: AtomicUsize,
  delay_ms: AtomicU64,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, path: &str, response: Response) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(url(path).to_string(), response);
  }

  /// Make every fetch take this long before answering
  pub fn delay(&self, delay: Duration) {
    self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
  }

  pub fn go_offline(&self) {
    self.responses.lock().unwrap().clear();
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn failure_for(&self, request: &Request) -> NetworkError {
    NetworkError::new(request.url.as_str(), "network unreachable")
  }
}

#[async_trait]
impl Fetcher for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let delay = self.delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
      tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let response = self
      .responses
      .lock()
      .unwrap()
      .get(request.url.as_str())
      .cloned();
    response.ok_or_else(|| self.failure_for(request))
  }
}

/// Store wrapper that counts reads and puts, and injects failures.
pub struct ProbeStore {
  inner: MemoryStorage,
  reads: AtomicUsize,
  writes: AtomicUsize,
  fail_reads: AtomicBool,
  fail_writes: AtomicBool,
  write_delay_ms: AtomicU64,
}

impl ProbeStore {
  pub fn new(inner: MemoryStorage) -> Self {
    Self {
      inner,
      reads: AtomicUsize::new(0),
      writes: AtomicUsize::new(0),
      fail_reads: AtomicBool::new(false),
      fail_writes: AtomicBool::new(false),
      write_delay_ms: AtomicU64::new(0),
    }
  }

  pub fn inner(&self) -> &MemoryStorage {
    &self.inner
  }

  pub fn reads(&self) -> usize {
    self.reads.load(Ordering::SeqCst)
  }

  pub fn writes(&self) -> usize {
    self.writes.load(Ordering::SeqCst)
  }

  pub fn fail_reads(&self, fail: bool) {
    self.fail_reads.store(fail, Ordering::SeqCst);
  }

  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  /// Make every put take this long before it reaches the inner store
  pub fn slow_writes(&self, delay: Duration) {
    self.write_delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
  }

  fn check_read(&self) -> Result<(), StoreError> {
    self.reads.fetch_add(1, Ordering::SeqCst);
    if self.fail_reads.load(Ordering::SeqCst) {
      return Err(StoreError::Unavailable("injected read failure".to_string()));
    }
    Ok(())
  }

  fn check_write(&self) -> Result<(), StoreError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(StoreError::QuotaExceeded { used: 0, quota: 0 });
    }
    Ok(())
  }
}

#[async_trait]
impl CacheStore for ProbeStore {
  async fn open(&self, cache_name: &str) -> Result<(), StoreError> {
    self.check_write()?;
    self.inner.open(cache_name).await
  }

  async fn has(&self, cache_name: &str) -> Result<bool, StoreError> {
    self.check_read()?;
    self.inner.has(cache_name).await
  }

  async fn keys(&self) -> Result<Vec<String>, StoreError> {
    self.check_read()?;
    self.inner.keys().await
  }

  async fn delete(&self, cache_name: &str) -> Result<bool, StoreError> {
    self.check_write()?;
    self.inner.delete(cache_name).await
  }

  async fn put(
    &self,
    cache_name: &str,
    request: &Request,
    response: &Response,
  ) -> Result<(), StoreError> {
    self.writes.fetch_add(1, Ordering::SeqCst);
    self.check_write()?;
    let delay = self.write_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
      tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    self.inner.put(cache_name, request, response).await
  }

  async fn match_in(
    &self,
    cache_name: &str,
    request: &Request,
  ) -> Result<Option<Response>, StoreError> {
    self.check_read()?;
    self.inner.match_in(cache_name, request).await
  }

  async fn summary(&self, cache_name: &str) -> Result<CacheSummary, StoreError> {
    self.check_read()?;
    self.inner.summary(cache_name).await
  }
}
