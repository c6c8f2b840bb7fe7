//! Cache layer that orchestrates caching logic with network fetching.

use std::sync::Arc;
use tracing::{debug, error, warn};
use url::Url;

use crate::error::NetworkError;
use crate::http::{Fetcher, Request, Response};

use super::fallback;
use super::generation::GenerationSet;
use super::policy::CacheablePolicy;
use super::traits::{CacheStore, ResponseSource};

/// A response together with where it came from.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
}

impl Served {
  fn new(response: Response, source: ResponseSource) -> Self {
    Self { response, source }
  }
}

/// Result of handing a request to the interceptor.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  /// Not intercepted. The host performs the request as if no worker existed.
  PassThrough,
  /// The worker answered the request.
  Respond(Served),
}

impl FetchOutcome {
  #[allow(dead_code)]
  pub fn served(&self) -> Option<&Served> {
    match self {
      FetchOutcome::PassThrough => None,
      FetchOutcome::Respond(served) => Some(served),
    }
  }
}

/// Request interceptor: cache first, then network, then offline fallback.
///
/// This layer sits between the page and the network client. It holds no
/// mutable state of its own; the store is the only thing shared between
/// concurrent requests.
pub struct CacheLayer<S: CacheStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  generations: GenerationSet,
  policy: CacheablePolicy,
  offline_page: Url,
}

impl<S: CacheStore, F: Fetcher> CacheLayer<S, F> {
  pub fn new(
    store: Arc<S>,
    fetcher: Arc<F>,
    generations: GenerationSet,
    policy: CacheablePolicy,
    offline_page: Url,
  ) -> Self {
    Self {
      store,
      fetcher,
      generations,
      policy,
      offline_page,
    }
  }

  /// Handle an intercepted request.
  ///
  /// 1. Non-GET and non-http(s) requests pass through untouched
  /// 2. A hit in any retained cache is served without touching the network
  /// 3. On a miss, fetch; cacheable responses are copied into the dynamic cache
  /// 4. On network failure, serve the offline fallback or propagate the error
  ///
  /// A store read failure becomes a 500 response rather than an error.
  pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, NetworkError> {
    if !request.is_interceptable() {
      debug!(method = %request.method, url = %request.url, "passing request through");
      return Ok(FetchOutcome::PassThrough);
    }

    let cached = match self.store.match_any(request).await {
      Ok(cached) => cached,
      Err(e) => {
        error!(url = %request.url, error = %e, "cache lookup failed");
        return Ok(FetchOutcome::Respond(Served::new(
          fallback::internal_error(),
          ResponseSource::Error,
        )));
      }
    };

    if let Some(response) = cached {
      debug!(url = %request.url, "serving from cache");
      return Ok(FetchOutcome::Respond(Served::new(
        response,
        ResponseSource::Cache,
      )));
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_cacheable() && self.policy.should_cache(&request.url) {
          self.store_dynamic(request, &response);
        } else {
          debug!(
            url = %request.url,
            status = %response.status,
            response_type = %response.response_type,
            "not caching network response"
          );
        }
        Ok(FetchOutcome::Respond(Served::new(
          response,
          ResponseSource::Network,
        )))
      }
      Err(network_error) => {
        debug!(url = %request.url, error = %network_error, "fetch failed, trying offline fallback");
        match fallback::offline_response(self.store.as_ref(), request, &self.offline_page).await {
          Ok(Some(response)) => Ok(FetchOutcome::Respond(Served::new(
            response,
            ResponseSource::Offline,
          ))),
          Ok(None) => Err(network_error),
          Err(e) => {
            error!(url = %request.url, error = %e, "offline page lookup failed");
            Ok(FetchOutcome::Respond(Served::new(
              fallback::internal_error(),
              ResponseSource::Error,
            )))
          }
        }
      }
    }
  }

  /// Copy a response into the dynamic cache.
  ///
  /// The write runs detached: the caller gets the original response without
  /// waiting, and an abandoned request does not cancel the write. Failures are
  /// logged and never reach the caller.
  fn store_dynamic(&self, request: &Request, response: &Response) {
    let store = Arc::clone(&self.store);
    let cache_name = self.generations.dynamic_cache.name();
    let request = request.clone();
    let copy = response.clone();

    tokio::spawn(async move {
      match store.put(&cache_name, &request, &copy).await {
        Ok(()) => debug!(url = %request.url, "cached network response"),
        Err(e) => warn!(url = %request.url, error = %e, "failed to cache network response"),
      }
    });
  }
}

impl<S: CacheStore, F: Fetcher> Clone for CacheLayer<S, F> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      fetcher: Arc::clone(&self.fetcher),
      generations: self.generations.clone(),
      policy: self.policy.clone(),
      offline_page: self.offline_page.clone(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::http::ResponseType;
  use crate::testing::{get, ok_response, settle, url, FakeNetwork, ProbeStore};
  use reqwest::{Method, StatusCode};
  use std::time::Duration;

  const DYNAMIC: &str = "greenbite-dynamic-v1.0.1";

  fn layer(store: &Arc<ProbeStore>, network: &Arc<FakeNetwork>) -> CacheLayer<ProbeStore, FakeNetwork> {
    CacheLayer::new(
      Arc::clone(store),
      Arc::clone(network),
      GenerationSet::new("greenbite", "1.0.1"),
      CacheablePolicy::default(),
      url("/index.html"),
    )
  }

  fn setup() -> (Arc<ProbeStore>, Arc<FakeNetwork>) {
    (
      Arc::new(ProbeStore::new(MemoryStorage::new())),
      Arc::new(FakeNetwork::new()),
    )
  }

  fn served(outcome: FetchOutcome) -> Served {
    match outcome {
      FetchOutcome::Respond(served) => served,
      FetchOutcome::PassThrough => panic!("expected a response, got pass-through"),
    }
  }

  #[tokio::test]
  async fn test_non_get_passes_through() {
    let (store, network) = setup();
    let mut request = get("/api/contact");
    request.method = Method::POST;

    let outcome = layer(&store, &network).handle_fetch(&request).await.unwrap();
    assert!(matches!(outcome, FetchOutcome::PassThrough));
    assert_eq!(network.calls(), 0);
    assert_eq!(store.reads(), 0);
    assert_eq!(store.writes(), 0);
  }

  #[tokio::test]
  async fn test_extension_scheme_passes_through() {
    let (store, network) = setup();
    let request = Request::get(Url::parse("chrome-extension://abc/content.js").unwrap());

    let outcome = layer(&store, &network).handle_fetch(&request).await.unwrap();
    assert!(outcome.served().is_none());
    assert_eq!(network.calls(), 0);
  }

  #[tokio::test]
  async fn test_cache_hit_skips_network() {
    let (store, network) = setup();
    let request = get("/css/global.css");
    store
      .inner()
      .put("greenbite-static-v1.0.1", &request, &ok_response("body{}", "text/css"))
      .await
      .unwrap();
    network.respond("/css/global.css", ok_response("changed", "text/css"));

    let served = served(layer(&store, &network).handle_fetch(&request).await.unwrap());
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.body, "body{}");
    assert_eq!(network.calls(), 0);
  }

  #[tokio::test]
  async fn test_miss_stores_one_copy_in_dynamic_cache() {
    let (store, network) = setup();
    let request = get("/images/salad.png");
    network.respond("/images/salad.png", ok_response("PNGDATA", "image/png"));

    let served = served(layer(&store, &network).handle_fetch(&request).await.unwrap());
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.body, "PNGDATA");
    assert_eq!(served.response.content_type(), Some("image/png"));
    assert_eq!(network.calls(), 1);
    settle().await;
    assert_eq!(store.writes(), 1);

    let stored = store.inner().match_in(DYNAMIC, &request).await.unwrap().unwrap();
    assert_eq!(stored.body, "PNGDATA");
  }

  #[tokio::test]
  async fn test_second_request_is_served_from_dynamic_cache() {
    let (store, network) = setup();
    let request = get("/api/tips");
    network.respond("/api/tips", ok_response("[\"drink water\"]", "application/json"));

    let layer = layer(&store, &network);
    layer.handle_fetch(&request).await.unwrap();
    settle().await;
    let served = served(layer.handle_fetch(&request).await.unwrap());

    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(network.calls(), 1);
  }

  #[tokio::test]
  async fn test_uncacheable_type_is_returned_not_stored() {
    let (store, network) = setup();
    network.respond("/recipes.html", ok_response("<html>", "text/html"));

    let served = served(
      layer(&store, &network)
        .handle_fetch(&get("/recipes.html"))
        .await
        .unwrap(),
    );
    assert_eq!(served.response.body, "<html>");
    settle().await;
    assert_eq!(store.writes(), 0);
  }

  #[tokio::test]
  async fn test_error_status_and_opaque_are_not_stored() {
    let (store, network) = setup();
    let mut missing = ok_response("not found", "text/plain");
    missing.status = StatusCode::NOT_FOUND;
    network.respond("/missing.png", missing);

    let mut opaque = ok_response("font", "font/woff2");
    opaque.response_type = ResponseType::Opaque;
    network.respond("/fonts/inter.woff2", opaque);

    let layer = layer(&store, &network);
    let not_found = served(layer.handle_fetch(&get("/missing.png")).await.unwrap());
    assert_eq!(not_found.response.status, StatusCode::NOT_FOUND);

    let font = served(layer.handle_fetch(&get("/fonts/inter.woff2")).await.unwrap());
    assert_eq!(font.response.response_type, ResponseType::Opaque);

    settle().await;
    assert_eq!(store.writes(), 0);
  }

  #[tokio::test]
  async fn test_store_write_failure_is_swallowed() {
    let (store, network) = setup();
    store.fail_writes(true);
    network.respond("/js/home.js", ok_response("init()", "text/javascript"));

    let served = served(layer(&store, &network).handle_fetch(&get("/js/home.js")).await.unwrap());
    assert_eq!(served.response.status, StatusCode::OK);
    assert_eq!(served.response.body, "init()");
    settle().await;
    assert_eq!(store.writes(), 1);
  }

  #[tokio::test]
  async fn test_offline_html_serves_cached_root_page() {
    let (store, network) = setup();
    store
      .inner()
      .put("greenbite-static-v1.0.1", &get("/index.html"), &ok_response("<h1>Home</h1>", "text/html"))
      .await
      .unwrap();

    let request = get("/contact.html").with_accept("text/html").unwrap();
    let served = served(layer(&store, &network).handle_fetch(&request).await.unwrap());
    assert_eq!(served.source, ResponseSource::Offline);
    assert_eq!(served.response.body, "<h1>Home</h1>");
    assert_eq!(network.calls(), 1);
  }

  #[tokio::test]
  async fn test_offline_image_serves_placeholder() {
    let (store, network) = setup();
    let request = get("/images/oats.jpg").with_accept("image/webp,*/*").unwrap();

    let served = served(layer(&store, &network).handle_fetch(&request).await.unwrap());
    assert_eq!(served.response.status, StatusCode::OK);
    assert_eq!(served.response.content_type(), Some("image/svg+xml"));
  }

  #[tokio::test]
  async fn test_offline_other_propagates_network_error() {
    let (store, network) = setup();
    let request = get("/data/recipes.js").with_accept("*/*").unwrap();

    let err = layer(&store, &network).handle_fetch(&request).await.unwrap_err();
    assert_eq!(err, network.failure_for(&request));
  }

  #[tokio::test]
  async fn test_cache_read_failure_is_500() {
    let (store, network) = setup();
    store.fail_reads(true);

    let served = served(layer(&store, &network).handle_fetch(&get("/index.html")).await.unwrap());
    assert_eq!(served.source, ResponseSource::Error);
    assert_eq!(served.response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(served.response.body, "Service Worker Error");
    assert_eq!(network.calls(), 0);
  }

  #[tokio::test]
  async fn test_concurrent_requests_are_independent() {
    let (store, network) = setup();
    network.respond("/a.css", ok_response("a", "text/css"));
    network.respond("/b.css", ok_response("b", "text/css"));
    let layer = layer(&store, &network);
    let (a, b, c) = (get("/a.css"), get("/b.css"), get("/c.css"));

    let (a, b, c) = tokio::join!(
      layer.handle_fetch(&a),
      layer.handle_fetch(&b),
      layer.handle_fetch(&c),
    );
    assert_eq!(served(a.unwrap()).response.body, "a");
    assert_eq!(served(b.unwrap()).response.body, "b");
    assert!(c.is_err());
    settle().await;
    assert_eq!(store.writes(), 2);
  }

  #[tokio::test]
  async fn test_response_does_not_wait_for_cache_write() {
    let (store, network) = setup();
    store.slow_writes(Duration::from_secs(2));
    network.respond("/css/home.css", ok_response("h1{}", "text/css"));
    let request = get("/css/home.css");

    let outcome = tokio::time::timeout(
      Duration::from_millis(500),
      layer(&store, &network).handle_fetch(&request),
    )
    .await
    .expect("response was held back by the cache write");
    assert_eq!(served(outcome.unwrap()).response.body, "h1{}");

    settle().await;
    assert_eq!(store.writes(), 1);
    assert!(store.inner().match_in(DYNAMIC, &request).await.unwrap().is_none());
  }
}
