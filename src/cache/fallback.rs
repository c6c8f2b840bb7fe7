//! Offline responses for requests that missed the cache and the network.

use reqwest::StatusCode;
use url::Url;

use crate::error::StoreError;
use crate::http::{Request, Response};

use super::traits::CacheStore;

const OFFLINE_TEXT: &str = "Offline - Please check your connection";

const OFFLINE_IMAGE_SVG: &str = r##"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="200" viewBox="0 0 200 200">
  <rect width="200" height="200" fill="#f0f0f0"/>
  <text x="100" y="100" text-anchor="middle" dominant-baseline="middle" fill="#666" font-family="Arial, sans-serif" font-size="14">
    Image unavailable offline
  </text>
</svg>
"##;

/// 503 for a page that is neither reachable nor cached
pub fn service_unavailable() -> Response {
  Response::synthetic(
    StatusCode::SERVICE_UNAVAILABLE,
    "text/plain; charset=utf-8",
    OFFLINE_TEXT,
  )
}

/// Placeholder so offline images never render as broken icons
pub fn placeholder_image() -> Response {
  Response::synthetic(StatusCode::OK, "image/svg+xml", OFFLINE_IMAGE_SVG)
}

/// 500 returned when the cache store itself fails
pub fn internal_error() -> Response {
  Response::synthetic(
    StatusCode::INTERNAL_SERVER_ERROR,
    "text/plain; charset=utf-8",
    "Service Worker Error",
  )
}

/// Pick the offline response for a failed request.
///
/// HTML requests get the cached offline page, or a 503 when it is missing.
/// Image requests get the SVG placeholder. Anything else gets `None` and the
/// caller propagates the network error.
pub async fn offline_response<S: CacheStore + ?Sized>(
  store: &S,
  request: &Request,
  offline_page: &Url,
) -> Result<Option<Response>, StoreError> {
  if request.accepts_html() {
    let page = store.match_any(&Request::get(offline_page.clone())).await?;
    return Ok(Some(page.unwrap_or_else(service_unavailable)));
  }

  if request.accepts_image() {
    return Ok(Some(placeholder_image()));
  }

  Ok(None)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::testing::{get, ok_response, url};

  #[tokio::test]
  async fn test_html_gets_cached_offline_page() {
    let store = MemoryStorage::new();
    store
      .put("static", &get("/index.html"), &ok_response("<h1>GreenBite</h1>", "text/html"))
      .await
      .unwrap();

    let request = get("/recipes.html").with_accept("text/html").unwrap();
    let response = offline_response(&store, &request, &url("/index.html"))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body, "<h1>GreenBite</h1>");
  }

  #[tokio::test]
  async fn test_html_without_offline_page_is_503() {
    let store = MemoryStorage::new();
    let request = get("/workout.html").with_accept("text/html").unwrap();
    let response = offline_response(&store, &request, &url("/index.html"))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body, OFFLINE_TEXT);
  }

  #[tokio::test]
  async fn test_image_gets_placeholder() {
    let store = MemoryStorage::new();
    let request = get("/images/bowl.jpg").with_accept("image/*").unwrap();
    let response = offline_response(&store, &request, &url("/index.html"))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.content_type(), Some("image/svg+xml"));
    assert!(std::str::from_utf8(&response.body)
      .unwrap()
      .contains("Image unavailable offline"));
  }

  #[tokio::test]
  async fn test_html_wins_over_image() {
    let store = MemoryStorage::new();
    let request = get("/").with_accept("text/html,image/webp").unwrap();
    let response = offline_response(&store, &request, &url("/index.html"))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
  }

  #[tokio::test]
  async fn test_other_requests_have_no_fallback() {
    let store = MemoryStorage::new();
    let request = get("/api/tips").with_accept("application/json").unwrap();
    let response = offline_response(&store, &request, &url("/index.html"))
      .await
      .unwrap();
    assert!(response.is_none());
  }
}
