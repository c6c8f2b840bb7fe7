use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE, VARY};
use reqwest::{Method, StatusCode};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// An intercepted request
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub headers: HeaderMap,
}

impl Request {
  pub fn new(method: Method, url: Url) -> Self {
    Self {
      method,
      url,
      headers: HeaderMap::new(),
    }
  }

  pub fn get(url: Url) -> Self {
    Self::new(Method::GET, url)
  }

  /// Set the Accept header
  pub fn with_accept(mut self, accept: &str) -> Result<Self, reqwest::header::InvalidHeaderValue> {
    self.headers.insert(ACCEPT, HeaderValue::from_str(accept)?);
    Ok(self)
  }

  pub fn accept(&self) -> Option<&str> {
    self.headers.get(ACCEPT).and_then(|v| v.to_str().ok())
  }

  /// Whether the client asked for an HTML document
  pub fn accepts_html(&self) -> bool {
    self.accept().is_some_and(|a| a.contains("text/html"))
  }

  /// Whether the client asked for an image
  pub fn accepts_image(&self) -> bool {
    self.accept().is_some_and(|a| a.contains("image"))
  }

  /// Only GET requests over http(s) are intercepted. Everything else,
  /// including browser-extension schemes, goes straight to the host.
  pub fn is_interceptable(&self) -> bool {
    self.method == Method::GET && matches!(self.url.scheme(), "http" | "https")
  }

  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// Identity of a stored request: method plus URL without its fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey(String);

impl RequestKey {
  pub fn new(method: &Method, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self(format!("{} {}", method, url))
  }

  #[allow(dead_code)]
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// SHA256 hex digest, used as a fixed-length storage key
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.0.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for RequestKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// How a response relates to the requesting origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin response
  Basic,
  /// Cross-origin response the server explicitly allowed
  Cors,
  /// Cross-origin response without CORS approval
  Opaque,
  /// Response produced locally rather than fetched
  Default,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseType::Basic => "basic",
      ResponseType::Cors => "cors",
      ResponseType::Opaque => "opaque",
      ResponseType::Default => "default",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(ResponseType::Basic),
      "cors" => Some(ResponseType::Cors),
      "opaque" => Some(ResponseType::Opaque),
      "default" => Some(ResponseType::Default),
      _ => None,
    }
  }
}

impl fmt::Display for ResponseType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A response, either fetched, stored or synthesized
#[derive(Debug, Clone)]
pub struct Response {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Bytes,
  pub response_type: ResponseType,
}

impl Response {
  /// A locally generated response
  pub fn synthetic(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Self {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    Self {
      status,
      headers,
      body: body.into(),
      response_type: ResponseType::Default,
    }
  }

  #[allow(dead_code)]
  pub fn content_type(&self) -> Option<&str> {
    self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
  }

  /// Raw Vary header value, if any
  pub fn vary(&self) -> Option<&str> {
    self.headers.get(VARY).and_then(|v| v.to_str().ok())
  }

  /// A 2xx status other than 206. Partial content is never stored.
  pub fn has_storable_status(&self) -> bool {
    self.status.is_success() && self.status != StatusCode::PARTIAL_CONTENT
  }

  /// Whether the interceptor may keep a copy of this network response
  pub fn is_cacheable(&self) -> bool {
    self.has_storable_status()
      && matches!(self.response_type, ResponseType::Basic | ResponseType::Cors)
  }
}
