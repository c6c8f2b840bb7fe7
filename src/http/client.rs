use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, ACCESS_CONTROL_ALLOW_ORIGIN};
use url::{Origin, Url};

use crate::error::NetworkError;

use super::types::{Request, Response, ResponseType};

/// Network capability used by the worker.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
  /// Perform the request. Any HTTP status counts as success; only transport
  /// failures are errors.
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// HTTP client wrapper that classifies responses relative to the app origin
#[derive(Clone)]
pub struct NetworkClient {
  client: reqwest::Client,
  origin: Origin,
}

impl NetworkClient {
  pub fn new(origin: &Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      origin: origin.origin(),
    })
  }
}

#[async_trait]
impl Fetcher for NetworkClient {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .headers(request.headers.clone())
      .send()
      .await
      .map_err(|e| NetworkError::new(request.url.as_str(), e.to_string()))?;

    let status = response.status();
    let headers = response.headers().clone();
    let response_type = classify(&self.origin, response.url(), &headers);

    let body = response
      .bytes()
      .await
      .map_err(|e| NetworkError::new(request.url.as_str(), e.to_string()))?;

    Ok(Response {
      status,
      headers,
      body,
      response_type,
    })
  }
}

/// Same-origin responses are basic; cross-origin ones are cors only when the
/// server sent Access-Control-Allow-Origin, opaque otherwise.
fn classify(origin: &Origin, final_url: &Url, headers: &HeaderMap) -> ResponseType {
  if final_url.origin() == *origin {
    ResponseType::Basic
  } else if headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN) {
    ResponseType::Cors
  } else {
    ResponseType::Opaque
  }
}
