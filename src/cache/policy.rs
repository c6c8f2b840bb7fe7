//! Dynamic-cache eligibility.

use url::Url;

/// File extensions whose responses are worth keeping offline
pub const DEFAULT_EXTENSIONS: &[&str] = &[
  ".jpg", ".jpeg", ".png", ".gif", ".svg", ".webp", // images
  ".woff", ".woff2", ".ttf", ".otf", // fonts
  ".css", ".js", ".json", ".txt", // styles, scripts, data
  ".mp3", ".wav", ".ogg", ".m4a", // audio
];

/// URL fragments that mark API responses and font CDN hosts
pub const DEFAULT_URL_SUBSTRINGS: &[&str] = &["api", "fonts.googleapis.com"];

/// Decides whether a network response may be copied into the dynamic cache.
///
/// Matching is plain substring search over the full URL, so `.js` also
/// matches `.json` and any URL containing `api` qualifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheablePolicy {
  pub extensions: Vec<String>,
  pub url_substrings: Vec<String>,
}

impl Default for CacheablePolicy {
  fn default() -> Self {
    Self::new(
      DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
      DEFAULT_URL_SUBSTRINGS.iter().map(|s| s.to_string()).collect(),
    )
  }
}

impl CacheablePolicy {
  pub fn new(extensions: Vec<String>, url_substrings: Vec<String>) -> Self {
    Self {
      extensions,
      url_substrings,
    }
  }

  pub fn should_cache(&self, url: &Url) -> bool {
    let url = url.as_str();
    self.extensions.iter().any(|ext| url.contains(ext.as_str()))
      || self.url_substrings.iter().any(|s| url.contains(s.as_str()))
  }
}
