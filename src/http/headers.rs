//! Header helpers shared by the cache stores.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// Flatten headers into name/value pairs for storage.
/// Values that are not valid UTF-8 are dropped.
pub fn to_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
  headers
    .iter()
    .filter_map(|(name, value)| {
      value
        .to_str()
        .ok()
        .map(|v| (name.as_str().to_string(), v.to_string()))
    })
    .collect()
}

/// Rebuild a header map from stored pairs, skipping invalid entries.
pub fn from_pairs(pairs: Vec<(String, String)>) -> HeaderMap {
  let mut headers = HeaderMap::new();
  for (name, value) in pairs {
    let (Ok(name), Ok(value)) = (
      HeaderName::from_bytes(name.as_bytes()),
      HeaderValue::from_str(&value),
    ) else {
      continue;
    };
    headers.append(name, value);
  }
  headers
}

/// Get header names from a Vary header value.
pub fn vary_header_names(vary: &str) -> Vec<String> {
  vary
    .split(',')
    .map(|s| s.trim().to_lowercase())
    .filter(|s| !s.is_empty())
    .collect()
}

/// Check that every header named by `vary` has the same value on the query
/// request and on the request the entry was stored for. `*` never matches.
pub fn vary_matches(vary: Option<&str>, query: &HeaderMap, cached: &HeaderMap) -> bool {
  let Some(vary) = vary else {
    return true;
  };
  for name in vary_header_names(vary) {
    if name == "*" {
      return false;
    }
    if query.get(name.as_str()) != cached.get(name.as_str()) {
      return false;
    }
  }
  true
}
