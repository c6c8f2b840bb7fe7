//! Versioned cache names.

use std::fmt;

/// Which of the two caches a generation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
  /// Pre-populated at install from the asset manifest
  Static,
  /// Filled opportunistically from network responses
  Dynamic,
}

impl CacheKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      CacheKind::Static => "static",
      CacheKind::Dynamic => "dynamic",
    }
  }
}

/// A version-tagged cache identity, rendered as `<app>-<kind>-v<version>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheGeneration {
  pub app: String,
  pub kind: CacheKind,
  pub version: String,
}

impl CacheGeneration {
  pub fn new(app: impl Into<String>, kind: CacheKind, version: impl Into<String>) -> Self {
    Self {
      app: app.into(),
      kind,
      version: version.into(),
    }
  }

  /// The cache name used in the store
  pub fn name(&self) -> String {
    format!("{}-{}-v{}", self.app, self.kind.as_str(), self.version)
  }

  /// Parse a cache name back into a generation.
  /// Returns None for names this agent did not create.
  pub fn parse(name: &str) -> Option<Self> {
    for kind in [CacheKind::Static, CacheKind::Dynamic] {
      let marker = format!("-{}-v", kind.as_str());
      if let Some(idx) = name.rfind(&marker) {
        let app = &name[..idx];
        let version = &name[idx + marker.len()..];
        if !app.is_empty() && !version.is_empty() {
          return Some(Self::new(app, kind, version));
        }
      }
    }
    None
  }
}

impl fmt::Display for CacheGeneration {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.name())
  }
}

/// The static and dynamic generations of one deployed version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSet {
  pub static_cache: CacheGeneration,
  pub dynamic_cache: CacheGeneration,
}

impl GenerationSet {
  pub fn new(app: &str, version: &str) -> Self {
    Self {
      static_cache: CacheGeneration::new(app, CacheKind::Static, version),
      dynamic_cache: CacheGeneration::new(app, CacheKind::Dynamic, version),
    }
  }

  /// Exact name match against either current generation
  pub fn is_current(&self, cache_name: &str) -> bool {
    cache_name == self.static_cache.name() || cache_name == self.dynamic_cache.name()
  }

  /// Names that activation must delete
  pub fn stale<'a>(&self, cache_names: &'a [String]) -> Vec<&'a str> {
    cache_names
      .iter()
      .map(String::as_str)
      .filter(|name| !self.is_current(name))
      .collect()
  }
}
