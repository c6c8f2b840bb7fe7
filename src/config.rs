use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::cache::{CacheablePolicy, GenerationSet, SqliteStorage};
use crate::worker::WorkerSettings;

/// Environment variable that overrides `origin`
pub const ORIGIN_ENV: &str = "OFFLINE_CACHE_ORIGIN";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Application name, used in cache generation names
  pub name: String,
  /// Cache version; bumping it retires every older generation
  pub version: String,
  /// Application origin, e.g. https://greenbite.example
  pub origin: String,
  /// Paths pre-cached at install, relative to the origin
  #[serde(default)]
  pub static_assets: Vec<String>,
  /// Page served to HTML requests when offline
  #[serde(default = "default_offline_page")]
  pub offline_page: String,
  #[serde(default = "default_true")]
  pub skip_waiting_on_install: bool,
  #[serde(default)]
  pub cache: CacheConfig,
  pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheConfig {
  /// SQLite database (defaults to the user data directory)
  pub database: Option<PathBuf>,
  /// URL substrings that mark a file type as cacheable
  pub extensions: Option<Vec<String>>,
  /// Other URL substrings that make a response cacheable
  pub url_substrings: Option<Vec<String>>,
}

fn default_offline_page() -> String {
  "/index.html".to_string()
}

fn default_true() -> bool {
  true
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-cache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-cache/config.yaml
  ///
  /// `OFFLINE_CACHE_ORIGIN` replaces the configured origin.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        return Err(eyre!(
          "No configuration file found. Create one at ~/.config/offline-cache/config.yaml\n\
                 See config.example.yaml for the format."
        ))
      }
    };

    if let Ok(origin) = std::env::var(ORIGIN_ENV) {
      config.origin = origin;
    }
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("offline-cache.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-cache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml_str(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Check everything the worker will rely on.
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(eyre!("`name` must not be empty"));
    }
    if self.version.trim().is_empty() {
      return Err(eyre!("`version` must not be empty"));
    }
    let origin = self.origin_url()?;
    self.resolve(&origin, &self.offline_page)?;
    for asset in &self.static_assets {
      self.resolve(&origin, asset)?;
    }
    Ok(())
  }

  pub fn origin_url(&self) -> Result<Url> {
    let url = Url::parse(&self.origin)
      .map_err(|e| eyre!("Invalid origin {:?}: {}", self.origin, e))?;
    if !matches!(url.scheme(), "http" | "https") {
      return Err(eyre!("Origin must be http or https, got {}", url.scheme()));
    }
    Ok(url)
  }

  /// Resolve a path or absolute URL against the origin.
  pub fn resolve(&self, origin: &Url, path: &str) -> Result<Url> {
    origin
      .join(path)
      .map_err(|e| eyre!("Invalid asset path {:?}: {}", path, e))
  }

  pub fn generations(&self) -> GenerationSet {
    GenerationSet::new(&self.name, &self.version)
  }

  pub fn policy(&self) -> CacheablePolicy {
    let defaults = CacheablePolicy::default();
    CacheablePolicy::new(
      self
        .cache
        .extensions
        .clone()
        .unwrap_or(defaults.extensions),
      self
        .cache
        .url_substrings
        .clone()
        .unwrap_or(defaults.url_substrings),
    )
  }

  pub fn worker_settings(&self) -> Result<WorkerSettings> {
    let origin = self.origin_url()?;
    let manifest = self
      .static_assets
      .iter()
      .map(|asset| self.resolve(&origin, asset))
      .collect::<Result<Vec<_>>>()?;

    Ok(WorkerSettings {
      generations: self.generations(),
      manifest,
      policy: self.policy(),
      offline_page: self.resolve(&origin, &self.offline_page)?,
      skip_waiting_on_install: self.skip_waiting_on_install,
    })
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.cache.database {
      Some(path) => Ok(path.clone()),
      None => SqliteStorage::default_path(),
    }
  }
}
