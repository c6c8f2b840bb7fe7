//! Worker lifecycle: the state machine plus the install and activate steps.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use std::fmt;
use tracing::{info, warn};
use url::Url;

use crate::cache::{CacheStore, GenerationSet};
use crate::error::{StoreError, WorkerError};
use crate::http::{Fetcher, Request};

/// Worker lifecycle states. Transitions only move forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WorkerState {
  /// Created, install not started
  #[default]
  Parsed,
  /// Pre-caching the static manifest
  Installing,
  /// Installed, waiting for permission to activate
  Installed,
  /// Purging stale cache generations
  Activating,
  /// Controlling clients and intercepting requests
  Activated,
  /// Install or activation failed; terminal
  Redundant,
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    };
    f.write_str(s)
  }
}

/// Lifecycle state owned by one worker instance.
#[derive(Debug, Clone, Default)]
pub struct Lifecycle {
  state: WorkerState,
  skip_waiting: bool,
  clients_claimed: bool,
}

impl Lifecycle {
  pub fn new() -> Self {
    Self::default()
  }

  /// A worker whose generation was already installed and activated by an
  /// earlier run.
  pub fn resumed() -> Self {
    Self {
      state: WorkerState::Activated,
      skip_waiting: true,
      clients_claimed: true,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn can_intercept(&self) -> bool {
    self.state == WorkerState::Activated
  }

  #[allow(dead_code)]
  pub fn clients_claimed(&self) -> bool {
    self.clients_claimed
  }

  /// Allow activation without waiting for old clients to go away
  pub fn request_skip_waiting(&mut self) {
    self.skip_waiting = true;
  }

  /// Installed and allowed to move on
  pub fn should_activate(&self) -> bool {
    self.state == WorkerState::Installed && self.skip_waiting
  }

  fn advance(
    &mut self,
    action: &'static str,
    from: WorkerState,
    to: WorkerState,
  ) -> Result<(), WorkerError> {
    if self.state != from {
      return Err(WorkerError::InvalidState {
        action,
        state: self.state,
      });
    }
    self.state = to;
    Ok(())
  }

  pub fn begin_install(&mut self) -> Result<(), WorkerError> {
    self.advance("install", WorkerState::Parsed, WorkerState::Installing)
  }

  pub fn finish_install(&mut self, succeeded: bool) {
    if self.state == WorkerState::Installing {
      self.state = if succeeded {
        WorkerState::Installed
      } else {
        WorkerState::Redundant
      };
    }
  }

  pub fn begin_activate(&mut self) -> Result<(), WorkerError> {
    self.advance("activate", WorkerState::Installed, WorkerState::Activating)
  }

  /// Finish activation. On success the worker claims open clients.
  pub fn finish_activate(&mut self, succeeded: bool) {
    if self.state == WorkerState::Activating {
      if succeeded {
        self.state = WorkerState::Activated;
        self.clients_claimed = true;
      } else {
        self.state = WorkerState::Redundant;
      }
    }
  }
}

/// Outcome of pre-caching the static manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
  /// Assets stored
  pub cached: usize,
  /// Assets that could not be fetched or stored
  pub failed: Vec<String>,
}

/// Open the static cache and store every manifest asset, best-effort.
///
/// Each asset is fetched and stored independently; one failure never affects
/// the others. Only failing to open the cache is an error.
pub async fn precache<S, F>(
  store: &S,
  fetcher: &F,
  cache_name: &str,
  manifest: &[Url],
) -> Result<InstallReport, StoreError>
where
  S: CacheStore + ?Sized,
  F: Fetcher + ?Sized,
{
  store.open(cache_name).await?;

  let attempts = manifest.iter().map(|url| async move {
    let request = Request::get(url.clone());
    (url, add(store, fetcher, cache_name, &request).await)
  });

  let mut report = InstallReport::default();
  for (url, result) in join_all(attempts).await {
    match result {
      Ok(()) => report.cached += 1,
      Err(e) => {
        warn!(url = %url, error = %e, "failed to cache static asset");
        report.failed.push(url.to_string());
      }
    }
  }

  Ok(report)
}

/// Fetch one asset and store it; non-success statuses count as failures.
async fn add<S, F>(store: &S, fetcher: &F, cache_name: &str, request: &Request) -> Result<()>
where
  S: CacheStore + ?Sized,
  F: Fetcher + ?Sized,
{
  let response = fetcher.fetch(request).await?;
  if !response.has_storable_status() {
    return Err(eyre!("unexpected status {}", response.status));
  }
  store.put(cache_name, request, &response).await?;
  Ok(())
}

/// Delete every cache that is not one of the current generations.
/// Returns the deleted names.
pub async fn purge_stale<S: CacheStore + ?Sized>(
  store: &S,
  generations: &GenerationSet,
) -> Result<Vec<String>, StoreError> {
  let names = store.keys().await?;
  let stale: Vec<String> = generations
    .stale(&names)
    .into_iter()
    .map(String::from)
    .collect();

  let deletions = stale.iter().map(|name| async move {
    info!(cache = %name, "deleting old cache");
    store.delete(name).await
  });
  for result in join_all(deletions).await {
    result?;
  }

  Ok(stale)
}
