//! The offline cache worker: one event-driven agent per application origin.
//!
//! ## Lifecycle
//! 1. **Install**: pre-cache the static manifest into the current static cache
//! 2. **Activate**: delete stale cache generations, then claim clients
//! 3. **Fetch**: intercept requests (only once activated)
//!
//! Lifecycle events and messages are handled one at a time by the event loop.
//! Each fetch runs on its own task, so requests never wait on each other.

mod lifecycle;
mod message;

pub use lifecycle::{InstallReport, Lifecycle, WorkerState};
pub use message::{CacheSizeReply, ClientMessage};

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::{CacheLayer, CacheStore, CacheablePolicy, FetchOutcome, GenerationSet};
use crate::error::{NetworkError, StoreError, WorkerError};
use crate::event::{WorkerEvent, WorkerHandle};
use crate::http::{Fetcher, Request};

/// Everything a worker needs to know about the deployed version.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
  pub generations: GenerationSet,
  /// Absolute URLs to pre-cache at install
  pub manifest: Vec<Url>,
  pub policy: CacheablePolicy,
  /// Page served to HTML requests when offline
  pub offline_page: Url,
  pub skip_waiting_on_install: bool,
}

/// What an install or activate event did.
#[derive(Debug, Clone, Default)]
pub struct LifecycleReport {
  pub state: WorkerState,
  pub install: Option<InstallReport>,
  /// Stale caches deleted during activation
  pub purged: Vec<String>,
}

pub struct ServiceWorker<S: CacheStore, F: Fetcher> {
  store: Arc<S>,
  fetcher: Arc<F>,
  layer: CacheLayer<S, F>,
  settings: WorkerSettings,
  lifecycle: Lifecycle,
}

impl<S: CacheStore, F: Fetcher> ServiceWorker<S, F> {
  pub fn new(store: Arc<S>, fetcher: Arc<F>, settings: WorkerSettings) -> Self {
    let layer = CacheLayer::new(
      Arc::clone(&store),
      Arc::clone(&fetcher),
      settings.generations.clone(),
      settings.policy.clone(),
      settings.offline_page.clone(),
    );

    Self {
      store,
      fetcher,
      layer,
      settings,
      lifecycle: Lifecycle::new(),
    }
  }

  pub fn state(&self) -> WorkerState {
    self.lifecycle.state()
  }

  /// Pick up where an earlier run left off.
  ///
  /// Activation opens the current dynamic cache, so a store holding both
  /// current caches and nothing stale was activated by an earlier run. Such a
  /// worker starts out activated. A generation that was installed but left
  /// waiting has no dynamic cache and is not resumed. Returns whether it was.
  pub async fn resume(&mut self) -> Result<bool, StoreError> {
    if self.lifecycle.state() != WorkerState::Parsed {
      return Ok(false);
    }

    let names = self.store.keys().await?;
    let generations = &self.settings.generations;
    let static_name = generations.static_cache.name();
    let dynamic_name = generations.dynamic_cache.name();
    let activated = names.iter().any(|name| *name == static_name)
      && names.iter().any(|name| *name == dynamic_name);

    if activated && generations.stale(&names).is_empty() {
      info!(cache = %static_name, "resuming active worker");
      self.lifecycle = Lifecycle::resumed();
      return Ok(true);
    }
    Ok(false)
  }

  /// Pre-cache the static manifest.
  pub async fn install(&mut self) -> Result<InstallReport, WorkerError> {
    self.lifecycle.begin_install()?;

    let cache_name = self.settings.generations.static_cache.name();
    info!(cache = %cache_name, assets = self.settings.manifest.len(), "installing");

    match lifecycle::precache(
      self.store.as_ref(),
      self.fetcher.as_ref(),
      &cache_name,
      &self.settings.manifest,
    )
    .await
    {
      Ok(report) => {
        info!(
          cached = report.cached,
          failed = report.failed.len(),
          "static files cached"
        );
        self.lifecycle.finish_install(true);
        if self.settings.skip_waiting_on_install {
          self.lifecycle.request_skip_waiting();
        }
        Ok(report)
      }
      Err(e) => {
        error!(cache = %cache_name, error = %e, "install failed");
        self.lifecycle.finish_install(false);
        Err(WorkerError::Install(e))
      }
    }
  }

  /// Delete stale generations, open the current dynamic cache and take
  /// control of clients.
  pub async fn activate(&mut self) -> Result<Vec<String>, WorkerError> {
    self.lifecycle.begin_activate()?;
    info!("activating");

    let result: Result<Vec<String>, StoreError> = async {
      let purged = lifecycle::purge_stale(self.store.as_ref(), &self.settings.generations).await?;
      self
        .store
        .open(&self.settings.generations.dynamic_cache.name())
        .await?;
      Ok(purged)
    }
    .await;

    match result {
      Ok(purged) => {
        self.lifecycle.finish_activate(true);
        info!(purged = purged.len(), "activated, claiming clients");
        Ok(purged)
      }
      Err(e) => {
        error!(error = %e, "activation failed");
        self.lifecycle.finish_activate(false);
        Err(WorkerError::Activate(e))
      }
    }
  }

  /// Spawn the event loop and return a handle to it.
  pub fn spawn(self) -> WorkerHandle {
    let (handle, rx) = WorkerHandle::channel();
    tokio::spawn(self.run(rx));
    handle
  }

  async fn run(mut self, mut rx: mpsc::UnboundedReceiver<WorkerEvent>) {
    while let Some(event) = rx.recv().await {
      match event {
        WorkerEvent::Install { reply } => {
          let _ = reply.send(self.on_install().await);
        }
        WorkerEvent::Activate { reply } => {
          let _ = reply.send(self.on_activate().await);
        }
        WorkerEvent::Fetch { request, reply } => self.dispatch_fetch(request, reply),
        WorkerEvent::Message { data, reply } => self.on_message(data, reply).await,
        WorkerEvent::State { reply } => {
          let _ = reply.send(self.state());
        }
      }
    }
    debug!("worker event loop stopped");
  }

  async fn on_install(&mut self) -> Result<LifecycleReport, WorkerError> {
    let report = self.install().await?;
    let purged = if self.lifecycle.should_activate() {
      self.activate().await?
    } else {
      info!("installed, waiting to activate");
      Vec::new()
    };

    Ok(LifecycleReport {
      state: self.state(),
      install: Some(report),
      purged,
    })
  }

  async fn on_activate(&mut self) -> Result<LifecycleReport, WorkerError> {
    let purged = self.activate().await?;
    Ok(LifecycleReport {
      state: self.state(),
      install: None,
      purged,
    })
  }

  /// Answer a fetch on its own task. If the caller goes away first, the
  /// handling is dropped; a cache write already started still completes.
  fn dispatch_fetch(
    &self,
    request: Request,
    mut reply: oneshot::Sender<Result<FetchOutcome, NetworkError>>,
  ) {
    if !self.lifecycle.can_intercept() {
      let _ = reply.send(Ok(FetchOutcome::PassThrough));
      return;
    }

    let layer = self.layer.clone();
    tokio::spawn(async move {
      tokio::select! {
        _ = reply.closed() => {
          debug!(url = %request.url, "fetch abandoned by client");
        }
        outcome = layer.handle_fetch(&request) => {
          let _ = reply.send(outcome);
        }
      }
    });
  }

  async fn on_message(&mut self, data: Value, reply: Option<oneshot::Sender<Value>>) {
    debug!(message = %data, "message received");

    match ClientMessage::parse(&data) {
      Some(ClientMessage::SkipWaiting) => {
        self.lifecycle.request_skip_waiting();
        if self.lifecycle.should_activate() {
          if let Err(e) = self.activate().await {
            warn!(error = %e, "skip waiting could not activate worker");
          }
        }
      }
      Some(ClientMessage::GetCacheSize) => {
        let Some(reply) = reply else {
          warn!("GET_CACHE_SIZE posted without a reply port");
          return;
        };
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
          let size = message::cache_size_reply(store.as_ref()).await;
          match size.into_value() {
            Ok(value) => {
              let _ = reply.send(value);
            }
            Err(e) => error!(error = %e, "failed to encode cache size reply"),
          }
        });
      }
      None => debug!("ignoring unrecognized message"),
    }
  }
}
