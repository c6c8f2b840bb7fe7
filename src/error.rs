//! Typed errors for the cache store, the network and the worker event loop.
//!
//! Start-up and CLI code uses `color_eyre::Result`; these types exist where the
//! caller has to tell failure kinds apart (a store read failure becomes a 500,
//! a network failure goes through the offline fallback).

use thiserror::Error;

use crate::worker::WorkerState;

/// Failure of a cache store operation.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("cache store unavailable: {0}")]
  Unavailable(String),

  #[error("cache quota exceeded ({used} of {quota} bytes in use)")]
  QuotaExceeded { used: u64, quota: u64 },

  #[error("request cannot be stored: {0}")]
  NotStorable(String),

  #[error("malformed cache entry: {0}")]
  Malformed(String),

  #[error(transparent)]
  Sqlite(#[from] rusqlite::Error),

  #[error(transparent)]
  Join(#[from] tokio::task::JoinError),
}

/// Failure to obtain a response from the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch {url} failed: {message}")]
pub struct NetworkError {
  pub url: String,
  pub message: String,
}

impl NetworkError {
  pub fn new(url: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      message: message.into(),
    }
  }
}

/// Failure talking to the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
  #[error("worker event loop has stopped")]
  Stopped,

  #[error("worker did not reply to the message")]
  NoReply,

  #[error("install failed: {0}")]
  Install(#[source] StoreError),

  #[error("activation failed: {0}")]
  Activate(#[source] StoreError),

  #[error("cannot {action} a worker in state {state}")]
  InvalidState {
    action: &'static str,
    state: WorkerState,
  },
}
