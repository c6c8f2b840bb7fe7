use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::cache::FetchOutcome;
use crate::error::{NetworkError, WorkerError};
use crate::http::Request;
use crate::worker::{LifecycleReport, WorkerState};

/// Events delivered to the worker
#[derive(Debug)]
pub enum WorkerEvent {
  /// Pre-cache the manifest, then activate if allowed to skip waiting
  Install {
    reply: oneshot::Sender<Result<LifecycleReport, WorkerError>>,
  },
  /// Activate an installed worker
  Activate {
    reply: oneshot::Sender<Result<LifecycleReport, WorkerError>>,
  },
  /// Intercept a request
  Fetch {
    request: Request,
    reply: oneshot::Sender<Result<FetchOutcome, NetworkError>>,
  },
  /// Control message from a page, with an optional reply port
  Message {
    data: Value,
    reply: Option<oneshot::Sender<Value>>,
  },
  /// Report the current lifecycle state
  State { reply: oneshot::Sender<WorkerState> },
}

/// Client side of the worker's event channel
#[derive(Debug, Clone)]
pub struct WorkerHandle {
  tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl WorkerHandle {
  /// Create a handle and the receiver the worker loop reads from
  pub fn channel() -> (Self, mpsc::UnboundedReceiver<WorkerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { tx }, rx)
  }

  async fn call<T>(
    &self,
    event: impl FnOnce(oneshot::Sender<T>) -> WorkerEvent,
  ) -> Result<T, WorkerError> {
    let (reply, rx) = oneshot::channel();
    self.tx.send(event(reply)).map_err(|_| WorkerError::Stopped)?;
    rx.await.map_err(|_| WorkerError::Stopped)
  }

  pub async fn install(&self) -> Result<LifecycleReport, WorkerError> {
    self.call(|reply| WorkerEvent::Install { reply }).await?
  }

  pub async fn activate(&self) -> Result<LifecycleReport, WorkerError> {
    self.call(|reply| WorkerEvent::Activate { reply }).await?
  }

  /// Hand a request to the worker. The outer error means the worker is gone;
  /// the inner one is a network failure with no offline fallback.
  pub async fn fetch(
    &self,
    request: Request,
  ) -> Result<Result<FetchOutcome, NetworkError>, WorkerError> {
    self
      .call(|reply| WorkerEvent::Fetch { request, reply })
      .await
  }

  /// Post a message without waiting for an answer
  #[allow(dead_code)]
  pub fn post_message(&self, data: Value) -> Result<(), WorkerError> {
    self
      .tx
      .send(WorkerEvent::Message { data, reply: None })
      .map_err(|_| WorkerError::Stopped)
  }

  /// Post a message with a reply port and wait for the answer
  pub async fn request_message(&self, data: Value) -> Result<Value, WorkerError> {
    let (reply, rx) = oneshot::channel();
    self
      .tx
      .send(WorkerEvent::Message {
        data,
        reply: Some(reply),
      })
      .map_err(|_| WorkerError::Stopped)?;
    rx.await.map_err(|_| WorkerError::NoReply)
  }

  pub async fn state(&self) -> Result<WorkerState, WorkerError> {
    self.call(|reply| WorkerEvent::State { reply }).await
  }
}
