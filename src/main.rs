mod cache;
mod config;
mod error;
mod event;
mod http;
mod logging;
mod worker;

#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use cache::{CacheGeneration, CacheStore, FetchOutcome, MemoryStorage, SqliteStorage};
use config::Config;
use event::WorkerHandle;
use http::{Fetcher, NetworkClient, Request};
use worker::{CacheSizeReply, ServiceWorker, WorkerState};

#[derive(Parser, Debug)]
#[command(name = "offline-cache")]
#[command(about = "An offline-first caching agent for static web applications")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-cache/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// More logging (-v debug, -vv trace)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,

  /// Only log errors
  #[arg(short, long, global = true)]
  quiet: bool,

  /// Write logs to this file instead of stderr
  #[arg(long, global = true)]
  log_file: Option<PathBuf>,

  /// Keep caches in memory for this run only
  #[arg(long, global = true)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install the current cache generation and activate it
  Install,
  /// Fetch a URL or origin-relative path through the cache
  Fetch {
    target: String,
    /// Accept header to send
    #[arg(long)]
    accept: Option<String>,
    /// HTTP method
    #[arg(long, default_value = "GET")]
    method: String,
    /// Write the response body to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Report the total size of all caches
  Size,
  /// List caches and whether they belong to the current generation
  Caches,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;

  let log_file = args.log_file.clone().or_else(|| config.log_file.clone());
  let _guard = logging::init(args.verbose, args.quiet, log_file.as_deref())?;

  if args.ephemeral {
    debug!("using in-memory cache store");
    run(args.command, &config, Arc::new(MemoryStorage::new())).await
  } else {
    let path = config.database_path()?;
    debug!(path = %path.display(), "opening cache database");
    run(args.command, &config, Arc::new(SqliteStorage::open(&path)?)).await
  }
}

async fn run<S: CacheStore>(command: Command, config: &Config, store: Arc<S>) -> Result<()> {
  let origin = config.origin_url()?;
  let network = Arc::new(NetworkClient::new(&origin)?);
  let mut worker = ServiceWorker::new(Arc::clone(&store), Arc::clone(&network), config.worker_settings()?);

  match command {
    Command::Install => {
      let report = worker.spawn().install().await?;
      if let Some(install) = &report.install {
        println!("cached {} static assets", install.cached);
        for url in &install.failed {
          println!("  failed: {}", url);
        }
      }
      for name in &report.purged {
        println!("deleted {}", name);
      }
      println!("worker {}", report.state);
    }
    Command::Fetch {
      target,
      accept,
      method,
      output,
    } => {
      let url = config.resolve(&origin, &target)?;
      let method =
        Method::from_bytes(method.as_bytes()).map_err(|e| eyre!("Invalid method {:?}: {}", method, e))?;
      let mut request = Request::new(method, url);
      if let Some(accept) = accept {
        request = request.with_accept(&accept)?;
      }

      worker.resume().await?;
      let handle = worker.spawn();
      ensure_active(&handle).await?;

      let (response, source) = match handle.fetch(request.clone()).await?? {
        FetchOutcome::Respond(served) => (served.response, served.source.as_str()),
        FetchOutcome::PassThrough => (network.fetch(&request).await?, "passthrough"),
      };

      println!(
        "{} {} ({}, {} bytes)",
        response.status,
        request.url,
        source,
        response.body.len()
      );
      if let Some(path) = output {
        std::fs::write(&path, &response.body)
          .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?;
      }
    }
    Command::Size => {
      let handle = worker.spawn();
      let reply = handle.request_message(json!({ "type": "GET_CACHE_SIZE" })).await?;
      let size: CacheSizeReply = serde_json::from_value(reply)?;
      println!("{} MB", size.cache_size);
    }
    Command::Caches => {
      let generations = config.generations();
      for name in store.keys().await? {
        let summary = store.summary(&name).await?;
        let status = if generations.is_current(&name) {
          "current"
        } else {
          "stale"
        };
        let kind = CacheGeneration::parse(&name)
          .map(|generation| generation.kind.as_str())
          .unwrap_or("unknown");
        let last = summary
          .last_cached_at
          .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
          .unwrap_or_else(|| "-".to_string());
        println!(
          "{:<36} {:<8} {:<8} {:>6} entries {:>10} bytes  {}",
          name, kind, status, summary.entries, summary.body_bytes, last
        );
      }
    }
  }

  Ok(())
}

/// Install and activate unless an earlier run left this generation in place.
async fn ensure_active(handle: &WorkerHandle) -> Result<()> {
  if handle.state().await? == WorkerState::Activated {
    return Ok(());
  }
  info!("current cache generation not installed, installing");
  let report = handle.install().await?;
  if report.state != WorkerState::Activated {
    handle.activate().await?;
  }
  Ok(())
}
