//! Log setup.
//!
//! The filter is chosen by (in priority order):
//! 1. `RUST_LOG`, if set
//! 2. `--quiet` (errors only) or `-v` / `-vv` (debug / trace)
//! 3. Default: info
//!
//! Logs go to stderr, or to a file when one is configured.

use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Keep the returned guard alive for the whole
/// run so buffered file output is flushed on exit.
pub fn init(verbose: u8, quiet: bool, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = match std::env::var("RUST_LOG") {
    Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
    _ => EnvFilter::new(level(verbose, quiet)),
  };

  let builder = tracing_subscriber::fmt().with_env_filter(filter);

  match log_file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
      let file_name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
      std::fs::create_dir_all(dir)
        .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

      let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));
      builder
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
      Ok(Some(guard))
    }
    None => {
      builder
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;
      Ok(None)
    }
  }
}

fn level(verbose: u8, quiet: bool) -> &'static str {
  if quiet {
    return "error";
  }
  match verbose {
    0 => "info",
    1 => "debug",
    _ => "trace",
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_level_from_flags() {
    assert_eq!(level(0, false), "info");
    assert_eq!(level(1, false), "debug");
    assert_eq!(level(5, false), "trace");
    assert_eq!(level(2, true), "error");
  }
}
