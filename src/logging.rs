//! File logging. The terminal belongs to the UI, so logs go to
//! `evdesk.log` in `logging.dir` or the data directory.

use crate::config::{Config, LoggingConfig};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const LOG_ENV: &str = "EVDESK_LOG";
const LOG_FILE: &str = "evdesk.log";

/// Install the global subscriber. Keep the guard alive until exit so
/// buffered lines get flushed.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
  if !config.enabled {
    return Ok(None);
  }

  let dir = log_dir(config)?;
  std::fs::create_dir_all(&dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(&dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let filter = filter(config);
  let file_layer = fmt::layer()
    .with_ansi(false)
    .with_writer(writer)
    .with_filter(filter);

  tracing_subscriber::registry()
    .with(file_layer)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  tracing::info!(path = %dir.join(LOG_FILE).display(), "Logging started");
  Ok(Some(guard))
}

fn log_dir(config: &LoggingConfig) -> Result<PathBuf> {
  match &config.dir {
    Some(dir) => Ok(dir.clone()),
    None => Config::data_dir(),
  }
}

/// `EVDESK_LOG` wins over the configured level. HTTP internals stay at warn.
fn filter(config: &LoggingConfig) -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
    EnvFilter::try_new(format!(
      "{},hyper=warn,hyper_util=warn,reqwest=warn,rustls=warn",
      config.level
    ))
    .unwrap_or_else(|_| EnvFilter::new("info"))
  })
}
