use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "STOREFRONT_LOG";
pub const LOG_FILE: &str = "storefront.log";

/// Filter from STOREFRONT_LOG, else the configured level, else "info".
fn filter(default_level: Option<&str>) -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV)
    .unwrap_or_else(|_| EnvFilter::new(default_level.unwrap_or("info")))
}

/// Install the global subscriber.
///
/// Logs go to `storefront.log` in `data_dir`; `verbose` also writes them to
/// stderr. Keep the returned guard alive until exit so buffered lines flush.
pub fn init(data_dir: &Path, default_level: Option<&str>, verbose: bool) -> Result<WorkerGuard> {
  std::fs::create_dir_all(data_dir)
    .map_err(|e| eyre!("Failed to create data directory {}: {}", data_dir.display(), e))?;

  let appender = tracing_appender::rolling::never(data_dir, LOG_FILE);
  let (writer, guard) = tracing_appender::non_blocking(appender);

  let stderr = verbose.then(|| {
    tracing_subscriber::fmt::layer()
      .with_writer(std::io::stderr)
      .with_target(false)
  });

  tracing_subscriber::registry()
    .with(filter(default_level))
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false),
    )
    .with(stderr)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}
