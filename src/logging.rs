//! Tracing subscriber setup for the command-line front end.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Install the global subscriber.
///
/// Logs go to stderr so command output on stdout stays clean. When a log
/// directory is configured, a daily-rotated file is written as well; the
/// returned guard must be held until exit so buffered lines get flushed.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
  let env_filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

  let (file_layer, guard) = match &config.directory {
    Some(dir) => {
      let file_appender = tracing_appender::rolling::daily(dir, "restodir.log");
      let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
      let layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false) // No ANSI colors in files
        .compact()
        .boxed();
      (Some(layer), Some(guard))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(env_filter)
    .with(fmt::layer().with_writer(std::io::stderr).compact())
    .with(file_layer)
    .try_init()
    .ok(); // Ignore error if already initialized

  guard
}
