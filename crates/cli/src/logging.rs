//! Tracing subscriber setup.
//!
//! Events go to stderr and, when configured, to a log file written through a
//! non-blocking appender. The returned guard must be held until the process
//! exits so buffered file output is flushed.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use compsync_core::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let console = fmt::layer()
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let (dir, name) = split_log_path(path)?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}

/// Run `f` under a temporary console-only subscriber, for work that happens
/// before [`init`] can be called, such as loading the configuration.
pub fn with_console<T>(f: impl FnOnce() -> T) -> T {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(LoggingConfig::default().log_level));
    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr),
    );
    tracing::subscriber::with_default(subscriber, f)
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let name = path
        .file_name()
        .with_context(|| format!("log file path '{}' has no file name", path.display()))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok((dir, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_log_path() {
        let (dir, name) = split_log_path(Path::new("compsync.log")).unwrap();
        assert_eq!(dir, Path::new("."));
        assert_eq!(name, "compsync.log");

        let (dir, name) = split_log_path(Path::new("/var/log/compsync/run.log")).unwrap();
        assert_eq!(dir, Path::new("/var/log/compsync"));
        assert_eq!(name, "run.log");

        assert!(split_log_path(Path::new("/")).is_err());
    }

    #[test]
    fn test_with_console_returns_closure_value() {
        let value = with_console(|| {
            tracing::info!("inside scoped subscriber");
            42
        });
        assert_eq!(value, 42);
    }
}
