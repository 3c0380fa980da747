//! Tracing subscriber setup.

use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LogConfig;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `log.level`. When a log file is configured, output
/// goes to a daily-rolled file through a non-blocking writer as well as to
/// stderr; the returned guard must be held until exit or buffered lines
/// are lost.
pub fn init_logging(config: &LogConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.level_filter().unwrap_or(LevelFilter::WARN);
        EnvFilter::default().add_directive(level.into())
    });

    let (file_writer, guard) = match &config.file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "transact.log".into());
            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.json {
        let stderr_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr);
        let file_layer = file_writer.map(|w| {
            fmt::layer()
                .json()
                .with_target(true)
                .with_writer(w)
                .with_ansi(false)
        });
        registry.with(stderr_layer).with(file_layer).init();
    } else {
        let stderr_layer = fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr);
        let file_layer = file_writer.map(|w| {
            fmt::layer()
                .with_target(false)
                .with_writer(w)
                .with_ansi(false)
        });
        registry.with(stderr_layer).with(file_layer).init();
    }

    guard
}
