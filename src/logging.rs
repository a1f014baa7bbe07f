use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

/// Initialize file logging under the given directory.
///
/// The TUI owns the terminal, so all diagnostics go to a daily-rotated file.
/// The level is taken from `RUST_LOG` and defaults to `info`. Returns the
/// appender guard, which must be kept alive for the lifetime of the process,
/// or `None` if the log directory cannot be created.
pub fn init(log_dir: &Path) -> Option<WorkerGuard> {
    if std::fs::create_dir_all(log_dir).is_err() {
        return None;
    }

    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "rclonedir.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true)
        .try_init();

    if result.is_err() {
        // A subscriber was already installed (tests); drop the guard quietly.
        return None;
    }

    Some(guard)
}
