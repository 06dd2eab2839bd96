//! Log output
//!
//! Events go to a rolling file through a non-blocking writer. Text mode also
//! echoes to the console. Third-party crates are held at `warn` so sqlx
//! statement logs stay out of settlement traces; `RUST_LOG` overrides all of it.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

/// File rotation for a config name; unknown names never rotate
pub fn rotation(name: &str) -> Rotation {
    match name.trim().to_ascii_lowercase().as_str() {
        "minutely" => Rotation::MINUTELY,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        _ => Rotation::NEVER,
    }
}

/// Filter used when `RUST_LOG` is unset
pub fn default_directives(level: &str) -> String {
    format!("warn,{}={}", env!("CARGO_CRATE_NAME"), level)
}

/// Install the global subscriber. Keep the guard alive for the process
/// lifetime or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> WorkerGuard {
    let appender = RollingFileAppender::new(
        rotation(&config.rotation),
        &config.log_dir,
        &config.log_file,
    );
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);
    let file_layer = fmt::layer().with_writer(writer).with_ansi(false);

    if config.use_json {
        // Event fields sit at the top level of each JSON line
        registry.with(file_layer.json().flatten_event(true)).init();
    } else {
        registry
            .with(file_layer.with_target(false))
            .with(fmt::layer().with_target(false))
            .init();
    }

    guard
}
