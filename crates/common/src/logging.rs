//! Logging and tracing initialization.
//!
//! `RUST_LOG` takes precedence over the configured level.

use std::sync::Mutex;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global tracing subscriber. Later calls are ignored.
pub fn init_logging(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let log_file = config.file.as_ref().and_then(|path| {
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| eprintln!("Failed to open log file {}: {e}", path.display()))
            .ok()
    });

    let output: BoxedLayer = match (config.json, log_file) {
        (true, Some(file)) => fmt::layer().json().with_writer(Mutex::new(file)).boxed(),
        (true, None) => fmt::layer().json().boxed(),
        (false, Some(file)) => fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .boxed(),
        (false, None) => fmt::layer()
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(output)
        .with(env_filter)
        .try_init()
        .ok();
}
