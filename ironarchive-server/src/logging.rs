use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use crate::config::LogFormat;
use crate::error::LoggingError;

/// Maps `LOG_LEVEL` to a filter. Only `debug`, `info`, `warn` and `error` are
/// recognised, exactly as written; anything else falls back to info.
pub fn level_filter(level: &str) -> LevelFilter {
    match level {
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        _ => LevelFilter::INFO,
    }
}

/// Installs the global subscriber: JSON lines in production, human readable
/// output otherwise. `RUST_LOG` directives refine the configured level.
pub fn init(level: &str, format: LogFormat) -> Result<(), LoggingError> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(level).into())
        .from_env_lossy();

    let base_layer = fmt::layer().with_target(true).with_level(true);
    let log_layer = match format {
        LogFormat::Json => base_layer
            .json()
            .flatten_event(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => base_layer.with_ansi(true).with_filter(filter).boxed(),
    };

    tracing_subscriber::registry().with(log_layer).try_init()?;
    Ok(())
}
