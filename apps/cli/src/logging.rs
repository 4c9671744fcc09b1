//! Logging initialization for the Stockpile CLI.
//!
//! Console logging with `RUST_LOG` overrides, optional JSON formatting, and
//! optional file logging when `STOCKPILE_LOG_DIR` is set.

use std::path::PathBuf;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Guard that keeps the file-logging worker alive for the program duration.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

pub fn init_logging(json: bool) -> anyhow::Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockpile_search=info"));

    let file_layer = match std::env::var_os("STOCKPILE_LOG_DIR") {
        Some(dir) => {
            let dir = PathBuf::from(dir);
            std::fs::create_dir_all(&dir)?;
            let appender = tracing_appender::rolling::daily(dir, "stockpile.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };
    let (file_layer, file_guard) = file_layer;

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
