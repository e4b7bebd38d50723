use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::core::config::LogConfig;

const LOG_FILE_PREFIX: &str = "newsdesk.log";

/// Install the global subscriber.
///
/// The returned guard flushes the file appender and must live until exit.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.level))?;

    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(ChronoLocal::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    if config.json {
        registry
            .with(fmt::layer().json().with_timer(ChronoLocal::rfc_3339()))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_timer(ChronoLocal::rfc_3339()))
            .try_init()?;
    }

    Ok(guard)
}
