use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogConfig;

pub const LOG_FILE_PREFIX: &str = "edu-sense.log";

/// Default log directory inside the platform data directory.
pub fn default_log_dir() -> Result<PathBuf> {
    let mut path =
        dirs::data_dir().context("Unable to determine data directory for your platform")?;

    path.push("edu-sense");
    path.push("logs");
    Ok(path)
}

/// Resolve the log directory and make sure it exists.
fn prepare_log_dir(config: &LogConfig) -> Result<PathBuf> {
    let dir = match &config.log_dir {
        Some(dir) => dir.clone(),
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    Ok(dir)
}

/// Install a subscriber writing to daily-rolling files. `RUST_LOG` overrides
/// the configured level. Keep the guard alive until exit or buffered lines
/// are lost.
///
/// When no log directory can be prepared, logs go to stderr and no guard is
/// returned.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_ascii_lowercase()))
        .context("Invalid log filter")?;

    let dir = match prepare_log_dir(config) {
        Ok(dir) => dir,
        Err(err) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()
                .context("Failed to install tracing subscriber")?;

            tracing::warn!("File logging unavailable, using stderr: {err:#}");
            return Ok(None);
        }
    };

    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(&dir, LOG_FILE_PREFIX));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::info!("Logging to {}", dir.display());
    Ok(Some(guard))
}
