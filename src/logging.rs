//! Tracing initialization.

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::{LogFormat, LoggingSection};

/// Environment variable holding a per-target filter, e.g.
/// `TASKBOARD_LOG=taskboard=debug,tower_http=info`.
pub const LOG_ENV: &str = "TASKBOARD_LOG";

/// Build the filter: `TASKBOARD_LOG` wins, then `--verbose`, then the config.
pub fn build_filter(section: &LoggingSection, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("taskboard=debug,tower_http=debug")
        } else {
            EnvFilter::try_new(&section.level).unwrap_or_else(|_| EnvFilter::new("taskboard=info"))
        }
    })
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process so buffered file output is flushed on exit.
pub fn init(section: &LoggingSection, verbose: bool) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(section, verbose);

    let (file_writer, guard) = match &section.dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "taskboard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);
    match section.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init(),
    }
    .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
