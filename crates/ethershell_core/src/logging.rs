use std::path::Path;

use anyhow::{Context, Result};
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

use crate::config::ShellHome;

const DEFAULT_FILTER: &str = "info,ethershell_app=debug,ethershell_chain=debug,ethershell_core=debug";
const LOG_FILE_PREFIX: &str = "ethershell";

/// Daily rolling log file in `dir`, plain text with targets.
fn file_layer<S>(dir: &Path) -> Result<(impl Layer<S>, WorkerGuard)>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX));
    let layer = fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer);
    Ok((layer, guard))
}

fn env_filter_or(fallback: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
}

/// Initializes logging with a rolling file under `<home>/logs` plus compact
/// console output for warnings and errors, so the prompt is not drowned in
/// debug output. The returned guard must stay alive for the whole session.
pub fn init_logging(home: &ShellHome) -> Result<WorkerGuard> {
    let (file, guard) = file_layer(&home.logs_dir())?;
    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .with_filter(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(env_filter_or(DEFAULT_FILTER))
        .with(file)
        .with(console)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(guard)
}

/// File-only logging into `logs_dir` with an explicit filter, for tests and
/// embedders without a terminal.
pub fn init_logging_to_dir(logs_dir: &Path, filter: &str) -> Result<WorkerGuard> {
    let (file, guard) = file_layer(logs_dir)?;
    tracing_subscriber::registry()
        .with(env_filter_or(filter))
        .with(file)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(guard)
}
