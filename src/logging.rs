//! Subscriber setup for processes embedding the facade.
//!
//! `RUST_LOG` (default `info`) sets the base filter. [`LoggingConfig`] then
//! layers this crate's own targets on top of it: per-target revocation
//! events from the revoker, and latency observations from
//! `sidelegate::metrics`.
//!
//! Token secrets never reach a subscriber: only accessor ids are logged.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Base filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info";

/// Directive enabling per-target revocation events.
pub const REVOCATION_DIRECTIVE: &str = "sidelegate::revoker=trace";

/// Directive enabling latency observations.
pub const TIMINGS_DIRECTIVE: &str = "sidelegate::metrics=debug";

/// Keeps the file writer alive; dropping it flushes and closes the log file.
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Build a filter from `base` plus the targets `settings` enables.
///
/// # Errors
///
/// Returns an error if `base` is not a valid filter expression.
pub fn filter_for(base: &str, settings: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::try_new(base)
        .map_err(|e| anyhow::anyhow!("invalid log filter {base:?}: {e}"))?;
    if settings.trace_revocations {
        filter = filter.add_directive(REVOCATION_DIRECTIVE.parse::<Directive>()?);
    }
    if settings.timings {
        filter = filter.add_directive(TIMINGS_DIRECTIVE.parse::<Directive>()?);
    }
    Ok(filter)
}

fn env_filter(settings: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let base = std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_else(|_| DEFAULT_FILTER.to_owned());
    filter_for(&base, settings)
}

/// Log JSON to `{logs_dir}/sidelegate.log.YYYY-MM-DD` (daily rotation) and
/// plain text to stderr.
///
/// # Errors
///
/// Returns an error if the directory cannot be created, the filter is
/// invalid, or a global subscriber is already installed.
pub fn init_production(logs_dir: &Path, settings: &LoggingConfig) -> anyhow::Result<LoggingGuard> {
    let filter = env_filter(settings)?;
    std::fs::create_dir_all(logs_dir).map_err(|e| {
        anyhow::anyhow!("failed to create logs directory {}: {e}", logs_dir.display())
    })?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(logs_dir, "sidelegate.log"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(LoggingGuard { _guard: guard })
}

/// Log plain text to stderr only.
///
/// # Errors
///
/// Returns an error if the filter is invalid or a global subscriber is
/// already installed.
pub fn init_cli(settings: &LoggingConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(settings)?)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
