/*!
 * Logging setup for the command line
 *
 * Events go to stderr in compact form so stdout stays clean for `--json`.
 * With `--log-file` they are written as JSON lines instead, one object per
 * event, with source locations and span timings.
 */

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LogConfig;
use crate::error::{RepoError, Result};

/// Resolve the effective level: `verbose` forces debug.
pub fn effective_level(config: &LogConfig) -> Level {
    if config.verbose {
        Level::DEBUG
    } else {
        config.level.to_tracing_level()
    }
}

/// Directive used when `RUST_LOG` is not set
fn default_directive(level: Level) -> String {
    format!("rpmrepo={}", level.as_str().to_ascii_lowercase())
}

fn build_filter(level: Level) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(default_directive(level))
            .map_err(|e| RepoError::validation(format!("invalid log filter: {}", e))),
    }
}

/// Install the global subscriber. Call once, before the runtime starts.
pub fn init_logging(config: &LogConfig) -> Result<()> {
    let filter = build_filter(effective_level(config))?;
    let registry = tracing_subscriber::registry().with(filter);

    match config.file.as_deref() {
        Some(path) => {
            let file = open_log_file(path)?;
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(file)
                        .with_ansi(false)
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true)
                        .with_span_events(FmtSpan::CLOSE),
                )
                .init();
        }
        None => {
            registry
                .with(
                    fmt::layer()
                        .compact()
                        .with_writer(std::io::stderr)
                        .with_target(false),
                )
                .init();
        }
    }
    Ok(())
}

fn open_log_file(path: &Path) -> Result<File> {
    File::create(path).map_err(|e| RepoError::local_io(path, e))
}

/// Route events through the test harness writer, at debug unless `RUST_LOG`
/// says otherwise. Safe to call from every test.
#[cfg(test)]
pub fn init_test_logging() {
    let filter = build_filter(Level::DEBUG).unwrap_or_else(|_| EnvFilter::new("rpmrepo=debug"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .compact()
        .try_init();
}
