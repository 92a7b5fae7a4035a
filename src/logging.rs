// src/logging.rs

//! Logging setup for `autoconvert` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `AUTOCONVERT_LOG`, read as a full filter directive: `debug`,
//!    `autoconvert::exec=trace,info`, ...
//! 3. default to `info`
//!
//! Logs are sent to STDERR so that stdout stays free for the dry-run listing
//! and the final run summary.

use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

/// Environment variable consulted when no `--log-level` is given.
pub const LOG_ENV_VAR: &str = "AUTOCONVERT_LOG";

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let env = std::env::var(LOG_ENV_VAR).ok();

    fmt()
        .with_env_filter(build_filter(cli_level, env.as_deref()))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("installing log subscriber: {e}"))
}

fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(directive(level));
    }

    env.map(str::trim)
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn directive(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;

    fn max_level(cli: Option<LogLevel>, env: Option<&str>) -> Option<LevelFilter> {
        build_filter(cli, env).max_level_hint()
    }

    #[test]
    fn cli_level_beats_environment() {
        assert_eq!(
            max_level(Some(LogLevel::Debug), Some("error")),
            Some(LevelFilter::DEBUG)
        );
    }

    #[test]
    fn environment_accepts_per_module_directives() {
        assert_eq!(
            max_level(None, Some("autoconvert::exec=trace,warn")),
            Some(LevelFilter::TRACE)
        );
    }

    #[test]
    fn empty_or_invalid_environment_falls_back_to_info() {
        assert_eq!(max_level(None, Some("  ")), Some(LevelFilter::INFO));
        assert_eq!(
            max_level(None, Some("autoconvert=loud")),
            Some(LevelFilter::INFO)
        );
        assert_eq!(max_level(None, None), Some(LevelFilter::INFO));
    }
}
