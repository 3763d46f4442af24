//! Structured logging setup.
//!
//! The renderer owns stdout, so log lines never go there:
//! - Daily rotating log files in `<data dir>/logs`
//! - Warnings mirrored to stderr when stdout is not a terminal
//! - Stderr-only fallback when the log directory cannot be created
//! - Environment variable override via BURROW_LOG or RUST_LOG

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Logging configuration.
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether stdout is an interactive terminal
    pub is_tty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, is_tty: atty::is(atty::Stream::Stdout), log_filter: None }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }
}

/// Guard that must be held for the lifetime of the application.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Initialize logging with the given configuration.
///
/// If the log file cannot be opened, falls back to stderr.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {}. Using stderr only.", e);
            init_stderr_logging(config.log_filter.as_deref())
        }
    }
}

fn init_stderr_logging(filter: Option<&str>) -> LoggingGuard {
    let env_filter = build_env_filter(filter);

    // try_init: a second initialisation (tests, embedding) is not an error
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr.with_max_level(tracing::Level::WARN))
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_target(false)
        .try_init();

    LoggingGuard { _worker_guard: None }
}

fn init_file_logging(config: &LogConfig) -> Result<WorkerGuard, Box<dyn std::error::Error>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("burrow")
        .filename_suffix("log")
        .build(&config.log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = build_env_filter(config.log_filter.as_deref());

    if config.is_tty {
        let _ = tracing_subscriber::fmt()
            .with_writer(non_blocking)
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_target(true)
            .try_init();
    } else {
        let stderr = std::io::stderr.with_max_level(tracing::Level::WARN);
        let _ = tracing_subscriber::fmt()
            .with_writer(stderr.and(non_blocking))
            .with_env_filter(env_filter)
            .with_ansi(false)
            .with_target(true)
            .try_init();
    }

    Ok(guard)
}

/// Build the environment filter from config or defaults.
fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    // Priority: custom filter > BURROW_LOG > RUST_LOG > default
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env("BURROW_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "info,burrow=debug,burrow_core=debug,tokio_postgres=warn,deadpool=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "warn,burrow=info,burrow_core=info,tokio_postgres=warn,deadpool=warn"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_filter_wins() {
        let filter = build_env_filter(Some("burrow_core=trace"));
        assert_eq!(filter.to_string(), "burrow_core=trace");
    }

    #[test]
    fn test_invalid_custom_filter_falls_back() {
        let filter = build_env_filter(Some("burrow=notalevel"));
        assert!(filter.to_string().contains("tokio_postgres=warn"));
    }

    #[test]
    fn test_log_config_with_filter() {
        let config = LogConfig::new(PathBuf::from("/tmp/burrow-logs")).with_filter("debug");
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
        assert_eq!(config.log_dir, PathBuf::from("/tmp/burrow-logs"));
    }
}
