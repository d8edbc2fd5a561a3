//! Logging system for hashpass.
//!
//! Installs a `tracing` subscriber with an env filter, a configurable
//! output format, and an optional log file. Secrets never reach the log.

use hashpass_types::config::{LogConfig, LogFormat};
use hashpass_types::{HashpassError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a full `EnvFilter` directive string.
pub const LOG_ENV: &str = "HASHPASS_LOG";

/// Initialize the logging system with default configuration.
pub fn init_default() -> Result<()> {
    init_from_config(&LogConfig::default()).map(|_| ())
}

/// Initialize logging from configuration.
///
/// When a log file is configured the returned guard must be held for the
/// life of the program, otherwise buffered lines are lost on exit.
pub fn init_from_config(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| default_filter(config));

    let (writer, guard, ansi) = match &config.path {
        Some(path) => {
            let file_name = path.file_name().ok_or_else(|| {
                HashpassError::Config(format!("Log path has no file name: {}", path.display()))
            })?;
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(dir)?;

            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), None, true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(false)
        .with_level(true);

    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    result.map_err(|e| HashpassError::Config(format!("Failed to initialise logging: {}", e)))?;

    Ok(guard)
}

fn default_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::new(format!("hashpass={}", config.level.as_directive()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashpass_types::LogLevel;

    #[test]
    fn test_default_filter_targets_workspace_crates() {
        let config = LogConfig {
            level: LogLevel::Debug,
            ..Default::default()
        };
        assert_eq!(default_filter(&config).to_string(), "hashpass=debug");
    }

    #[test]
    fn test_second_init_is_rejected() {
        let _ = init_default();
        assert!(matches!(init_default(), Err(HashpassError::Config(_))));
    }
}
