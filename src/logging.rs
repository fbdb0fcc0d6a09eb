//! Tracing subscriber setup.

use crate::config::LoggingConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line, human oriented
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" | "" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("Unknown log format: {}", other)),
        }
    }
}

/// Filter directive for a `-v` count, falling back to the configured level
/// when no `-v` was given.
pub fn level_for(config: &LoggingConfig, verbosity: u8) -> &str {
    match verbosity {
        0 => config.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over both the configured level and `-v`.
/// Calling this twice is harmless; the second call is ignored.
pub fn init_logging(config: &LoggingConfig, verbosity: u8) {
    let filter = level_for(config, verbosity);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let format = config.log_format.parse().unwrap_or_default();
    let with_target = verbosity >= 3;

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match (format, config.log_timestamp) {
        (LogFormat::Json, _) => registry
            .with(fmt::layer().json().with_target(with_target).with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Pretty, _) => registry
            .with(fmt::layer().pretty().with_target(with_target).with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Compact, true) => registry
            .with(fmt::layer().compact().with_target(with_target).with_writer(std::io::stderr))
            .try_init(),
        (LogFormat::Compact, false) => registry
            .with(
                fmt::layer()
                    .compact()
                    .without_time()
                    .with_target(with_target)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };

    if let Err(e) = result {
        tracing::debug!("Logging already initialized: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_format() {
        assert_eq!("json".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("Pretty".parse::<LogFormat>(), Ok(LogFormat::Pretty));
        assert!("xml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_verbosity_overrides_level() {
        let config = LoggingConfig::default();
        assert_eq!(level_for(&config, 0), config.log_level);
        assert_eq!(level_for(&config, 2), "debug");
        assert_eq!(level_for(&config, 7), "trace");
    }

    #[test]
    fn test_init_twice() {
        let config = LoggingConfig::default();
        init_logging(&config, 0);
        init_logging(&config, 1);
    }
}
