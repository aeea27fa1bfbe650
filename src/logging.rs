//! # Logging
//!
//! Console and log file output on top of `tracing`. Every line is written as
//! `<timestamp>: <message>`.
//!
//! | macro     | console          | log file        |
//! |-----------|------------------|-----------------|
//! | `error!`  | always           | yes             |
//! | `info!`   | unless silent    | yes             |
//! | `debug!`  | no               | yes             |
//! | `trace!`  | no               | debug file only |

use std::fs::File;
use std::path::PathBuf;

use tracing::{Level, error};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::{self, format::Writer, time::FormatTime};
use tracing_subscriber::prelude::*;

use crate::config::{LoggingConfig, Verbosity};
use crate::errors::{DriverError, GridError, Result};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Local time with millisecond precision
pub fn timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Timer that terminates the timestamp with a colon
#[derive(Debug, Clone, Copy, Default)]
pub struct Timestamp;

impl FormatTime for Timestamp {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}:", timestamp())
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    console: bool,
    console_level: LevelFilter,
    file_path: Option<PathBuf>,
    file_level: LevelFilter,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self {
            console: true,
            console_level: LevelFilter::INFO,
            file_path: None,
            file_level: LevelFilter::DEBUG,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.console_level = LevelFilter::from_level(level);
        self
    }

    pub fn with_console(mut self, console: bool) -> Self {
        self.console = console;
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_file_level(mut self, level: Level) -> Self {
        self.file_level = LevelFilter::from_level(level);
        self
    }

    pub fn console_level(&self) -> LevelFilter {
        self.console_level
    }

    pub fn file_level(&self) -> LevelFilter {
        self.file_level
    }
}

impl From<&LoggingConfig> for LogConfig {
    fn from(logging: &LoggingConfig) -> Self {
        let console_level = match logging.verbosity {
            Verbosity::Silent => Level::ERROR,
            Verbosity::Normal | Verbosity::Verbose => Level::INFO,
        };
        let mut config = LogConfig::new().with_level(console_level);
        if let Some(path) = &logging.debug_file {
            config = config.with_file_path(path).with_file_level(Level::TRACE);
        } else if let Some(path) = &logging.log_file {
            config = config.with_file_path(path).with_file_level(Level::DEBUG);
        }
        config
    }
}

/// Flushes the log file when dropped
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber. The log file is truncated.
pub fn init_logging(config: LogConfig) -> Result<LogGuard> {
    let console_layer = config.console.then(|| {
        fmt::layer()
            .with_writer(std::io::stdout)
            .with_timer(Timestamp)
            .with_level(false)
            .with_target(false)
            .with_filter(config.console_level)
    });

    let (file_layer, guard) = match &config.file_path {
        Some(path) => {
            let file = File::create(path).map_err(|e| {
                GridError::Logging(format!("cannot open log file '{}': {}", path.display(), e))
            })?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(Timestamp)
                .with_level(false)
                .with_target(false)
                .with_filter(config.file_level);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| GridError::Logging(e.to_string()))?;

    Ok(LogGuard { _file: guard })
}

/// Report a fatal error, followed by one line per diagnostic record when
/// the driver supplied them
pub fn report_error(context: &str, err: &GridError) {
    match err {
        GridError::Driver(DriverError::Diagnostics(_)) => {
            error!("*** {context}: {}", err.code().message())
        }
        _ => error!("*** {context}: {err}"),
    }
    if let Some(stack) = err.stack() {
        for record in stack.records() {
            error!("{record}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_timestamp_format() {
        let mut out = String::new();
        Timestamp.format_time(&mut Writer::new(&mut out)).unwrap();
        // 2024-01-31 12:34:56.789:
        assert_eq!(out.len(), 24);
        assert!(out.ends_with(':'));
        assert_eq!(&out[4..5], "-");
        assert_eq!(&out[10..11], " ");
        assert_eq!(&out[19..20], ".");
    }

    #[test]
    fn test_levels_from_config() {
        let silent = LoggingConfig {
            verbosity: Verbosity::Silent,
            ..LoggingConfig::default()
        };
        let config = LogConfig::from(&silent);
        assert_eq!(config.console_level(), LevelFilter::ERROR);
        assert!(config.file_path.is_none());

        let logged = LoggingConfig {
            log_file: Some("run.log".into()),
            ..LoggingConfig::default()
        };
        let config = LogConfig::from(&logged);
        assert_eq!(config.console_level(), LevelFilter::INFO);
        assert_eq!(config.file_level(), LevelFilter::DEBUG);
        assert_eq!(config.file_path.as_deref(), Some(Path::new("run.log")));

        let debug = LoggingConfig {
            debug_file: Some("debug.log".into()),
            ..LoggingConfig::default()
        };
        assert_eq!(LogConfig::from(&debug).file_level(), LevelFilter::TRACE);
    }
}
