//! Logging setup
//!
//! The leg itself only emits `tracing` events. Applications embedding it (and
//! the integration tests) install a subscriber through [`init_logging`].

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

use crate::errors::{LegError, LegResult};

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// The log level to use
    pub level: Level,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Whether to log spans
    pub log_spans: bool,
    /// Write to the test writer instead of stdout
    pub test_writer: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            file_info: false,
            log_spans: false,
            test_writer: false,
        }
    }
}

impl LoggingConfig {
    /// Create a new logging configuration
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level,
            ..Default::default()
        }
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Enable span logging
    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }

    /// Route output through libtest's capture
    pub fn for_tests(mut self) -> Self {
        self.test_writer = true;
        self
    }
}

/// Install a global subscriber.
///
/// `RUST_LOG` directives are honoured on top of the configured level. Fails if
/// a global subscriber is already installed.
pub fn init_logging(config: LoggingConfig) -> LegResult<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());

    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let result = if config.test_writer {
        builder.with_test_writer().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| LegError::Logging {
        message: e.to_string(),
    })
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> LegResult<Level> {
    Level::from_str(level).map_err(|_| LegError::config(format!("Invalid log level: {}", level)))
}
