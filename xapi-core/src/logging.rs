//! Structured logging bootstrap.
//!
//! Thin wrapper over `tracing-subscriber`: pick a level and an output format,
//! call [`init_logging`] once at startup. `RUST_LOG` overrides the configured
//! level when set.

use tracing::Level;
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    registry::Registry,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Most detailed debugging output.
    Trace,
    /// Detailed debugging output.
    Debug,
    /// Business events.
    Info,
    /// Potential issues.
    Warn,
    /// Errors only.
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    Pretty,
    /// Single-line output.
    Compact,
    /// JSON output for production environments.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log verbosity, unless `RUST_LOG` overrides it.
    pub level: LogLevel,
    /// Output format.
    pub format: LogFormat,
    /// Whether to include the target module path.
    pub show_target: bool,
    /// Whether to include thread ids.
    pub show_thread_ids: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Pretty,
            show_target: true,
            show_thread_ids: false,
        }
    }
}

impl LogConfig {
    /// Configuration for development environments.
    pub fn development() -> Self {
        Self {
            level: LogLevel::Debug,
            format: LogFormat::Pretty,
            ..Self::default()
        }
    }

    /// Configuration for production environments.
    pub fn production() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Json,
            show_thread_ids: true,
            ..Self::default()
        }
    }

    /// Configuration for test environments.
    pub fn test() -> Self {
        Self {
            level: LogLevel::Warn,
            format: LogFormat::Compact,
            show_target: false,
            ..Self::default()
        }
    }
}

fn build_layer(config: &LogConfig) -> Box<dyn Layer<Registry> + Send + Sync> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "xapi_core={level},xapi_client={level}",
            level = config.level
        ))
    });

    match config.format {
        LogFormat::Pretty => fmt::layer()
            .pretty()
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_filter(env_filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(config.show_target)
            .with_thread_ids(config.show_thread_ids)
            .with_filter(env_filter)
            .boxed(),
    }
}

/// Initializes the logging system.
///
/// # Panics
///
/// Panics when a global subscriber is already set; use [`try_init_logging`]
/// in tests.
pub fn init_logging(config: &LogConfig) {
    tracing_subscriber::registry().with(build_layer(config)).init();
}

/// Initializes the logging system, ignoring a previously installed
/// subscriber. Returns `false` when initialization was skipped.
pub fn try_init_logging(config: &LogConfig) -> bool {
    tracing_subscriber::registry()
        .with(build_layer(config))
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_display() {
        assert_eq!(LogLevel::Debug.to_string(), "debug");
        assert_eq!(LogLevel::Error.to_string(), "error");
    }

    #[test]
    fn presets() {
        assert_eq!(LogConfig::development().level, LogLevel::Debug);
        assert_eq!(LogConfig::production().format, LogFormat::Json);
        assert_eq!(LogConfig::test().format, LogFormat::Compact);
    }

    #[test]
    fn try_init_is_idempotent() {
        let config = LogConfig::test();
        try_init_logging(&config);
        // Second call must not panic, whatever the first one did.
        try_init_logging(&config);
    }
}
