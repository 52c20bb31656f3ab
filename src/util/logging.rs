//! Structured logging setup for repkeeper
//!
//! Logs go to stderr so that `--format json` output on stdout stays
//! machine-readable. The level comes from, in order of precedence:
//!
//! 1. `RUST_LOG`, when set, replaces the filter entirely
//! 2. `--log-level`, `-v` or `-q` on the command line
//! 3. `log_level` in the configuration (or `REPKEEPER_LOG_LEVEL`)
//!
//! `REPKEEPER_LOG_JSON=true` switches to JSON lines.
//!
//! # Example
//!
//! ```no_run
//! use repkeeper::util::logging::{self, LoggingConfig};
//! use tracing::Level;
//!
//! logging::init_logging(LoggingConfig::with_level(Level::DEBUG));
//! tracing::info!(app = "billing", version = 3, "Created archive");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ensures logging is only initialized once
static INIT: Once = Once::new();

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for repkeeper's own events
    pub level: Level,

    /// Emit JSON lines instead of human-readable output
    pub use_json: bool,

    /// Include the module target (e.g., repkeeper::workflow) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    /// Include thread ID and name in logs
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: false,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Apply `REPKEEPER_LOG_JSON` on top of this configuration. JSON lines
    /// carry full metadata for log shippers.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(use_json) = env::var("REPKEEPER_LOG_JSON")
            .ok()
            .and_then(|v| v.parse::<bool>().ok())
        {
            self.use_json = use_json;
            self.include_target |= use_json;
            self.include_location |= use_json;
            self.include_thread_ids |= use_json;
        }
        self
    }

    fn filter(&self) -> EnvFilter {
        if env::var("RUST_LOG").is_ok() {
            return EnvFilter::from_default_env();
        }
        // Dependencies stay at warn; repkeeper follows the configured level.
        EnvFilter::new(format!(
            "{},repkeeper={}",
            LevelFilter::WARN,
            self.level.as_str().to_lowercase()
        ))
    }
}

/// Parses a log level from a string, case-insensitively.
///
/// Unknown values fall back to `INFO`.
///
/// ```
/// use repkeeper::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("WARN"), Level::WARN);
/// assert_eq!(parse_level("loud"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = config.filter();

        if config.use_json {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .try_init();
        } else {
            let _ = tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_target(config.include_target)
                        .with_file(config.include_location)
                        .with_line_number(config.include_location)
                        .with_thread_ids(config.include_thread_ids)
                        .with_thread_names(config.include_thread_ids),
                )
                .try_init();
        }
    });
}
