//! Logging setup for binaries embedding the coordinator
//!
//! The library only emits `tracing` events. A binary calls [`setup_logging`]
//! once at startup; the chosen level applies to the casedesk targets while
//! everything else stays at `warn`. A `RUST_LOG` variable replaces the
//! default filter entirely.

use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{CoordinatorError, CoordinatorResult};

/// Targets that follow the configured level
const CASEDESK_TARGETS: &[&str] = &["casedesk_call_coordinator", "casedesk"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: Level,
    /// One JSON object per line instead of the human format
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Filter used when `RUST_LOG` is not set, e.g.
    /// `warn,casedesk_call_coordinator=debug,casedesk=debug`
    pub fn default_directives(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        let mut directives = String::from("warn");
        for target in CASEDESK_TARGETS {
            directives.push_str(&format!(",{}={}", target, level));
        }
        directives
    }

    fn filter(&self) -> CoordinatorResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(self.default_directives())
            .map_err(|e| CoordinatorError::config(format!("Invalid log filter: {}", e)))
    }
}

/// Install the global subscriber
///
/// Fails if a global subscriber is already installed.
pub fn setup_logging(config: LoggingConfig) -> CoordinatorResult<()> {
    let builder = fmt::Subscriber::builder().with_env_filter(config.filter()?);

    let result = if config.json {
        builder.json().with_writer(std::io::stdout).try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|e| CoordinatorError::config(format!("Failed to install logger: {}", e)))?;

    tracing::info!("casedesk call coordinator v{}", crate::VERSION);
    Ok(())
}

/// Parse a log level name, case-insensitively
pub fn parse_log_level(level: &str) -> CoordinatorResult<Level> {
    Level::from_str(level).map_err(|_| CoordinatorError::config(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
        assert!(parse_log_level("chatty").is_err());
    }

    #[test]
    fn test_default_directives_scope_level_to_casedesk() {
        let config = LoggingConfig::new(Level::DEBUG).with_json();
        assert!(config.json);
        assert_eq!(
            config.default_directives(),
            "warn,casedesk_call_coordinator=debug,casedesk=debug"
        );
        assert!(EnvFilter::try_new(config.default_directives()).is_ok());
    }
}
