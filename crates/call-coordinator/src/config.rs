//! Coordinator configuration
//!
//! All timing values the call lifecycle depends on live here. Defaults match
//! the agent desktop: a 20 second ring window before auto-reject and a 5 second
//! grace delay before a finished call clears from the dialer.
//!
//! ```rust
//! use casedesk_call_coordinator::config::CoordinatorConfig;
//! use std::time::Duration;
//!
//! let config = CoordinatorConfig::new()
//!     .with_room_key("agent-42")
//!     .with_ring_timeout(Duration::from_secs(15));
//!
//! assert_eq!(config.ring_timeout(), Duration::from_secs(15));
//! assert!(config.validate().is_ok());
//! ```
//!
//! Loading from TOML:
//!
//! ```rust
//! use casedesk_call_coordinator::config::CoordinatorConfig;
//!
//! let config = CoordinatorConfig::from_toml_str(r#"
//!     room_key = "agent-7"
//!     ring_timeout_secs = 30
//! "#).unwrap();
//!
//! assert_eq!(config.room_key, "agent-7");
//! assert_eq!(config.reset_grace_secs, 5);
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CoordinatorError, CoordinatorResult};

pub const DEFAULT_RING_TIMEOUT_SECS: u64 = 20;
pub const DEFAULT_RESET_GRACE_SECS: u64 = 5;
pub const DEFAULT_POST_CALL_RESET_SECS: u64 = 5;
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoordinatorConfig {
    /// Key of the agent room on the status channel
    pub room_key: String,
    /// Unanswered inbound calls are rejected after this many seconds
    pub ring_timeout_secs: u64,
    /// Missed, failed and unconnected sessions clear after this many seconds
    pub reset_grace_secs: u64,
    /// Completed sessions clear after this many seconds unless the
    /// disposition is dismissed first
    pub post_call_reset_secs: u64,
    /// Capacity of the broadcast event stream
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            room_key: String::new(),
            ring_timeout_secs: DEFAULT_RING_TIMEOUT_SECS,
            reset_grace_secs: DEFAULT_RESET_GRACE_SECS,
            post_call_reset_secs: DEFAULT_POST_CALL_RESET_SECS,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_room_key(mut self, room_key: impl Into<String>) -> Self {
        self.room_key = room_key.into();
        self
    }

    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_reset_grace(mut self, grace: Duration) -> Self {
        self.reset_grace_secs = grace.as_secs();
        self
    }

    pub fn with_post_call_reset(mut self, delay: Duration) -> Self {
        self.post_call_reset_secs = delay.as_secs();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn ring_timeout(&self) -> Duration {
        Duration::from_secs(self.ring_timeout_secs)
    }

    pub fn reset_grace(&self) -> Duration {
        Duration::from_secs(self.reset_grace_secs)
    }

    pub fn post_call_reset(&self) -> Duration {
        Duration::from_secs(self.post_call_reset_secs)
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(source: &str) -> CoordinatorResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> CoordinatorResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded coordinator config from {}", path.display());
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> CoordinatorResult<()> {
        if self.ring_timeout_secs == 0 {
            return Err(CoordinatorError::config("ring_timeout_secs must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(CoordinatorError::config("event_capacity must be positive"));
        }
        if self.room_key.chars().any(char::is_whitespace) {
            return Err(CoordinatorError::config(format!(
                "room_key '{}' must not contain whitespace",
                self.room_key
            )));
        }
        Ok(())
    }
}
