//! Error types for the call coordinator

use thiserror::Error;

/// Result type for coordinator operations
pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors that can occur in the call coordinator and its adapters
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Phone number could not be normalized
    #[error("Invalid phone number '{number}': {reason}")]
    InvalidNumber { number: String, reason: String },

    /// Operation not valid for the current call state
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Telephony adapter failure (registration, accept, dial, mute, ...)
    #[error("Telephony adapter error during {operation}: {details}")]
    Adapter { operation: String, details: String },

    /// Realtime status channel failure
    #[error("Status channel error: {message}")]
    Channel { message: String },

    /// Disposition record failed validation
    #[error("Invalid disposition: {reason}")]
    InvalidDisposition { reason: String },

    /// Disposition sink failed to persist a record
    #[error("Disposition submission failed: {message}")]
    Disposition { message: String },

    /// Wire payload could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The coordinator has been torn down
    #[error("Coordinator has shut down")]
    ShutDown,

    /// I/O error (config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoordinatorError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an invalid number error
    pub fn invalid_number(number: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNumber {
            number: number.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an adapter error
    pub fn adapter(operation: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Adapter {
            operation: operation.into(),
            details: details.into(),
        }
    }

    /// Create a channel error
    pub fn channel(message: impl Into<String>) -> Self {
        Self::Channel {
            message: message.into(),
        }
    }

    /// Create a disposition validation error
    pub fn invalid_disposition(reason: impl Into<String>) -> Self {
        Self::InvalidDisposition {
            reason: reason.into(),
        }
    }

    /// Create a disposition submission error
    pub fn disposition(message: impl Into<String>) -> Self {
        Self::Disposition {
            message: message.into(),
        }
    }
}

impl From<toml::de::Error> for CoordinatorError {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}
