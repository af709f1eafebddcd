//! Error types and handling for connfactory

use thiserror::Error;

/// Result type alias for connfactory operations
pub type Result<T> = std::result::Result<T, FactoryError>;

/// Main error type for every factory call
#[derive(Error, Debug)]
pub enum FactoryError {
    /// An optional driver is not compiled in or its runtime library is not loadable
    #[error("Missing driver: {driver} ({hint})")]
    MissingDriver { driver: String, hint: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The network call failed or returned an error status
    #[error("Transport error: {message}")]
    Transport { message: String, status: Option<u16> },

    /// The network call succeeded but the payload is missing required fields
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    /// A native driver reported a failure while connecting
    #[error("Driver error: {driver}: {message}")]
    Driver { driver: String, message: String },

    /// A remote service accepted the call but rejected the submitted work
    #[error("Rejected by remote service: {operation}: {message}")]
    Rejected { operation: String, message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic errors
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl FactoryError {
    /// Create a missing driver error
    pub fn missing_driver<S: Into<String>, H: Into<String>>(driver: S, hint: H) -> Self {
        Self::MissingDriver {
            driver: driver.into(),
            hint: hint.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a transport error without an HTTP status
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    /// Create a transport error carrying the HTTP status that caused it
    pub fn transport_status<S: Into<String>>(status: u16, message: S) -> Self {
        Self::Transport {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Create a protocol error
    pub fn protocol<S: Into<String>>(message: S) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Create a driver error
    pub fn driver<S: Into<String>, M: std::fmt::Display>(driver: S, message: M) -> Self {
        Self::Driver {
            driver: driver.into(),
            message: message.to_string(),
        }
    }

    /// Create a rejected-work error
    pub fn rejected<S: Into<String>, M: Into<String>>(operation: S, message: M) -> Self {
        Self::Rejected {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// HTTP status attached to a transport error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            FactoryError::Transport { status, .. } => *status,
            _ => None,
        }
    }

    /// Check if this error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        matches!(self, FactoryError::Transport { .. } | FactoryError::Io(_))
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            FactoryError::MissingDriver { .. } => "missing_driver",
            FactoryError::Config { .. } => "config",
            FactoryError::Transport { .. } => "transport",
            FactoryError::Protocol { .. } => "protocol",
            FactoryError::Driver { .. } => "driver",
            FactoryError::Rejected { .. } => "rejected",
            FactoryError::Io(_) => "io",
            FactoryError::Serde(_) => "serialization",
            FactoryError::Yaml(_) => "yaml",
            FactoryError::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for FactoryError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::transport_status(status.as_u16(), err.to_string()),
            None => Self::transport(err.to_string()),
        }
    }
}
