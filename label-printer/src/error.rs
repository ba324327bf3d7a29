//! Error types for the printer library

use thiserror::Error;

/// Printer link error types
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Connect failed: timeout, refusal or address resolution
    #[error("Connection failed: {reason}")]
    Connect { reason: String },

    /// Write failed or timed out; the link is dropped
    #[error("Send failed: {reason}")]
    Send { reason: String },

    /// Send attempted without a live connection
    #[error("Printer not connected")]
    NotConnected,

    /// Invalid printer configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl LinkError {
    pub fn connect(reason: impl Into<String>) -> Self {
        Self::Connect {
            reason: reason.into(),
        }
    }

    pub fn send(reason: impl Into<String>) -> Self {
        Self::Send {
            reason: reason.into(),
        }
    }
}

/// Result type for link operations
pub type LinkResult<T> = Result<T, LinkError>;

/// Label encoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LabelError {
    #[error("Invalid label input: {0} is missing")]
    InvalidLabelInput(&'static str),
}

/// Result type for label encoding
pub type LabelResult<T> = Result<T, LabelError>;

/// Printer config file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid printer config: {0}")]
    Invalid(String),
}
