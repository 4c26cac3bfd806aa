//! Error handling
//!
//! Provides typed errors for table operations. Most runtime faults
//! (timeouts, unresolvable hosts, mistyped values) never reach this type:
//! they are absorbed where they happen and degrade to "no update".

use std::io;
use thiserror::Error;

use crate::value::ValueKind;

/// Errors that can occur while talking to the table server
#[derive(Error, Debug)]
pub enum NtError {
    /// Path has no separator, or an empty table or key part
    #[error("Invalid path '{path}': expected '<table>/<key>'")]
    InvalidPath { path: String },

    /// Text could not be parsed into a value of the requested kind
    #[error("Invalid {kind} value '{input}': {details}")]
    InvalidValue {
        kind: ValueKind,
        input: String,
        details: String,
    },

    /// Transport-level failure (socket, handshake)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Peer sent something we could not decode
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Operation needs a live connection
    #[error("Not connected to a table server")]
    NotConnected,

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl NtError {
    /// Create an invalid-path error
    pub fn invalid_path(path: impl Into<String>) -> Self {
        NtError::InvalidPath { path: path.into() }
    }

    /// Check if retrying (e.g. reconnecting) can make this error go away
    ///
    /// Malformed paths and values are programmer errors and stay broken.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            NtError::Transport(_) | NtError::NotConnected | NtError::Io(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for NtError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        NtError::Transport(error.to_string())
    }
}

/// Result type for table operations
pub type NtResult<T> = Result<T, NtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_path_display() {
        let err = NtError::invalid_path("SmartDashboard");

        let msg = err.to_string();
        assert!(msg.contains("Invalid path"));
        assert!(msg.contains("SmartDashboard"));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_invalid_value_display() {
        let err = NtError::InvalidValue {
            kind: ValueKind::Double,
            input: "fast".to_string(),
            details: "invalid float literal".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("double"));
        assert!(msg.contains("fast"));
    }

    #[test]
    fn test_transport_errors_are_recoverable() {
        assert!(NtError::Transport("connection refused".to_string()).is_recoverable());
        assert!(NtError::NotConnected.is_recoverable());

        let io_err = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert!(NtError::from(io_err).is_recoverable());
    }
}
