/// Unified error handling for the puente client
///
/// This module provides a single error type covering every failure surface
/// of the client: transport failures, protocol decoding failures, seed
/// exhaustion during connect, and server-reported command errors.

use std::io;
use thiserror::Error;

use crate::options::OptionsError;

/// Main error type for puente client operations
#[derive(Debug, Error)]
pub enum PuenteError {
    /// The remote host actively refused the TCP connection
    #[error("Connection refused by {address}")]
    ConnectionRefused { address: String },

    /// An operation did not complete within its deadline
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// The server answered the handshake with a failure document
    #[error("Handshake rejected: {message}")]
    HandshakeRejected { message: String },

    /// Every seed in the list was tried and none accepted a connection
    #[error("No reachable seed after {attempted} attempt(s)")]
    NoReachableSeed { attempted: usize },

    /// An operation was issued while the connection is not in the
    /// Connected state
    #[error("Not connected")]
    NotConnected,

    /// Writing to the socket failed; the connection is no longer usable
    #[error("Write error: {0}")]
    WriteError(#[source] io::Error),

    /// The connection dropped while requests were still outstanding
    #[error("Connection lost")]
    ConnectionLost,

    /// The byte stream could not be decoded as a wire-protocol message
    #[error("Malformed message: {message}")]
    MalformedMessage { message: String },

    /// The server replied to a command with an error document
    #[error("Server error (code {code}): {message}")]
    ServerError { code: i32, message: String },

    /// The operation was abandoned by closing the connection or client
    #[error("Operation cancelled")]
    Cancelled,

    /// A MongoDB connection URI could not be parsed
    #[error("Invalid MongoDB URI: {0}")]
    InvalidUri(String),

    /// Client options errors
    #[error("Options error: {0}")]
    Options(#[from] OptionsError),

    /// Other network-level errors
    #[error("Network error: {0}")]
    Network(#[from] io::Error),
}

/// Result type alias for puente operations
pub type PuenteResult<T> = Result<T, PuenteError>;

/// Convenience methods for creating specific error types
impl PuenteError {
    /// Create a connection-refused error
    pub fn connection_refused<S: Into<String>>(address: S) -> Self {
        PuenteError::ConnectionRefused {
            address: address.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        PuenteError::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a handshake-rejected error
    pub fn handshake_rejected<S: Into<String>>(message: S) -> Self {
        PuenteError::HandshakeRejected {
            message: message.into(),
        }
    }

    /// Create a malformed-message error
    pub fn malformed<S: Into<String>>(message: S) -> Self {
        PuenteError::MalformedMessage {
            message: message.into(),
        }
    }

    /// Create a server error from a reply code and message
    pub fn server<S: Into<String>>(code: i32, message: S) -> Self {
        PuenteError::ServerError {
            code,
            message: message.into(),
        }
    }

    /// Check if this error is transient (a retry against the same or
    /// another server may succeed)
    pub fn is_transient(&self) -> bool {
        match self {
            PuenteError::ConnectionRefused { .. } => true,
            PuenteError::Timeout { .. } => true,
            PuenteError::ConnectionLost => true,
            PuenteError::WriteError(_) => true,
            PuenteError::Network(_) => true,
            _ => false,
        }
    }

    /// Check if this error is fatal to the connection that produced it
    pub fn is_fatal_to_connection(&self) -> bool {
        matches!(
            self,
            PuenteError::WriteError(_)
                | PuenteError::ConnectionLost
                | PuenteError::MalformedMessage { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = PuenteError::connection_refused("127.0.0.1:27017");
        assert!(matches!(error, PuenteError::ConnectionRefused { .. }));
        assert_eq!(error.to_string(), "Connection refused by 127.0.0.1:27017");
    }

    #[test]
    fn test_server_error_display() {
        let error = PuenteError::server(59, "no such command");
        assert_eq!(error.to_string(), "Server error (code 59): no such command");
    }

    #[test]
    fn test_error_transience() {
        assert!(PuenteError::ConnectionLost.is_transient());
        assert!(PuenteError::timeout("connect").is_transient());
        assert!(!PuenteError::server(1, "oops").is_transient());
        assert!(!PuenteError::Cancelled.is_transient());
    }

    #[test]
    fn test_fatal_to_connection() {
        assert!(PuenteError::malformed("truncated header").is_fatal_to_connection());
        assert!(PuenteError::ConnectionLost.is_fatal_to_connection());
        assert!(!PuenteError::server(1, "oops").is_fatal_to_connection());
        assert!(!PuenteError::NotConnected.is_fatal_to_connection());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::BrokenPipe, "pipe");
        let error: PuenteError = io_error.into();
        assert!(matches!(error, PuenteError::Network(_)));
        assert!(error.is_transient());
    }
}
