//! Error types for the playground client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use playground_client::{Result, Session};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     let reply = session.eval("1 + 1").await?;
//!     println!("{}", reply.get_string("result"));
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Submission | [`Error::NotConnected`], [`Error::ReplyDropped`] |
//! | Decoding | [`Error::Decode`] |
//!
//! Lifecycle failures (connect attempts, transport errors) and decode
//! failures on inbound messages are handled inside the supervisor task and
//! logged; they surface to the caller only as connection-state transitions.
//! The variants here are the ones that cross the public API boundary.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::transport::ConnectionState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when the session configuration is invalid, e.g. a malformed
    /// endpoint address or an unsupported URL scheme.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// WebSocket connection failed.
    ///
    /// Returned when the connection cannot be established.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Connect attempt timed out.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The session's supervisor task is gone.
    ///
    /// Returned when a handle is used after the connection has shut down.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Submission Errors
    // ========================================================================
    /// A submission was attempted while the connection is not open.
    ///
    /// The request is dropped: no reply handler is stored and nothing is
    /// written to the transport.
    #[error("Not connected: session is {state}")]
    NotConnected {
        /// Connection state observed at submission time.
        state: ConnectionState,
    },

    /// The pending reply handler was discarded before a reply arrived.
    ///
    /// Observed by the awaitable submission form when the connection is
    /// lost, the session is closed, or a newer submission overwrites the
    /// reply-handler slot.
    #[error("Pending reply dropped before a response arrived")]
    ReplyDropped,

    // ========================================================================
    // Decoding Errors
    // ========================================================================
    /// An inbound message could not be decoded as a JSON record.
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a not-connected error.
    #[inline]
    pub fn not_connected(state: ConnectionState) -> Self {
        Self::NotConnected { state }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. } | Self::ConnectionTimeout { .. } | Self::ConnectionClosed
        )
    }

    /// Returns `true` if this is a decode error.
    #[inline]
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Self::Decode(_))
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry, e.g. once the connection
    /// state returns to open.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::NotConnected {
                state: ConnectionState::Connecting
            } | Self::ConnectionTimeout { .. }
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_config_error() {
        let err = Error::config("invalid endpoint scheme");
        assert_eq!(
            err.to_string(),
            "Configuration error: invalid endpoint scheme"
        );
    }

    #[test]
    fn test_not_connected_display() {
        let err = Error::not_connected(ConnectionState::Connecting);
        assert_eq!(err.to_string(), "Not connected: session is connecting");
    }

    #[test]
    fn test_is_connection_error() {
        let conn_err = Error::connection("test");
        let timeout_err = Error::ConnectionTimeout { timeout_ms: 1000 };
        let closed_err = Error::ConnectionClosed;
        let other_err = Error::config("test");

        assert!(conn_err.is_connection_error());
        assert!(timeout_err.is_connection_error());
        assert!(closed_err.is_connection_error());
        assert!(!other_err.is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        let connecting = Error::not_connected(ConnectionState::Connecting);
        let failed = Error::not_connected(ConnectionState::Failed);
        let config_err = Error::config("test");

        assert!(connecting.is_recoverable());
        assert!(!failed.is_recoverable());
        assert!(!config_err.is_recoverable());
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.is_decode_error());
    }
}
