//! Error types for c10k-life.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use c10k_life::{Result, Error};
//!
//! async fn example(session: &mut Session<TcpStream>) -> Result<()> {
//!     session.send_text("0 3 4 1").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants | Blast radius |
//! |----------|----------|--------------|
//! | Protocol | [`Error::Protocol`] | one session |
//! | Handshake | [`Error::Handshake`] | connection never promoted |
//! | Sequencing | [`Error::Sequencing`] | one worker session |
//! | Transport | [`Error::ConnectionClosed`], [`Error::Io`] | one session |
//!
//! No error here crosses into another connection's task or into the
//! coordinator's shared counters, which only advance through their own
//! entry points.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;

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
    // Protocol Errors
    // ========================================================================
    /// WebSocket framing violation.
    ///
    /// Returned for malformed frames: reserved bits set, reserved opcode,
    /// wrong masking direction, fragmented or oversized control frame,
    /// a continuation frame with a non-zero opcode, invalid UTF-8 in a
    /// text message, or a stream that ends short of the declared payload
    /// length. Always fatal to the single session.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the framing violation.
        message: String,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// WebSocket upgrade admission failure.
    ///
    /// Returned when the inbound HTTP request is missing or carries
    /// invalid upgrade headers. The connection is answered with 400 and
    /// never promoted to a session.
    #[error("Handshake error: {message}")]
    Handshake {
        /// Description of the admission failure.
        message: String,
    },

    // ========================================================================
    // Sequencing Errors
    // ========================================================================
    /// Application protocol violation.
    ///
    /// Returned when a specific control token was required and something
    /// else arrived (e.g. a non-"sub" token during the subscribe phase),
    /// when a neighbor update targets the wrong generation parity, or
    /// when a barrier was discarded by a reset while still awaited.
    /// Fatal to that worker's session only.
    #[error("Sequencing error: {message}")]
    Sequencing {
        /// Description of the ordering violation.
        message: String,
    },

    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Session closed.
    ///
    /// Returned on writes after the local close frame was sent and on
    /// reads after the remote close frame was observed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a handshake error.
    #[inline]
    pub fn handshake(message: impl Into<String>) -> Self {
        Self::Handshake {
            message: message.into(),
        }
    }

    /// Creates a sequencing error.
    #[inline]
    pub fn sequencing(message: impl Into<String>) -> Self {
        Self::Sequencing {
            message: message.into(),
        }
    }

    /// Creates a sequencing error for an unexpected control token.
    #[inline]
    pub fn unexpected_token(expected: &str, received: &str) -> Self {
        Self::Sequencing {
            message: format!("expected {expected:?}, received {received:?}"),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a framing-level protocol error.
    #[inline]
    #[must_use]
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns `true` if this is a transport error.
    ///
    /// Transport errors surface as end-of-stream to the owning task's
    /// read loop.
    #[inline]
    #[must_use]
    pub fn is_transport_error(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::Io(_))
    }

    /// Returns `true` if the peer violated the framing or application
    /// protocol, as opposed to the transport going away.
    #[inline]
    #[must_use]
    pub fn is_peer_misbehavior(&self) -> bool {
        matches!(self, Self::Protocol { .. } | Self::Sequencing { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::protocol("reserved bits must be 0");
        assert_eq!(err.to_string(), "Protocol error: reserved bits must be 0");
    }

    #[test]
    fn test_handshake_error() {
        let err = Error::handshake("missing Sec-WebSocket-Key");
        assert_eq!(
            err.to_string(),
            "Handshake error: missing Sec-WebSocket-Key"
        );
    }

    #[test]
    fn test_unexpected_token() {
        let err = Error::unexpected_token("run", "3 4 1");
        assert_eq!(
            err.to_string(),
            "Sequencing error: expected \"run\", received \"3 4 1\""
        );
    }

    #[test]
    fn test_is_transport_error() {
        let closed = Error::ConnectionClosed;
        let io = Error::from(IoError::new(ErrorKind::BrokenPipe, "pipe"));
        let proto = Error::protocol("x");

        assert!(closed.is_transport_error());
        assert!(io.is_transport_error());
        assert!(!proto.is_transport_error());
    }

    #[test]
    fn test_is_peer_misbehavior() {
        assert!(Error::protocol("x").is_peer_misbehavior());
        assert!(Error::sequencing("x").is_peer_misbehavior());
        assert!(!Error::ConnectionClosed.is_peer_misbehavior());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
