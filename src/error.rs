//! Error types for the socket adapter layer.
//!
//! Nothing in this crate raises out of event handling: every failure a
//! connection can run into is delivered as an error event on the socket
//! that owns it. The types here are what those events carry.

use thiserror::Error;

use crate::close::CloseCode;

/// Result type alias for socket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by sockets and listeners.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Base64 text payload exceeds the derived maximum length.
    #[error("Frame base64 length exceeds max: {len} (max: {max})")]
    Base64TooLarge {
        /// Actual text length.
        len: usize,
        /// Maximum allowed base64 length.
        max: usize,
    },

    /// Decoded payload exceeds the configured maximum frame size.
    #[error("Frame length exceeds max: {len} (max: {max})")]
    FrameTooLarge {
        /// Actual payload size.
        len: usize,
        /// Maximum allowed frame size.
        max: usize,
    },

    /// Payload shape that cannot be normalized into bytes.
    #[error("Bad data object")]
    BadPayload,

    /// Text payload is not valid base64.
    #[error("Invalid base64 payload")]
    InvalidBase64,

    /// Invalid hex input passed to a text write.
    #[error("Invalid hex payload")]
    InvalidHex,

    /// Abnormal or policy closure reported by the peer.
    #[error("Websocket Closed: {reason} (code={}).", code.name())]
    Closed {
        /// Mapped close code.
        code: CloseCode,
        /// Close reason supplied by the peer, or "Unknown reason".
        reason: String,
    },

    /// Transport-level error reported by the protocol engine.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Client handshake or dial failure.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Listener-level I/O error.
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// The consumer-facing close-code name carried by this error.
    ///
    /// [`Error::Closed`] reports the mapped name from the close-code
    /// table; every other error kind reports `UNKNOWN_CODE`.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Error::Closed { code, .. } => code.name(),
            _ => "UNKNOWN_CODE",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}
