//! Error Types
//!
//! Two layers of failure:
//! - [`ProtocolError`]: a single frame could not be used (bad JSON, unknown
//!   name, reply for the wrong request). The frame is logged and dropped.
//! - [`ChainError`]: anything a caller of the listener can observe, including
//!   loss of the connection itself.

use thiserror::Error;

/// Errors that make one frame unusable
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Outgoing message could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Incoming frame is not a JSON object of a known shape
    #[error("Malformed frame: {0}")]
    Malformed(String),

    /// Daemon sent more bytes than allowed without a terminator
    #[error("Frame exceeds maximum size of {max} bytes")]
    FrameTooLarge {
        /// Configured limit
        max: usize,
    },

    /// Reply name is not part of the daemon vocabulary
    #[error("Unknown reply '{0}'")]
    UnknownReply(String),

    /// Event name is not part of the daemon vocabulary
    #[error("Unknown event '{0}'")]
    UnknownEvent(String),

    /// Reply does not answer the request in flight
    #[error("Reply name mismatch: expected '{expected}', got '{actual}'")]
    ReplyMismatch {
        /// Name of the request waiting on the wire
        expected: String,
        /// Name the daemon replied with
        actual: String,
    },

    /// An event arrived where a reply was expected
    #[error("Received event '{event}' while waiting for reply '{expected}'")]
    UnexpectedEvent {
        /// Name of the request waiting on the wire
        expected: String,
        /// Name of the event that arrived instead
        event: String,
    },

    /// A reply arrived while no request was pending
    #[error("Received reply '{0}' with no request pending")]
    UnsolicitedReply(String),

    /// A frame arrived between requests before events were enabled
    #[error("Received frame before device events were enabled")]
    EventsDisabled,
}

/// Errors surfaced by the listener and its transport
#[derive(Debug, Error)]
pub enum ChainError {
    /// IO error from the socket
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the socket
    #[error("Connection closed")]
    ConnectionClosed,

    /// No socket is open
    #[error("Not connected")]
    NotConnected,

    /// The listener task has stopped and no longer accepts commands
    #[error("Listener stopped")]
    ListenerStopped,

    /// The request was discarded before a usable reply arrived
    #[error("Request '{0}' was dropped without a reply")]
    RequestDropped(&'static str),

    /// Frame-level failure
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl ChainError {
    /// Whether this error means the socket is gone
    ///
    /// Protocol errors only spoil one frame; everything else on the
    /// transport path ends the connection.
    #[must_use]
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::ConnectionClosed | Self::NotConnected
        )
    }
}
