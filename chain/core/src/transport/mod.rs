//! Transport Layer for the Daemon Socket
//!
//! - `frame`: NUL-terminated JSON framing
//! - `unix_socket`: the local stream socket carrying those frames
//!
//! Replies and unsolicited events share the one socket. Callers must keep
//! at most one read pending on a [`FramedSocket`] at a time.

pub mod frame;
pub mod unix_socket;

// Re-exports for convenience
pub use frame::{encode, FrameDecoder, DEFAULT_MAX_FRAME_SIZE, FRAME_TERMINATOR};
pub use unix_socket::{FramedSocket, DEFAULT_READ_BUFFER_SIZE};
