//! Unix Socket Transport
//!
//! Client side of the daemon's local stream socket. One [`FramedSocket`]
//! owns the stream plus a [`FrameDecoder`] so that bytes read past the end
//! of one frame are kept for the next read.

use std::path::Path;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use crate::error::ChainError;
use crate::transport::frame::FrameDecoder;

/// Default read chunk size
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

/// A connected daemon socket that speaks NUL-terminated frames
#[derive(Debug)]
pub struct FramedSocket {
    stream: UnixStream,
    decoder: FrameDecoder,
    read_buf: Vec<u8>,
}

impl FramedSocket {
    /// Connect to the daemon socket at `path`
    ///
    /// # Errors
    ///
    /// Returns `ChainError::Io` if the socket cannot be opened.
    pub async fn connect(
        path: &Path,
        max_frame_size: usize,
        read_buffer_size: usize,
    ) -> Result<Self, ChainError> {
        let stream = UnixStream::connect(path).await?;
        tracing::debug!(path = %path.display(), "Socket connected");
        Ok(Self::from_stream(stream, max_frame_size, read_buffer_size))
    }

    /// Wrap an already connected stream
    #[must_use]
    pub fn from_stream(stream: UnixStream, max_frame_size: usize, read_buffer_size: usize) -> Self {
        Self {
            stream,
            decoder: FrameDecoder::with_max_frame_size(max_frame_size),
            read_buf: vec![0u8; read_buffer_size.max(1)],
        }
    }

    /// Write one encoded frame
    ///
    /// # Errors
    ///
    /// Returns `ChainError::Io` if the peer has gone away.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<(), ChainError> {
        self.stream.write_all(frame).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Read the next frame payload (terminator stripped)
    ///
    /// Cancel safe: bytes are only moved into the decoder after a read
    /// completes, so dropping this future never loses data.
    ///
    /// # Errors
    ///
    /// - `ChainError::ConnectionClosed` on EOF
    /// - `ChainError::Io` on a socket error
    /// - `ChainError::Protocol` if a frame exceeds the size limit; the
    ///   connection stays usable
    pub async fn read_frame(&mut self) -> Result<Vec<u8>, ChainError> {
        loop {
            if let Some(payload) = self.decoder.next_frame()? {
                return Ok(payload);
            }

            let n = self.stream.read(&mut self.read_buf).await?;
            if n == 0 {
                tracing::debug!("Connection closed by daemon");
                return Err(ChainError::ConnectionClosed);
            }
            self.decoder.push(&self.read_buf[..n]);
        }
    }
}
