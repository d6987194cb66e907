//! Frame Protocol
//!
//! Wire format for daemon messages: a UTF-8 JSON object followed by a single
//! NUL byte. There is no length prefix, so the decoder scans for the
//! terminator.
//!
//! # Frame Format
//!
//! ```text
//! +------------------------------------------+------+
//! | JSON Payload (variable)                  | 0x00 |
//! | request, reply or event object           |      |
//! +------------------------------------------+------+
//! ```
//!
//! # Security
//!
//! - Maximum frame size is enforced so a peer that never sends the
//!   terminator cannot grow the buffer without bound
//! - `serde_json` escapes control characters, so an encoded payload never
//!   contains a raw NUL

use serde::Serialize;

use crate::error::ProtocolError;

/// Byte that ends every frame
pub const FRAME_TERMINATOR: u8 = 0x00;

/// Default maximum frame size (1 MB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Minimum buffer capacity for decoder
const MIN_BUFFER_CAPACITY: usize = 4096;

/// Encode a message to a NUL-terminated frame
///
/// # Errors
///
/// Returns `ProtocolError::Serialization` if JSON serialization fails.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut buf =
        serde_json::to_vec(msg).map_err(|e| ProtocolError::Serialization(e.to_string()))?;
    debug_assert!(!buf.contains(&FRAME_TERMINATOR));
    buf.push(FRAME_TERMINATOR);
    Ok(buf)
}

/// Decoder state machine for streaming frame parsing
///
/// Buffers incoming bytes and yields complete payloads with the terminator
/// stripped.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Position where we've consumed up to
    read_pos: usize,
    /// Position up to which the buffer is known to hold no terminator
    scan_pos: usize,
    max_frame_size: usize,
    /// Dropping the tail of an oversized frame until its terminator
    discarding: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// Create a new decoder with the default frame size limit
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_size(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Create a decoder that rejects frames longer than `max_frame_size`
    #[must_use]
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(MIN_BUFFER_CAPACITY),
            read_pos: 0,
            scan_pos: 0,
            max_frame_size,
            discarding: false,
        }
    }

    /// Append bytes to the buffer
    pub fn push(&mut self, data: &[u8]) {
        // Compact buffer if we've consumed a lot
        if self.read_pos > self.buffer.len() / 2 && self.read_pos > MIN_BUFFER_CAPACITY {
            self.buffer.drain(..self.read_pos);
            self.scan_pos -= self.read_pos;
            self.read_pos = 0;
        }
        self.buffer.extend_from_slice(data);
    }

    /// Get the number of bytes available in the buffer
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len() - self.read_pos
    }

    /// Try to take the next complete frame
    ///
    /// Returns:
    /// - `Ok(Some(payload))` if a terminator was found
    /// - `Ok(None)` if more data is needed
    /// - `Err(ProtocolError::FrameTooLarge)` if the pending frame outgrew the
    ///   limit; the oversized bytes are discarded, and so is the rest of that
    ///   frame as it arrives
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, ProtocolError> {
        if self.discarding && !self.skip_oversized_tail() {
            return Ok(None);
        }

        let start = self.scan_pos.max(self.read_pos);
        match self.buffer[start..]
            .iter()
            .position(|&b| b == FRAME_TERMINATOR)
        {
            Some(offset) => {
                let end = start + offset;
                if end - self.read_pos > self.max_frame_size {
                    self.discard_through(end + 1);
                    return Err(ProtocolError::FrameTooLarge {
                        max: self.max_frame_size,
                    });
                }
                let payload = self.buffer[self.read_pos..end].to_vec();
                self.discard_through(end + 1);
                Ok(Some(payload))
            }
            None => {
                self.scan_pos = self.buffer.len();
                if self.available() > self.max_frame_size {
                    self.reset_buffer();
                    self.discarding = true;
                    return Err(ProtocolError::FrameTooLarge {
                        max: self.max_frame_size,
                    });
                }
                Ok(None)
            }
        }
    }

    /// Drop bytes up to and including the terminator of an oversized frame
    ///
    /// Returns `false` while the terminator has not arrived yet.
    fn skip_oversized_tail(&mut self) -> bool {
        match self.buffer[self.read_pos..]
            .iter()
            .position(|&b| b == FRAME_TERMINATOR)
        {
            Some(offset) => {
                self.discarding = false;
                self.discard_through(self.read_pos + offset + 1);
                true
            }
            None => {
                self.reset_buffer();
                false
            }
        }
    }

    fn discard_through(&mut self, pos: usize) {
        self.read_pos = pos;
        self.scan_pos = pos;
        if self.read_pos == self.buffer.len() {
            self.reset_buffer();
        }
    }

    fn reset_buffer(&mut self) {
        self.buffer.clear();
        self.read_pos = 0;
        self.scan_pos = 0;
    }

    /// Clear the buffer and any partially discarded frame
    pub fn clear(&mut self) {
        self.reset_buffer();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_appends_terminator() {
        let encoded = encode(&json!({"request": "device_list", "data": null})).unwrap();

        assert_eq!(encoded.last(), Some(&FRAME_TERMINATOR));
        assert_eq!(
            encoded.iter().filter(|&&b| b == FRAME_TERMINATOR).count(),
            1
        );
    }

    #[test]
    fn test_encode_escapes_embedded_nul() {
        let encoded = encode(&json!({"label": "a\u{0}b"})).unwrap();

        // Only the terminator may be a raw NUL
        assert_eq!(
            encoded.iter().position(|&b| b == FRAME_TERMINATOR),
            Some(encoded.len() - 1)
        );
    }

    #[test]
    fn test_decode_partial_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.push(br#"{"reply":"dev"#);
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.push(b"ice_list\",\"data\":[]}\0");
        let payload = decoder.next_frame().unwrap().unwrap();
        assert_eq!(payload, br#"{"reply":"device_list","data":[]}"#);
        assert_eq!(decoder.available(), 0);
    }

    #[test]
    fn test_decode_multiple_frames() {
        let mut encoded = encode(&json!({"event": "a"})).unwrap();
        encoded.extend(encode(&json!({"event": "b"})).unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.push(&encoded);

        let first = decoder.next_frame().unwrap().unwrap();
        let second = decoder.next_frame().unwrap().unwrap();
        let no_more = decoder.next_frame().unwrap();

        assert_eq!(first, br#"{"event":"a"}"#);
        assert_eq!(second, br#"{"event":"b"}"#);
        assert!(no_more.is_none());
    }

    #[test]
    fn test_decode_empty_frame() {
        let mut decoder = FrameDecoder::new();
        decoder.push(b"\0");

        let payload = decoder.next_frame().unwrap().unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_decode_frame_too_large_without_terminator() {
        let mut decoder = FrameDecoder::with_max_frame_size(8);
        decoder.push(b"0123456789");

        let result = decoder.next_frame();
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { max: 8 })));
        assert_eq!(decoder.available(), 0);
    }

    #[test]
    fn test_decode_oversized_tail_is_not_a_frame() {
        let mut decoder = FrameDecoder::with_max_frame_size(8);
        decoder.push(b"0123456789");
        assert!(matches!(
            decoder.next_frame(),
            Err(ProtocolError::FrameTooLarge { max: 8 })
        ));

        // Rest of the oversized frame, split over two reads
        decoder.push(b"abc");
        assert!(decoder.next_frame().unwrap().is_none());
        decoder.push(b"def\0{\"a\":1");
        assert!(decoder.next_frame().unwrap().is_none());

        decoder.push(b"}\0");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), br#"{"a":1}"#);
        assert_eq!(decoder.available(), 0);
    }

    #[test]
    fn test_clear_stops_discarding() {
        let mut decoder = FrameDecoder::with_max_frame_size(4);
        decoder.push(b"0123456789");
        assert!(decoder.next_frame().is_err());

        decoder.clear();
        decoder.push(b"{}\0");
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"{}");
    }

    #[test]
    fn test_decode_frame_too_large_skips_to_next_frame() {
        let mut decoder = FrameDecoder::with_max_frame_size(8);
        decoder.push(b"0123456789\0{}\0");

        assert!(matches!(
            decoder.next_frame(),
            Err(ProtocolError::FrameTooLarge { .. })
        ));
        assert_eq!(decoder.next_frame().unwrap().unwrap(), b"{}");
    }

    #[test]
    fn test_decoder_compacts_after_many_frames() {
        let frame = encode(&json!({"event": "device_status", "data": {"device_id": 1, "status": true}}))
            .unwrap();
        let mut decoder = FrameDecoder::new();

        for _ in 0..500 {
            decoder.push(&frame[..frame.len() - 1]);
            assert!(decoder.next_frame().unwrap().is_none());
            decoder.push(&frame[frame.len() - 1..]);
            assert!(decoder.next_frame().unwrap().is_some());
        }
        assert_eq!(decoder.available(), 0);
    }
}
