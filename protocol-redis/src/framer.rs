//! Stream framing: CRLF lines and counted bulk bodies.
//!
//! The wire mixes two framings. Reply headers, scalars, and multi-bulk
//! headers are CRLF-terminated lines; bulk bodies are `N + 2` raw bytes
//! announced by a `$N` header. [`FrameBuf`] owns a user-space read buffer
//! and switches between the two on demand, so the connection never relies
//! on OS-level line framing and parsing is independent of how the socket
//! splits its reads.

use bytes::{Bytes, BytesMut};

use crate::error::ParseError;

/// A complete frame extracted from the stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// One line, CRLF stripped.
    Line(Bytes),
    /// One counted bulk body, trailing CRLF verified and stripped.
    Body(Bytes),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Line,
    /// Expecting a counted body of this many bytes (plus trailing CRLF).
    Counted(usize),
}

/// Buffering framer over an inbound byte stream.
///
/// Feed bytes with [`extend`](FrameBuf::extend) (or read directly into
/// [`read_buf`](FrameBuf::read_buf)), then drain complete frames with
/// [`next_frame`](FrameBuf::next_frame). After a `$N` header the caller
/// switches to counted mode with [`expect_body`](FrameBuf::expect_body); the
/// framer reverts to line mode once the body is delivered.
#[derive(Debug)]
pub struct FrameBuf {
    buf: BytesMut,
    mode: Mode,
}

impl FrameBuf {
    pub fn new() -> Self {
        Self::with_capacity(4096)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        FrameBuf {
            buf: BytesMut::with_capacity(capacity),
            mode: Mode::Line,
        }
    }

    /// Append inbound bytes.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// The underlying buffer, for reading from a socket directly
    /// (e.g. `stream.read_buf(frames.read_buf())`).
    pub fn read_buf(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Switch to counted mode: the next frame is a bulk body of `len` bytes.
    pub fn expect_body(&mut self, len: usize) {
        debug_assert_eq!(self.mode, Mode::Line);
        self.mode = Mode::Counted(len);
    }

    /// Discard buffered bytes and return to line mode.
    ///
    /// Used when tearing down a connection; a fresh connection starts on a
    /// reply boundary.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.mode = Mode::Line;
    }

    /// Extract the next complete frame, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ParseError> {
        match self.mode {
            Mode::Line => Ok(self.next_line().map(Frame::Line)),
            Mode::Counted(len) => self.next_body(len),
        }
    }

    fn next_line(&mut self) -> Option<Bytes> {
        let end = find_crlf(&self.buf)?;
        let line = self.buf.split_to(end + 2).freeze();
        Some(line.slice(..end))
    }

    fn next_body(&mut self, len: usize) -> Result<Option<Frame>, ParseError> {
        if self.buf.len() < len + 2 {
            return Ok(None);
        }
        if &self.buf[len..len + 2] != b"\r\n" {
            return Err(ParseError::Protocol(
                "missing CRLF after bulk body".to_string(),
            ));
        }
        let body = self.buf.split_to(len + 2).freeze();
        self.mode = Mode::Line;
        Ok(Some(Frame::Body(body.slice(..len))))
    }
}

impl Default for FrameBuf {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the position of the first `\r\n` in the data.
#[inline]
fn find_crlf(data: &[u8]) -> Option<usize> {
    for pos in memchr::memchr_iter(b'\r', data) {
        if data.get(pos + 1) == Some(&b'\n') {
            return Some(pos);
        }
    }
    None
}
