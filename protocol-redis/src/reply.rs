//! Reply values.
//!
//! The inline dialect uses the RESP reply framing:
//! - Status: `+OK\r\n`
//! - Error: `-ERR message\r\n`
//! - Integer: `:1000\r\n`
//! - Bulk: `$6\r\nfoobar\r\n`
//! - Nil: `$-1\r\n` (also `*-1\r\n`)
//! - Multi-bulk: `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`
//!
//! Multi-bulk replies do not nest in this dialect; their elements are bulk
//! values, nils, or scalars.

use std::io::Write;

use bytes::Bytes;

/// Maximum accepted bulk body length (512 MiB, the server's own cap).
///
/// A length header above this is treated as a protocol error rather than an
/// allocation request.
pub const MAX_BULK_LEN: usize = 512 * 1024 * 1024;

/// Maximum accepted multi-bulk element count.
pub const MAX_MULTIBULK_LEN: usize = 1024 * 1024;

/// A decoded server reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Status line: `+OK\r\n`
    Status(Bytes),
    /// Server-side error reply: `-ERR message\r\n`. This is data, not a
    /// transport failure; it flows through the normal reply path.
    Error(Bytes),
    /// Integer: `:1000\r\n`
    Integer(i64),
    /// Bulk value: `$6\r\nfoobar\r\n`
    Bulk(Bytes),
    /// Missing value: `$-1\r\n` or `*-1\r\n`
    Nil,
    /// Multi-bulk: `*N\r\n` followed by N elements. Always a list, even of
    /// length one.
    MultiBulk(Vec<Reply>),
}

impl Reply {
    // ── Constructors ────────────────────────────────────────────────────

    /// Create a status reply.
    #[inline]
    pub fn status(s: &[u8]) -> Self {
        Reply::Status(Bytes::copy_from_slice(s))
    }

    /// The `+OK` status.
    #[inline]
    pub fn ok() -> Self {
        Reply::Status(Bytes::from_static(b"OK"))
    }

    /// Create an error reply.
    #[inline]
    pub fn error(msg: &[u8]) -> Self {
        Reply::Error(Bytes::copy_from_slice(msg))
    }

    /// Create an integer reply.
    #[inline]
    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Create a bulk reply.
    #[inline]
    pub fn bulk(data: &[u8]) -> Self {
        Reply::Bulk(Bytes::copy_from_slice(data))
    }

    /// Create a multi-bulk reply.
    #[inline]
    pub fn multi(elements: Vec<Reply>) -> Self {
        Reply::MultiBulk(elements)
    }

    // ── Predicates ──────────────────────────────────────────────────────

    /// Returns true for the `+OK` status.
    #[inline]
    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Status(s) if s.as_ref() == b"OK")
    }

    /// Returns true if this is a nil reply.
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Nil)
    }

    /// Returns true if this is a server error reply.
    #[inline]
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    // ── Accessors ───────────────────────────────────────────────────────

    /// Returns the payload bytes of a status, error, or bulk reply.
    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Status(s) | Reply::Error(s) | Reply::Bulk(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the value of an integer reply.
    #[inline]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the elements of a multi-bulk reply.
    #[inline]
    pub fn as_multi(&self) -> Option<&[Reply]> {
        match self {
            Reply::MultiBulk(elements) => Some(elements),
            _ => None,
        }
    }

    /// Unwrap a single-row reply: a one-element multi-bulk collapses to its
    /// element. Everything else is returned unchanged.
    ///
    /// Commands that logically return one row (`KEYS` on a unique pattern,
    /// `HGET`, ...) arrive as a one-element multi-bulk on the wire; callers
    /// that expect the bare value use this.
    pub fn into_single(self) -> Reply {
        match self {
            Reply::MultiBulk(mut elements) if elements.len() == 1 => {
                elements.pop().expect("length checked")
            }
            other => other,
        }
    }

    // ── Encoding ────────────────────────────────────────────────────────

    /// Encode this reply into a buffer, returning the number of bytes
    /// written. This is the server side of the wire grammar; the client
    /// uses it for round-trip tests and mock servers.
    ///
    /// # Panics
    ///
    /// Panics if the buffer is too small. Use [`encoded_len`](Reply::encoded_len)
    /// to size it.
    pub fn encode(&self, buf: &mut [u8]) -> usize {
        match self {
            Reply::Status(s) => encode_line(buf, b'+', s),
            Reply::Error(msg) => encode_line(buf, b'-', msg),
            Reply::Integer(n) => {
                buf[0] = b':';
                let mut cursor = std::io::Cursor::new(&mut buf[1..]);
                write!(cursor, "{}\r\n", n).unwrap();
                1 + cursor.position() as usize
            }
            Reply::Bulk(data) => {
                buf[0] = b'$';
                let mut cursor = std::io::Cursor::new(&mut buf[1..]);
                write!(cursor, "{}\r\n", data.len()).unwrap();
                let header_len = 1 + cursor.position() as usize;
                buf[header_len..header_len + data.len()].copy_from_slice(data);
                buf[header_len + data.len()] = b'\r';
                buf[header_len + data.len() + 1] = b'\n';
                header_len + data.len() + 2
            }
            Reply::Nil => {
                buf[..5].copy_from_slice(b"$-1\r\n");
                5
            }
            Reply::MultiBulk(elements) => {
                buf[0] = b'*';
                let mut cursor = std::io::Cursor::new(&mut buf[1..]);
                write!(cursor, "{}\r\n", elements.len()).unwrap();
                let mut pos = 1 + cursor.position() as usize;
                for element in elements {
                    pos += element.encode(&mut buf[pos..]);
                }
                pos
            }
        }
    }

    /// Calculate the encoded length of this reply.
    pub fn encoded_len(&self) -> usize {
        match self {
            Reply::Status(s) => 1 + s.len() + 2,
            Reply::Error(msg) => 1 + msg.len() + 2,
            Reply::Integer(n) => {
                let mut buf = itoa::Buffer::new();
                1 + buf.format(*n).len() + 2
            }
            Reply::Bulk(data) => {
                let mut buf = itoa::Buffer::new();
                1 + buf.format(data.len()).len() + 2 + data.len() + 2
            }
            Reply::Nil => 5,
            Reply::MultiBulk(elements) => {
                let mut buf = itoa::Buffer::new();
                let header_len = 1 + buf.format(elements.len()).len() + 2;
                header_len + elements.iter().map(|e| e.encoded_len()).sum::<usize>()
            }
        }
    }

    /// Encode into a fresh `Vec` of exactly the right size.
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.encoded_len()];
        let written = self.encode(&mut buf);
        debug_assert_eq!(written, buf.len());
        buf
    }
}

/// Encode a line reply: `<sigil><data>\r\n`
fn encode_line(buf: &mut [u8], sigil: u8, data: &[u8]) -> usize {
    buf[0] = sigil;
    buf[1..1 + data.len()].copy_from_slice(data);
    buf[1 + data.len()] = b'\r';
    buf[2 + data.len()] = b'\n';
    3 + data.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_status() {
        assert_eq!(Reply::status(b"PONG").to_wire(), b"+PONG\r\n");
        assert_eq!(Reply::ok().to_wire(), b"+OK\r\n");
    }

    #[test]
    fn test_encode_error() {
        assert_eq!(Reply::error(b"ERR bad").to_wire(), b"-ERR bad\r\n");
    }

    #[test]
    fn test_encode_integer() {
        assert_eq!(Reply::integer(1000).to_wire(), b":1000\r\n");
        assert_eq!(Reply::integer(-1).to_wire(), b":-1\r\n");
    }

    #[test]
    fn test_encode_bulk() {
        assert_eq!(Reply::bulk(b"foobar").to_wire(), b"$6\r\nfoobar\r\n");
        assert_eq!(Reply::bulk(b"").to_wire(), b"$0\r\n\r\n");
    }

    #[test]
    fn test_encode_nil() {
        assert_eq!(Reply::Nil.to_wire(), b"$-1\r\n");
    }

    #[test]
    fn test_encode_multi_bulk() {
        let reply = Reply::multi(vec![Reply::bulk(b"A"), Reply::Nil, Reply::bulk(b"C")]);
        assert_eq!(reply.to_wire(), b"*3\r\n$1\r\nA\r\n$-1\r\n$1\r\nC\r\n");
        assert_eq!(Reply::multi(vec![]).to_wire(), b"*0\r\n");
    }

    #[test]
    fn test_is_ok() {
        assert!(Reply::ok().is_ok());
        assert!(!Reply::status(b"PONG").is_ok());
        assert!(!Reply::bulk(b"OK").is_ok());
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Reply::bulk(b"v").as_bytes(), Some(&b"v"[..]));
        assert_eq!(Reply::integer(7).as_integer(), Some(7));
        assert_eq!(Reply::Nil.as_bytes(), None);
        let multi = Reply::multi(vec![Reply::integer(1)]);
        assert_eq!(multi.as_multi().map(|m| m.len()), Some(1));
    }

    #[test]
    fn test_into_single() {
        let one = Reply::multi(vec![Reply::bulk(b"row")]);
        assert_eq!(one.into_single(), Reply::bulk(b"row"));

        let two = Reply::multi(vec![Reply::bulk(b"a"), Reply::bulk(b"b")]);
        assert_eq!(two.clone().into_single(), two);

        assert_eq!(Reply::integer(3).into_single(), Reply::integer(3));
        assert_eq!(Reply::multi(vec![]).into_single(), Reply::multi(vec![]));
    }
}
