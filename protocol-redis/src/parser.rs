//! Reply parsing: line classification and cross-line assembly.
//!
//! [`parse`] is a single-line classifier: it looks at the leading sigil of
//! one framed line and says what the line means. It is stateless except for
//! the error carry-state (a bare `-` header, whose message arrives on the
//! following line).
//!
//! [`ReplyAssembler`] layers the multi-bulk bookkeeping on top: it counts
//! down the remaining elements of the reply in progress, collects them, and
//! reports when the framer must switch to counted mode for a bulk body.

use bytes::Bytes;

use crate::error::ParseError;
use crate::reply::{Reply, MAX_BULK_LEN, MAX_MULTIBULK_LEN};

/// Parse state carried between lines of one reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseState {
    /// Between replies: the next line is a reply header.
    #[default]
    Empty,
    /// Accumulating a multi-bulk; element headers follow.
    Read,
    /// A bare error header was seen; the next line is the message text.
    Error,
}

/// What one framed line means.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A complete scalar value: status, integer, error, or (via the
    /// assembler) a bulk body.
    Value(Reply),
    /// `$N`: a counted body of N bytes follows. N may be zero (empty bulk).
    Read(usize),
    /// `$-1`: nil bulk.
    ReadNil,
    /// `*N`: an N-element multi-bulk follows. N may be zero.
    Hold(usize),
    /// `*-1`: nil multi-bulk.
    HoldNil,
    /// Bare `-` header: the error message is on the next line.
    ErrorNext,
}

/// Classify one line (CRLF already stripped) by its leading sigil.
pub fn parse(state: ParseState, line: &[u8]) -> Result<Event, ParseError> {
    if state == ParseState::Error {
        // Carried over from a bare `-` header on the previous line.
        return Ok(Event::Value(Reply::Error(Bytes::copy_from_slice(line))));
    }

    let Some((&sigil, rest)) = line.split_first() else {
        return Err(ParseError::Protocol("empty reply line".to_string()));
    };

    match sigil {
        b'+' => Ok(Event::Value(Reply::Status(Bytes::copy_from_slice(rest)))),
        b'-' if rest.is_empty() => Ok(Event::ErrorNext),
        b'-' => Ok(Event::Value(Reply::Error(Bytes::copy_from_slice(rest)))),
        b':' => Ok(Event::Value(Reply::Integer(parse_int(rest)?))),
        b'$' => match parse_int(rest)? {
            -1 => Ok(Event::ReadNil),
            n if n < 0 => Err(ParseError::InvalidLength),
            n if n as usize > MAX_BULK_LEN => Err(ParseError::InvalidLength),
            n => Ok(Event::Read(n as usize)),
        },
        b'*' => match parse_int(rest)? {
            -1 => Ok(Event::HoldNil),
            n if n < 0 => Err(ParseError::InvalidLength),
            n if n as usize > MAX_MULTIBULK_LEN => Err(ParseError::InvalidLength),
            n => Ok(Event::Hold(n as usize)),
        },
        other => Err(ParseError::InvalidPrefix(other)),
    }
}

fn parse_int(data: &[u8]) -> Result<i64, ParseError> {
    let s = std::str::from_utf8(data)
        .map_err(|e| ParseError::InvalidInteger(e.to_string()))?;
    s.parse()
        .map_err(|e: std::num::ParseIntError| ParseError::InvalidInteger(e.to_string()))
}

// ── Assembly ────────────────────────────────────────────────────────────

/// Result of feeding one frame to the assembler.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseProgress {
    /// A whole reply finished.
    Complete(Reply),
    /// Switch the framer to counted mode: a bulk body of this many bytes
    /// is next on the wire.
    NeedBody(usize),
    /// Mid multi-bulk; keep feeding frames.
    Incomplete,
}

/// Accumulates framed lines and bodies into complete replies.
///
/// Scalar replies are delivered bare. Multi-bulk replies are delivered as
/// [`Reply::MultiBulk`], always a list even of length one. After every
/// [`ParseProgress::Complete`] the assembler is back in the empty state.
#[derive(Debug, Default)]
pub struct ReplyAssembler {
    pstate: ParseState,
    /// Elements still to read for the multi-bulk in progress.
    remaining: usize,
    buffer: Vec<Reply>,
}

impl ReplyAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the assembler sits between replies.
    pub fn is_idle(&self) -> bool {
        self.pstate == ParseState::Empty && self.remaining == 0 && self.buffer.is_empty()
    }

    /// Drop any reply in progress and return to the empty state.
    pub fn reset(&mut self) {
        self.pstate = ParseState::Empty;
        self.remaining = 0;
        self.buffer.clear();
    }

    /// Feed one framed line.
    pub fn feed_line(&mut self, line: &[u8]) -> Result<ParseProgress, ParseError> {
        match parse(self.pstate, line)? {
            Event::Value(value) => Ok(self.push_element(value)),
            Event::Read(n) => Ok(ParseProgress::NeedBody(n)),
            Event::ReadNil => Ok(self.push_element(Reply::Nil)),
            Event::Hold(n) => {
                if self.pstate == ParseState::Read {
                    return Err(ParseError::Protocol(
                        "nested multi-bulk header".to_string(),
                    ));
                }
                if n == 0 {
                    return Ok(self.complete(Reply::MultiBulk(Vec::new())));
                }
                self.pstate = ParseState::Read;
                self.remaining = n;
                Ok(ParseProgress::Incomplete)
            }
            Event::HoldNil => {
                if self.pstate == ParseState::Read {
                    return Err(ParseError::Protocol(
                        "nested multi-bulk header".to_string(),
                    ));
                }
                Ok(self.complete(Reply::Nil))
            }
            Event::ErrorNext => {
                if self.pstate == ParseState::Read {
                    return Err(ParseError::Protocol(
                        "error header inside multi-bulk".to_string(),
                    ));
                }
                self.pstate = ParseState::Error;
                Ok(ParseProgress::Incomplete)
            }
        }
    }

    /// Feed one counted bulk body.
    pub fn feed_body(&mut self, body: Bytes) -> Result<ParseProgress, ParseError> {
        Ok(self.push_element(Reply::Bulk(body)))
    }

    /// Append a completed element: either a multi-bulk member or, outside
    /// accumulation, a whole scalar reply.
    fn push_element(&mut self, value: Reply) -> ParseProgress {
        if self.pstate == ParseState::Read {
            self.buffer.push(value);
            self.remaining -= 1;
            if self.remaining == 0 {
                let elements = std::mem::take(&mut self.buffer);
                return self.complete(Reply::MultiBulk(elements));
            }
            return ParseProgress::Incomplete;
        }
        self.complete(value)
    }

    fn complete(&mut self, reply: Reply) -> ParseProgress {
        self.pstate = ParseState::Empty;
        self.remaining = 0;
        ParseProgress::Complete(reply)
    }
}
