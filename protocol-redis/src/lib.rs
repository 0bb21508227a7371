//! Wire layer for the Redis line/bulk protocol (RESP, inline dialect).
//!
//! This crate performs no I/O. It splits into four pieces that a client
//! composes around a socket:
//!
//! - **Replies**: [`Reply`] models the server's reply values (status, error,
//!   integer, bulk, nil, multi-bulk) and can encode them back into wire form
//!   for test harnesses and mock servers.
//! - **Framing**: [`FrameBuf`] turns an inbound byte stream into CRLF lines
//!   or counted bulk bodies, switching modes on demand.
//! - **Parsing**: [`parse`] classifies a single line by its leading sigil;
//!   [`ReplyAssembler`] drives it across lines and bodies until a complete
//!   [`Reply`] is available.
//! - **Commands**: [`Command`] encodes outgoing commands in the inline
//!   dialect, including counted binary payloads and blocking timeouts.
//!
//! # Example
//!
//! ```
//! use protocol_redis::{Command, Frame, FrameBuf, ParseProgress, Reply, ReplyAssembler};
//!
//! // Encode a command.
//! let cmd = Command::inline("get", &[b"mykey"]).into_bytes();
//! assert_eq!(cmd, b"get mykey\r\n");
//!
//! // Decode a reply, however the bytes were chunked.
//! let mut frames = FrameBuf::new();
//! let mut assembler = ReplyAssembler::new();
//! frames.extend(b"$5\r\nhello\r\n");
//! let mut reply = None;
//! while let Some(frame) = frames.next_frame().unwrap() {
//!     let progress = match frame {
//!         Frame::Line(line) => assembler.feed_line(&line).unwrap(),
//!         Frame::Body(body) => assembler.feed_body(body).unwrap(),
//!     };
//!     match progress {
//!         ParseProgress::Complete(r) => reply = Some(r),
//!         ParseProgress::NeedBody(n) => frames.expect_body(n),
//!         ParseProgress::Incomplete => {}
//!     }
//! }
//! assert_eq!(reply, Some(Reply::bulk(b"hello")));
//! ```

mod command;
mod error;
mod framer;
mod parser;
mod reply;

pub use command::Command;
pub use error::ParseError;
pub use framer::{Frame, FrameBuf};
pub use parser::{parse, Event, ParseProgress, ParseState, ReplyAssembler};
pub use reply::{Reply, MAX_BULK_LEN, MAX_MULTIBULK_LEN};
