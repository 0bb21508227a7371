//! The connection actor.
//!
//! A single task owns the socket and everything attached to it: the framer,
//! the reply assembler, the pending-call FIFO, the pipelined-results buffer,
//! and the recorded DB index. Callers talk to it through the mailbox; it
//! talks back through the oneshot handles queued in the FIFO. Replies
//! complete pending calls head-first, which is what keeps delivery in
//! submission order.

use std::collections::VecDeque;
use std::io;
use std::mem;

use bytes::Bytes;
use protocol_redis::{Command, Frame, FrameBuf, ParseError, ParseProgress, Reply, ReplyAssembler};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::config::Config;
use crate::Error;

/// Mailbox messages from [`Client`](crate::Client) handles.
pub(crate) enum Op {
    Send {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<Reply, Error>>,
    },
    SendAsync {
        bytes: Vec<u8>,
    },
    SetPipelining {
        on: bool,
        ack: oneshot::Sender<()>,
    },
    Collect {
        reply: oneshot::Sender<Result<Vec<Reply>, Error>>,
    },
    Disconnect {
        ack: oneshot::Sender<()>,
    },
}

/// One slot in the pending-call FIFO.
struct PendingCall {
    /// The waiting caller, or `None` for a pipelined fire-and-forget slot
    /// whose reply accumulates into the results buffer.
    reply: Option<oneshot::Sender<Result<Reply, Error>>>,
    /// DB index to commit when this slot completes with `+OK` (the command
    /// was a SELECT).
    select: Option<Bytes>,
}

enum Step {
    Op(Option<Op>),
    Read(io::Result<usize>),
}

pub(crate) struct Connection {
    rx: mpsc::Receiver<Op>,
    config: Config,
    /// Absent between a connection loss and the next send.
    sock: Option<TcpStream>,
    frames: FrameBuf,
    assembler: ReplyAssembler,
    pending: VecDeque<PendingCall>,
    pipelining: bool,
    /// Replies to fire-and-forget slots, in submission order.
    results: Vec<Reply>,
    /// A collect that arrived before the FIFO drained; fired exactly once.
    deferred: Option<oneshot::Sender<Result<Vec<Reply>, Error>>>,
    /// Current DB index, kept as the textual bytes sent on the wire so a
    /// reconnect can replay it verbatim.
    db: Bytes,
}

impl Connection {
    pub(crate) fn new(config: Config, rx: mpsc::Receiver<Op>) -> Self {
        let db = Bytes::from(config.db.to_string());
        Connection {
            rx,
            config,
            sock: None,
            frames: FrameBuf::new(),
            assembler: ReplyAssembler::new(),
            pending: VecDeque::new(),
            pipelining: false,
            results: Vec::new(),
            deferred: None,
            db,
        }
    }

    /// Actor main loop. The initial connect result is reported through
    /// `ready`; after that the loop runs until every client handle is
    /// dropped or a disconnect is requested.
    pub(crate) async fn run(mut self, ready: oneshot::Sender<Result<(), Error>>) {
        let _ = ready.send(self.ensure_connected().await);

        loop {
            let step = {
                let Connection {
                    rx, sock, frames, ..
                } = &mut self;
                match sock {
                    Some(stream) => tokio::select! {
                        op = rx.recv() => Step::Op(op),
                        read = stream.read_buf(frames.read_buf()) => Step::Read(read),
                    },
                    None => Step::Op(rx.recv().await),
                }
            };

            match step {
                // All client handles dropped: shut down quietly.
                Step::Op(None) => {
                    self.drop_connection();
                    return;
                }
                Step::Op(Some(op)) => {
                    if !self.handle_op(op).await {
                        return;
                    }
                }
                Step::Read(Ok(0)) => {
                    debug!("server closed the connection");
                    self.drop_connection();
                }
                Step::Read(Ok(_)) => {
                    if let Err(e) = self.process_frames() {
                        error!(error = %e, "protocol error, dropping connection");
                        self.drop_connection();
                    }
                }
                Step::Read(Err(e)) => {
                    error!(error = %e, "read failed, dropping connection");
                    self.drop_connection();
                }
            }
        }
    }

    /// Returns false when the actor should exit.
    async fn handle_op(&mut self, op: Op) -> bool {
        match op {
            Op::Send { bytes, reply } => match self.write_command(&bytes).await {
                Ok(()) => {
                    let select = select_target(&bytes);
                    if self.pipelining {
                        // Fire-and-forget semantics: ack immediately, let
                        // the reply accumulate for a later collect.
                        self.pending.push_back(PendingCall { reply: None, select });
                        let _ = reply.send(Ok(Reply::ok()));
                    } else {
                        self.pending.push_back(PendingCall {
                            reply: Some(reply),
                            select,
                        });
                    }
                }
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },
            Op::SendAsync { bytes } => {
                if !self.pipelining {
                    debug!("async send with pipelining off; reply goes to the results buffer");
                }
                match self.write_command(&bytes).await {
                    Ok(()) => self.pending.push_back(PendingCall {
                        reply: None,
                        select: select_target(&bytes),
                    }),
                    Err(e) => warn!(error = %e, "async send failed"),
                }
            }
            Op::SetPipelining { on, ack } => {
                self.pipelining = on;
                let _ = ack.send(());
            }
            Op::Collect { reply } => {
                if self.pending.is_empty() {
                    let _ = reply.send(Ok(mem::take(&mut self.results)));
                } else if self.deferred.is_some() {
                    let _ = reply.send(Err(Error::CollectPending));
                } else {
                    self.deferred = Some(reply);
                }
            }
            Op::Disconnect { ack } => {
                self.drop_connection();
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    /// Ensure the socket is up, then write one encoded command under the
    /// send timeout. A failed write tears the connection down and returns
    /// the raw error to the submitting caller.
    async fn write_command(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.ensure_connected().await?;
        let Some(stream) = self.sock.as_mut() else {
            return Err(Error::Closed);
        };
        let failure = match tokio::time::timeout(self.config.timeout, stream.write_all(bytes)).await
        {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => Error::Socket(e),
            Err(_) => Error::Socket(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        };
        error!(error = %failure, "write failed, dropping connection");
        self.drop_connection();
        Err(failure)
    }

    /// Open the socket if it is absent, with `TCP_NODELAY` and the connect
    /// timeout, replaying SELECT when the recorded DB is not "0".
    async fn ensure_connected(&mut self) -> Result<(), Error> {
        if self.sock.is_some() {
            return Ok(());
        }
        debug!(host = %self.config.host, port = self.config.port, "connecting");
        let connect = TcpStream::connect((self.config.host.as_str(), self.config.port));
        let mut stream = match tokio::time::timeout(self.config.timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => return Err(Error::Socket(e)),
            Err(_) => {
                return Err(Error::Socket(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect timed out",
                )))
            }
        };
        stream.set_nodelay(true).map_err(Error::Socket)?;
        if self.db.as_ref() != b"0" {
            self.replay_select(&mut stream).await?;
        }
        self.sock = Some(stream);
        Ok(())
    }

    /// Re-issue `select <db>` on a fresh socket and verify the `+OK`
    /// before resuming event-driven reads.
    async fn replay_select(&mut self, stream: &mut TcpStream) -> Result<(), Error> {
        debug!(db = %String::from_utf8_lossy(&self.db), "replaying SELECT");
        let cmd = Command::new("select").arg(&self.db[..]).into_bytes();
        stream.write_all(&cmd).await.map_err(Error::Socket)?;

        let frames = &mut self.frames;
        let exchange = async {
            loop {
                if let Some(frame) = frames.next_frame().map_err(Error::Protocol)? {
                    let Frame::Line(line) = frame else {
                        return Err(Error::Protocol(ParseError::Protocol(
                            "unexpected bulk body".to_string(),
                        )));
                    };
                    return Ok(line);
                }
                let n = stream
                    .read_buf(frames.read_buf())
                    .await
                    .map_err(Error::Socket)?;
                if n == 0 {
                    return Err(Error::Closed);
                }
            }
        };
        let line = tokio::time::timeout(self.config.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout)??;

        if line.as_ref() == b"+OK" {
            Ok(())
        } else {
            Err(Error::Protocol(ParseError::Protocol(format!(
                "SELECT rejected: {}",
                String::from_utf8_lossy(&line)
            ))))
        }
    }

    /// Drain complete frames out of the read buffer, switching the framer
    /// to counted mode when a bulk header announces a body.
    fn process_frames(&mut self) -> Result<(), Error> {
        while let Some(frame) = self.frames.next_frame()? {
            let progress = match frame {
                Frame::Line(line) => self.assembler.feed_line(&line)?,
                Frame::Body(body) => self.assembler.feed_body(body)?,
            };
            match progress {
                ParseProgress::Complete(reply) => self.deliver(reply),
                ParseProgress::NeedBody(n) => self.frames.expect_body(n),
                ParseProgress::Incomplete => {}
            }
        }
        Ok(())
    }

    /// Match a completed reply to the head of the FIFO.
    fn deliver(&mut self, reply: Reply) {
        let Some(call) = self.pending.pop_front() else {
            warn!(?reply, "reply with no pending call, dropping");
            return;
        };
        if let Some(db) = call.select {
            if reply.is_ok() {
                self.db = db;
            }
        }
        match call.reply {
            // A dropped receiver is a timed-out caller: its slot still
            // consumed this reply, which is discarded here.
            Some(tx) => {
                let _ = tx.send(Ok(reply));
            }
            None => self.results.push(reply),
        }
        if self.pending.is_empty() {
            if let Some(tx) = self.deferred.take() {
                let _ = tx.send(Ok(mem::take(&mut self.results)));
            }
        }
    }

    /// Tear the connection down: every pending caller (and a deferred
    /// collect) gets `Closed`, buffered results and parse state are
    /// discarded, and the socket is marked absent so the next send
    /// reconnects.
    fn drop_connection(&mut self) {
        self.sock = None;
        for call in self.pending.drain(..) {
            if let Some(tx) = call.reply {
                let _ = tx.send(Err(Error::Closed));
            }
        }
        if let Some(tx) = self.deferred.take() {
            let _ = tx.send(Err(Error::Closed));
        }
        self.results.clear();
        self.assembler.reset();
        self.frames.clear();
    }
}

/// If the encoded command is `select <db>`, the textual index to record
/// once the server acknowledges it.
fn select_target(bytes: &[u8]) -> Option<Bytes> {
    let line = bytes.split(|&b| b == b'\r').next()?;
    let mut tokens = line.split(|&b| b == b' ').filter(|t| !t.is_empty());
    if !tokens.next()?.eq_ignore_ascii_case(b"select") {
        return None;
    }
    Some(Bytes::copy_from_slice(tokens.next()?))
}
