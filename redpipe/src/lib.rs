//! Pipelined Redis client over a single TCP connection.
//!
//! One connection, one actor: a background task owns the socket and matches
//! every inbound reply to the head of a FIFO of pending calls, so replies
//! always come back in submission order. The same connection serves two
//! modes:
//!
//! - **Synchronous**: [`Client::send`] writes a command and suspends the
//!   caller until its reply is delivered or a caller-side timeout elapses.
//! - **Pipelined**: with [`Client::set_pipelining`] on, sends are
//!   fire-and-forget; replies accumulate and [`Client::collect`] returns
//!   them all in submission order.
//!
//! Commands are encoded in the inline dialect by [`Command`]; replies are
//! [`Reply`] values. The connection reopens itself on the next send after a
//! loss, replaying `SELECT` for a non-zero database first.
//!
//! # Example
//!
//! ```no_run
//! use redpipe::{Client, Command, Config, Reply};
//!
//! # async fn example() -> Result<(), redpipe::Error> {
//! let client = Client::connect(Config::default()).await?;
//!
//! let pong = client.send(Command::new("ping")).await?;
//! assert_eq!(pong, Reply::status(b"PONG"));
//!
//! client.send(Command::with_payload("set", "greeting", "hello")).await?;
//! let value = client.send(Command::inline("get", &[b"greeting"])).await?;
//! assert_eq!(value, Reply::bulk(b"hello"));
//! # Ok(())
//! # }
//! ```
//!
//! # Caveats
//!
//! The server silently ignores unknown commands: no reply ever arrives, and
//! the only detection mechanism is the caller-side timeout. A caller that
//! times out does **not** cancel its command; see
//! [`send_timeout`](Client::send_timeout).

mod config;
mod connection;
mod info;

pub use config::Config;
pub use info::ServerInfo;
pub use protocol_redis::{Command, Reply};

use std::io;
use std::time::Duration;

use protocol_redis::ParseError;
use tokio::sync::{mpsc, oneshot};

use connection::{Connection, Op};

/// Default caller-side reply timeout, also the safety margin added to
/// blocking commands so the caller always outlives the server.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors surfaced by the client.
///
/// Server-side error replies are not errors at this level: they arrive as
/// [`Reply::Error`] through the normal reply path.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The connection closed; every call pending at that moment gets this.
    #[error("connection closed")]
    Closed,

    /// TCP connect/read/write failure.
    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    /// Malformed reply from the server. Fatal to the connection.
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The caller-side timeout elapsed. The command may still be in flight;
    /// its eventual reply is discarded.
    #[error("timed out waiting for reply")]
    Timeout,

    /// The reply type did not match what the operation expected.
    #[error("unexpected reply")]
    UnexpectedReply,

    /// A collect is already waiting for pipelined results.
    #[error("collect already pending")]
    CollectPending,
}

/// Handle to a single-connection client.
///
/// Cheap to clone; all clones share the connection, and submissions from
/// concurrent callers are serialized by the actor's mailbox in arrival
/// order. Dropping the last clone shuts the connection down.
#[derive(Clone)]
pub struct Client {
    tx: mpsc::Sender<Op>,
}

impl Client {
    /// Open a connection and spawn its actor. If the configured database is
    /// not 0, `select` is issued before the client is returned.
    ///
    /// Must be called within a tokio runtime.
    pub async fn connect(config: Config) -> Result<Self, Error> {
        let (tx, rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();
        tokio::spawn(Connection::new(config, rx).run(ready_tx));
        ready_rx.await.map_err(|_| Error::Closed)??;
        Ok(Client { tx })
    }

    /// Send a command and wait for its reply under the default timeout.
    ///
    /// When pipelining is on this switches to fire-and-forget semantics:
    /// the command is enqueued, `Reply::ok()` is returned immediately, and
    /// the real reply is retrieved with [`collect`](Client::collect).
    pub async fn send(&self, command: Command) -> Result<Reply, Error> {
        self.send_timeout(command, Some(DEFAULT_TIMEOUT)).await
    }

    /// Send a command and wait for its reply; `None` waits forever.
    ///
    /// A timeout does not cancel the in-flight command: its slot stays in
    /// the pending FIFO and consumes the next reply, which is discarded
    /// because no one is waiting. Callers that need a resynchronized
    /// connection after a timeout should [`disconnect`](Client::disconnect)
    /// and reconnect.
    pub async fn send_timeout(
        &self,
        command: Command,
        timeout: Option<Duration>,
    ) -> Result<Reply, Error> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Op::Send {
                bytes: command.into_bytes(),
                reply: tx,
            })
            .await
            .map_err(|_| Error::Closed)?;
        match timeout {
            None => rx.await.map_err(|_| Error::Closed)?,
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(result) => result.map_err(|_| Error::Closed)?,
                Err(_) => Err(Error::Timeout),
            },
        }
    }

    /// Fire-and-forget enqueue; the reply accumulates for a later
    /// [`collect`](Client::collect). Only meaningful in pipelined mode.
    pub async fn send_async(&self, command: Command) -> Result<(), Error> {
        self.tx
            .send(Op::SendAsync {
                bytes: command.into_bytes(),
            })
            .await
            .map_err(|_| Error::Closed)
    }

    /// Send a blocking command (`BLPOP` and friends). The server timeout in
    /// seconds (`0` = block forever) goes on the wire as the last argument;
    /// the caller-side timeout adds [`DEFAULT_TIMEOUT`] on top so the
    /// caller always outlives the server.
    pub async fn send_blocking(
        &self,
        command: Command,
        timeout_secs: f64,
    ) -> Result<Reply, Error> {
        let command = command.timeout_secs(timeout_secs);
        let caller_timeout = if timeout_secs <= 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(timeout_secs) + DEFAULT_TIMEOUT)
        };
        self.send_timeout(command, caller_timeout).await
    }

    /// Toggle pipelined mode. Switching off while results are queued is
    /// legal; they remain collectible.
    pub async fn set_pipelining(&self, on: bool) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Op::SetPipelining { on, ack: tx })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }

    /// Return all accumulated pipelined replies in submission order,
    /// draining the buffer. If some replies have not arrived yet, waits
    /// until the pending FIFO drains and then delivers everything at once.
    pub async fn collect(&self) -> Result<Vec<Reply>, Error> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Op::Collect { reply: tx })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)?
    }

    /// Switch the logical database. The index is recorded on success and
    /// replayed automatically after a reconnect.
    pub async fn select(&self, db: u32) -> Result<(), Error> {
        let reply = self
            .send(Command::new("select").arg(db.to_string()))
            .await?;
        if reply.is_ok() {
            Ok(())
        } else {
            Err(Error::UnexpectedReply)
        }
    }

    /// Fetch and parse the server's `info` report.
    pub async fn info(&self) -> Result<ServerInfo, Error> {
        match self.send(Command::new("info")).await? {
            Reply::Bulk(body) => Ok(info::parse_info(&body)),
            _ => Err(Error::UnexpectedReply),
        }
    }

    /// Close the connection. Every call still pending receives
    /// [`Error::Closed`]; subsequent operations on any clone fail the same
    /// way.
    pub async fn disconnect(&self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        self.tx
            .send(Op::Disconnect { ack: tx })
            .await
            .map_err(|_| Error::Closed)?;
        rx.await.map_err(|_| Error::Closed)
    }
}
