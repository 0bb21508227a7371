//! Inline command encoding.
//!
//! Commands are written as space-separated tokens terminated by CRLF,
//! optionally followed by a counted binary payload row for commands that
//! carry one (`SET` and friends):
//!
//! ```text
//! get mykey\r\n
//! set mykey 5\r\nhello\r\n
//! ```

use std::fmt;

/// Builder for inline commands.
///
/// # Example
///
/// ```
/// use protocol_redis::Command;
///
/// let bytes = Command::new("set").arg("mykey").payload("hello").into_bytes();
/// assert_eq!(bytes, b"set mykey 5\r\nhello\r\n");
/// ```
#[derive(Clone)]
pub struct Command {
    buf: Vec<u8>,
    row_start: bool,
}

impl Command {
    /// Start a command, e.g. `Command::new("ping")`.
    pub fn new(cmd: impl AsRef<[u8]>) -> Self {
        Command {
            buf: cmd.as_ref().to_vec(),
            row_start: false,
        }
    }

    /// Append an inline argument to the current row.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        if !self.row_start {
            self.buf.push(b' ');
        }
        self.row_start = false;
        self.buf.extend_from_slice(arg.as_ref());
        self
    }

    /// Start a new row.
    pub fn row(mut self) -> Self {
        self.buf.extend_from_slice(b"\r\n");
        self.row_start = true;
        self
    }

    /// Attach a counted binary payload as the final argument:
    /// ` <len>\r\n<value>`. No further arguments may follow.
    pub fn payload(mut self, value: impl AsRef<[u8]>) -> Self {
        let value = value.as_ref();
        let mut len = itoa::Buffer::new();
        self = self.arg(len.format(value.len()));
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(value);
        self
    }

    /// Append a server-side timeout in seconds as the last argument.
    /// Integral values print without a fractional part; `0` means the
    /// server waits forever.
    pub fn timeout_secs(self, secs: f64) -> Self {
        self.arg(format!("{}", secs))
    }

    /// Finish encoding: appends the terminating CRLF.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buf.extend_from_slice(b"\r\n");
        self.buf
    }

    // ── Contract constructors ───────────────────────────────────────────

    /// A command with a single space-joined argument row.
    pub fn inline(cmd: impl AsRef<[u8]>, args: &[&[u8]]) -> Self {
        args.iter().fold(Self::new(cmd), |c, a| c.arg(a))
    }

    /// A command followed by CRLF-separated rows, each space-joined. The
    /// first row shares the command's line; `rows(cmd, &[row])` encodes the
    /// same bytes as `inline(cmd, row)`.
    pub fn rows(cmd: impl AsRef<[u8]>, rows: &[&[&[u8]]]) -> Self {
        let mut command = Self::new(cmd);
        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                command = command.row();
            }
            for arg in *row {
                command = command.arg(arg);
            }
        }
        command
    }

    /// A command carrying a counted binary payload:
    /// `cmd key <len>\r\n<value>\r\n`.
    pub fn with_payload(
        cmd: impl AsRef<[u8]>,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Self {
        Self::new(cmd).arg(key).payload(value)
    }

    /// A blocking command: the server timeout (seconds, `0` = wait forever)
    /// goes on the wire as the last argument. The caller-side timeout must
    /// outlive it; see the client's blocking send.
    pub fn blocking(cmd: impl AsRef<[u8]>, args: &[&[u8]], timeout_secs: f64) -> Self {
        Self::inline(cmd, args).timeout_secs(timeout_secs)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("buf", &String::from_utf8_lossy(&self.buf))
            .finish()
    }
}
