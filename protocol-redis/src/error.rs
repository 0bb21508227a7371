//! Error types for wire parsing.

/// Error type for framing and reply parsing.
///
/// All variants are fatal to the connection that produced them: the stream
/// can no longer be trusted to be aligned on a reply boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Invalid reply sigil byte.
    #[error("invalid prefix byte: {0:#04x}")]
    InvalidPrefix(u8),

    /// Invalid integer in an integer reply or a length header.
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid bulk or multi-bulk length.
    #[error("invalid length header")]
    InvalidLength,

    /// Protocol violation.
    #[error("protocol error: {0}")]
    Protocol(String),
}
