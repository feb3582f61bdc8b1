//! Error types for the IAX engine.

use std::io;

use thiserror::Error;

/// Errors that can occur while encoding or decoding frame headers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Datagram is shorter than the header it claims to carry.
    #[error("frame too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum expected size.
        expected: usize,
        /// Actual size received.
        actual: usize,
    },

    /// Frame type byte does not name a known frame type.
    #[error("unknown frame type: {0}")]
    UnknownFrameType(u8),

    /// Subclass is neither below 0x80 nor a power of two.
    #[error("subclass {0:#x} cannot be compressed")]
    UncompressibleSubclass(u32),
}

impl FrameError {
    /// Whether this error should cause the datagram to be dropped without
    /// any reply to the sender.
    pub fn is_silent_drop(&self) -> bool {
        matches!(self, Self::TooShort { .. } | Self::UnknownFrameType(_))
    }
}

/// Result type for frame operations.
pub type FrameResult<T> = Result<T, FrameError>;

/// Errors from the information element codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IeError {
    /// Element header or value runs past the end of the buffer.
    #[error("information element {tag} truncated: need {needed} bytes, have {available}")]
    Truncated {
        /// Tag of the element being read.
        tag: u8,
        /// Bytes required.
        needed: usize,
        /// Bytes remaining.
        available: usize,
    },

    /// Value does not fit the one-byte length field.
    #[error("information element {tag} value too long: {len} bytes")]
    ValueTooLong {
        /// Tag of the element being written.
        tag: u8,
        /// Attempted length.
        len: usize,
    },

    /// Fixed-width element carries the wrong number of bytes.
    #[error("information element {tag} has bad length {len}")]
    BadLength {
        /// Tag of the element.
        tag: u8,
        /// Length on the wire.
        len: usize,
    },

    /// Only IPv4 addresses can be carried in APPARENT_ADDR.
    #[error("unsupported address family for apparent address")]
    UnsupportedAddress,
}

/// Top-level engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No live session has this call number.
    #[error("unknown session: call number {0}")]
    UnknownSession(u16),

    /// Session has sent its closing frame and accepts no more traffic.
    #[error("session {0} is closing")]
    SessionClosing(u16),

    /// Session has no peer address to send to.
    #[error("session {0} has no peer address")]
    NoPeerAddress(u16),

    /// Computed timestamp was zero, which the wire reserves.
    #[error("refusing to send frame with zero timestamp")]
    ZeroTimestamp,

    /// Dial string could not be parsed.
    #[error("invalid dial string: {0}")]
    InvalidDialString(String),

    /// Host name did not resolve to an IPv4 address.
    #[error("unable to resolve host: {0}")]
    Resolve(String),

    /// Session is already quelched.
    #[error("session {0} is already quelched")]
    AlreadyQuelched(u16),

    /// Every call number is in use.
    #[error("no free call numbers")]
    CallNumbersExhausted,

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Frame codec error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Information element codec error.
    #[error("information element error: {0}")]
    Ie(#[from] IeError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl EngineError {
    /// Whether the error is a transient I/O condition that the next poll
    /// will retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
