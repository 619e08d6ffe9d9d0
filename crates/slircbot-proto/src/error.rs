//! Error types for line encoding and framing.
//!
//! Parsing has no error type: malformed input yields an invalid
//! [`MessageEvent`](crate::MessageEvent) instead.

use thiserror::Error;

/// Reasons an outbound command cannot be turned into a wire line.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// The command word was empty.
    #[error("empty command")]
    EmptyCommand,

    /// The command word contained a space, `:` prefix or line break.
    #[error("invalid command word: {0:?}")]
    InvalidCommand(String),

    /// A parameter contained CR, LF or NUL.
    #[error("parameter {index} contains a forbidden character")]
    ForbiddenCharacter {
        /// Zero-based parameter index.
        index: usize,
    },

    /// A middle parameter was empty, contained a space or started with `:`.
    #[error("parameter {index} cannot be sent as a middle parameter")]
    InvalidMiddle {
        /// Zero-based parameter index.
        index: usize,
    },
}

/// Framing errors from [`LineCodec`](crate::LineCodec).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LineError {
    /// I/O error on the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A line exceeded the configured maximum length.
    #[error("line too long: {actual} bytes (limit {limit})")]
    LineTooLong {
        /// Observed length.
        actual: usize,
        /// Configured limit.
        limit: usize,
    },

    /// An outbound line failed to encode.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),
}
