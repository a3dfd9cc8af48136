//! Error types shared by the webmforge crates.

use std::io;
use thiserror::Error;

/// Result type for webmforge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad caller input. Nothing was written and no state changed.
    Validation,
    /// Malformed or truncated bytes encountered while parsing.
    Format,
    /// Failure reported by the underlying reader or writer.
    Io,
    /// Operation invoked in the wrong lifecycle state.
    State,
}

/// Error type for webmforge operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The sink cannot seek, so a size field could not be rewritten.
    #[error("Writer does not support seeking")]
    SeekUnsupported,

    /// A variable-length integer was malformed.
    #[error("Invalid variable-length integer at offset {offset}")]
    InvalidVint { offset: u64 },

    /// An element ID was malformed.
    #[error("Invalid element ID at offset {offset}")]
    InvalidElementId { offset: u64 },

    /// An element declares more bytes than its container or the stream holds.
    #[error("Element 0x{id:X} at offset {offset} truncated: needs {need} bytes, {have} available")]
    Truncated {
        id: u32,
        offset: u64,
        need: u64,
        have: u64,
    },

    /// The requested byte range is not available from the reader.
    #[error("Unexpected end of stream at offset {offset}")]
    EndOfStream { offset: u64 },

    /// Structurally invalid data.
    #[error("Invalid format: {0}")]
    Format(String),

    /// Frame or cue refers to a track that does not exist.
    #[error("Unknown track number {0}")]
    UnknownTrack(u64),

    /// Track is missing its type or codec ID.
    #[error("Track {0} has no type or codec ID")]
    IncompleteTrack(u64),

    /// Frame timestamp is not greater than the previous one on its track.
    #[error("Track {track}: timestamp {timestamp} is not after {last}")]
    NonMonotonicTimestamp { track: u64, timestamp: u64, last: u64 },

    /// Frame (or its additional data) carries no bytes.
    #[error("Empty frame payload")]
    EmptyPayload,

    /// Other invalid caller input.
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// Operation not allowed in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(&'static str),
}

impl Error {
    /// Create a format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::SeekUnsupported => ErrorKind::Io,
            Self::InvalidVint { .. }
            | Self::InvalidElementId { .. }
            | Self::Truncated { .. }
            | Self::EndOfStream { .. }
            | Self::Format(_) => ErrorKind::Format,
            Self::UnknownTrack(_)
            | Self::IncompleteTrack(_)
            | Self::NonMonotonicTimestamp { .. }
            | Self::EmptyPayload
            | Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidState(_) => ErrorKind::State,
        }
    }
}
