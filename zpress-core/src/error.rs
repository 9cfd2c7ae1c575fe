//! Error types for zpress operations.
//!
//! Errors fall into three classes:
//!
//! - **Configuration**: a parameter outside its legal range, rejected before
//!   any state is allocated.
//! - **Usage**: a call the stream cannot honour in its current state. The
//!   stream is left untouched and the call can be retried once the caller
//!   fixes the precondition (usually by calling `reset`).
//! - **Internal**: the engine caught itself about to emit a corrupt stream.
//!   These are bugs, never caller mistakes, and poison the instance.

use std::io;
use thiserror::Error;

/// The main error type for zpress operations.
#[derive(Debug, Error)]
pub enum PressError {
    /// I/O error from an underlying writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Compression level outside 0-9.
    #[error("Invalid compression level {level}: expected 0-9")]
    InvalidLevel {
        /// The rejected level.
        level: u8,
    },

    /// Window size exponent outside 9-15.
    #[error("Invalid window bits {bits}: expected 9-15")]
    InvalidWindowBits {
        /// The rejected exponent.
        bits: u8,
    },

    /// Memory level outside 1-9.
    #[error("Invalid memory level {level}: expected 1-9")]
    InvalidMemLevel {
        /// The rejected memory level.
        level: u8,
    },

    /// The stream already emitted its final block.
    #[error("Stream already finished; reset before compressing more data")]
    StreamFinished,

    /// A preset dictionary cannot be installed right now.
    #[error("Preset dictionary rejected: {reason}")]
    DictionaryNotAllowed {
        /// Why the dictionary was refused.
        reason: String,
    },

    /// Engine invariant violated. The compressor is unusable afterwards.
    #[error("Internal compressor error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

/// Result type alias for zpress operations.
pub type Result<T> = std::result::Result<T, PressError>;

impl PressError {
    /// Create an invalid level error.
    pub fn invalid_level(level: u8) -> Self {
        Self::InvalidLevel { level }
    }

    /// Create an invalid window bits error.
    pub fn invalid_window_bits(bits: u8) -> Self {
        Self::InvalidWindowBits { bits }
    }

    /// Create an invalid memory level error.
    pub fn invalid_mem_level(level: u8) -> Self {
        Self::InvalidMemLevel { level }
    }

    /// Create a dictionary rejection error.
    pub fn dictionary_not_allowed(reason: impl Into<String>) -> Self {
        Self::DictionaryNotAllowed {
            reason: reason.into(),
        }
    }

    /// Create an internal (engine bug) error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error reports a bug in the compressor rather than misuse.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }

    /// Whether this error was caused by an out-of-range configuration value.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Self::InvalidLevel { .. } | Self::InvalidWindowBits { .. } | Self::InvalidMemLevel { .. }
        )
    }
}
