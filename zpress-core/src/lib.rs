//! # zpress core
//!
//! Core components shared by the zpress compressor crates.
//!
//! - [`bitstream`]: LSB-first bit writer with a drainable pending buffer
//! - [`checksum`]: Adler-32, the zlib trailer checksum
//! - [`traits`]: streaming compressor trait and flush modes
//! - [`error`]: error types
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Facade                                                  │
//! │     ZlibCompressor (append / flush), ZlibEncoder<W>     │
//! ├─────────────────────────────────────────────────────────┤
//! │ Codec (zpress-deflate)                                  │
//! │     stream state machine, LZ77 matcher, Huffman trees   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Core (this crate)                                       │
//! │     BitWriter, Adler32, Compressor trait, PressError    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use zpress_core::bitstream::BitWriter;
//! use zpress_core::checksum::Adler32;
//!
//! let mut writer = BitWriter::new();
//! writer.send_bits(0b011, 3);
//! writer.windup();
//! assert_eq!(writer.pending_len(), 1);
//!
//! assert_eq!(Adler32::checksum(b"Wikipedia"), 0x11E6_0398);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod bitstream;
pub mod checksum;
pub mod error;
pub mod traits;

// Re-exports for convenience
pub use bitstream::BitWriter;
pub use checksum::Adler32;
pub use error::{PressError, Result};
pub use traits::{CompressStatus, Compressor, FlushMode};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::bitstream::BitWriter;
    pub use crate::checksum::Adler32;
    pub use crate::error::{PressError, Result};
    pub use crate::traits::{CompressStatus, Compressor, FlushMode};
}
