//! # zpress deflate
//!
//! Pure Rust zlib (RFC 1950) and raw DEFLATE (RFC 1951) compressor.
//!
//! The engine follows the classic zlib design: a hash-chain LZ77 matcher over
//! a sliding window, per-block Huffman trees built from symbol frequencies,
//! and a selector that writes each block as stored, static or dynamic,
//! whichever is smallest.
//!
//! ## Features
//!
//! - Levels 0-9 with greedy (1-3) and lazy (4-9) matching
//! - Strategies: default, filtered, Huffman-only, RLE, fixed codes
//! - Window sizes from 512 bytes to 32 KiB
//! - Streaming with partial, sync and full flushes
//! - Preset dictionaries
//! - Zlib or raw output
//!
//! ## Example
//!
//! ```rust
//! use zpress_deflate::{DeflateConfig, ZlibCompressor, compress};
//!
//! let original = b"Hello, World! Hello, World!";
//! let one_shot = compress(original, 6).unwrap();
//!
//! let mut compressor = ZlibCompressor::new(DeflateConfig::new(6)).unwrap();
//! let mut streamed = compressor.append(original).unwrap();
//! streamed.extend(compressor.flush().unwrap());
//! assert_eq!(one_shot, streamed);
//! ```
//!
//! ## Compression Levels
//!
//! - Level 0: No compression (stored blocks)
//! - Level 1-3: Greedy matching
//! - Level 4-6: Lazy matching (default is 6)
//! - Level 7-9: Lazy matching, longer chain searches

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod block;
pub mod config;
pub mod huffman;
pub mod lz77;
pub mod stream;
pub mod tables;
pub mod zlib;

// Re-exports
pub use block::{BlockKind, BlockStats};
pub use config::{DeflateConfig, Format, Strategy};
pub use huffman::HuffmanTree;
pub use lz77::{MatchFinder, Token};
pub use stream::{Deflater, StreamState};
pub use zlib::{ZlibCompressor, ZlibEncoder, compress, compress_with};
