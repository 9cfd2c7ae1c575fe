//! Zlib compression front ends.
//!
//! The zlib format (RFC 1950) wraps raw DEFLATE data with a header and
//! an Adler-32 checksum.
//!
//! # Format
//!
//! ```text
//! +---+---+=============+============+---+---+---+---+
//! |CMF|FLG|(DICTID, opt)| compressed |    ADLER32    |
//! +---+---+=============+============+---+---+---+---+
//! ```
//!
//! - CMF: Compression Method and Flags
//!   - Bits 0-3: CM (Compression Method) - 8 for DEFLATE
//!   - Bits 4-7: CINFO (Compression Info) - log2(window size) - 8
//! - FLG: Flags
//!   - Bits 0-4: FCHECK - check bits so (CMF*256 + FLG) mod 31 == 0
//!   - Bit 5: FDICT - preset dictionary present
//!   - Bits 6-7: FLEVEL - compression level (0-3)
//! - DICTID: Adler-32 of the preset dictionary (big-endian), only with FDICT
//! - ADLER32: Adler-32 checksum of uncompressed data (big-endian)
//!
//! Three ways in:
//!
//! - [`compress`] / [`compress_with`]: one shot, whole input in memory.
//! - [`ZlibCompressor`]: push bytes with `append`, collect output chunks.
//! - [`ZlibEncoder`]: a [`std::io::Write`] sink around any writer.

use crate::config::DeflateConfig;
use crate::stream::Deflater;
use std::io::{self, Write};
use zpress_core::error::Result;
use zpress_core::traits::{CompressStatus, Compressor, FlushMode};

/// Size of the scratch buffer output is collected through.
const CHUNK_SIZE: usize = 16 * 1024;

/// Compress `input` into a complete zlib stream at `level` (0-9).
///
/// # Example
///
/// ```
/// use zpress_deflate::zlib::compress;
///
/// let data = b"Hello, World! Hello, World!";
/// let compressed = compress(data, 6).unwrap();
/// assert_eq!(&compressed[..2], &[0x78, 0x9C]);
/// ```
pub fn compress(input: &[u8], level: u8) -> Result<Vec<u8>> {
    compress_with(input, &DeflateConfig::new(level))
}

/// Compress `input` in one shot with an explicit configuration.
pub fn compress_with(input: &[u8], config: &DeflateConfig) -> Result<Vec<u8>> {
    let mut compressor = ZlibCompressor::new(*config)?;
    let mut output = compressor.append(input)?;
    output.extend(compressor.flush()?);
    Ok(output)
}

/// Incremental compressor with an `append` / `flush` interface.
///
/// Each call returns whatever compressed bytes became available. Concatenated
/// in order they form one zlib (or raw DEFLATE) stream.
///
/// # Example
///
/// ```
/// use zpress_deflate::zlib::ZlibCompressor;
/// use zpress_deflate::DeflateConfig;
///
/// let mut compressor = ZlibCompressor::new(DeflateConfig::default()).unwrap();
/// let mut stream = compressor.append(b"first part, ").unwrap();
/// stream.extend(compressor.append(b"second part").unwrap());
/// stream.extend(compressor.flush().unwrap());
/// assert!(compressor.is_finished());
/// ```
#[derive(Debug)]
pub struct ZlibCompressor {
    deflater: Deflater,
    buffer: Vec<u8>,
}

impl ZlibCompressor {
    /// Create a compressor; fails if the configuration is invalid.
    pub fn new(config: DeflateConfig) -> Result<Self> {
        Ok(Self {
            deflater: Deflater::new(config)?,
            buffer: vec![0; CHUNK_SIZE],
        })
    }

    /// The underlying stream state machine.
    pub fn deflater(&self) -> &Deflater {
        &self.deflater
    }

    /// Install a preset dictionary. See [`Deflater::set_dictionary`].
    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> Result<u32> {
        self.deflater.set_dictionary(dictionary)
    }

    /// Feed `data`. Returns the compressed bytes produced so far, which may
    /// be empty while the compressor is still collecting a block.
    pub fn append(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        self.drive(data, FlushMode::None)
    }

    /// Finish the stream and return the remaining bytes: the final block and
    /// the trailer, plus the header if nothing was written before.
    pub fn flush(&mut self) -> Result<Vec<u8>> {
        self.drive(&[], FlushMode::Finish)
    }

    /// Emit everything compressed so far, ending on a byte boundary. A
    /// decoder can decompress all input appended before this point.
    pub fn sync_flush(&mut self) -> Result<Vec<u8>> {
        self.drive(&[], FlushMode::Sync)
    }

    /// Like [`sync_flush`](Self::sync_flush), and later data is compressed
    /// without references to anything before this point.
    pub fn full_flush(&mut self) -> Result<Vec<u8>> {
        self.drive(&[], FlushMode::Full)
    }

    /// Whether [`flush`](Self::flush) has completed.
    pub fn is_finished(&self) -> bool {
        self.deflater.is_finished()
    }

    /// Start a new stream with the same configuration.
    pub fn reset(&mut self) {
        self.deflater.reset();
    }

    fn drive(&mut self, data: &[u8], flush: FlushMode) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut pos = 0;

        loop {
            let (consumed, produced, status) =
                self.deflater
                    .deflate(&data[pos..], &mut self.buffer, flush)?;
            pos += consumed;
            output.extend_from_slice(&self.buffer[..produced]);

            match status {
                CompressStatus::Done => break,
                CompressStatus::NeedsInput if pos == data.len() => break,
                _ => {}
            }
        }

        Ok(output)
    }
}

/// A [`Write`] sink that zlib-compresses everything written to it.
///
/// [`Write::flush`] performs a sync flush and flushes the inner writer.
/// Call [`finish`](Self::finish) to end the stream; dropping the encoder
/// without it leaves the stream incomplete.
///
/// # Example
///
/// ```
/// use std::io::Write;
/// use zpress_deflate::zlib::ZlibEncoder;
/// use zpress_deflate::DeflateConfig;
///
/// let mut encoder = ZlibEncoder::new(Vec::new(), DeflateConfig::new(9)).unwrap();
/// encoder.write_all(b"streamed through a writer").unwrap();
/// let stream = encoder.finish().unwrap();
/// assert_eq!(stream[0], 0x78);
/// ```
#[derive(Debug)]
pub struct ZlibEncoder<W: Write> {
    inner: W,
    deflater: Deflater,
    buffer: Vec<u8>,
}

impl<W: Write> ZlibEncoder<W> {
    /// Wrap `inner`.
    pub fn new(inner: W, config: DeflateConfig) -> Result<Self> {
        Ok(Self {
            inner,
            deflater: Deflater::new(config)?,
            buffer: vec![0; CHUNK_SIZE],
        })
    }

    /// The wrapped writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Bytes consumed so far.
    pub fn total_in(&self) -> u64 {
        self.deflater.total_in()
    }

    /// Compressed bytes handed to the inner writer so far.
    pub fn total_out(&self) -> u64 {
        self.deflater.total_out()
    }

    /// Write the final block and trailer and return the inner writer.
    pub fn finish(mut self) -> Result<W> {
        self.drive(&[], FlushMode::Finish)?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn drive(&mut self, data: &[u8], flush: FlushMode) -> Result<usize> {
        let mut pos = 0;

        loop {
            let (consumed, produced, status) =
                self.deflater
                    .deflate(&data[pos..], &mut self.buffer, flush)?;
            pos += consumed;
            self.inner.write_all(&self.buffer[..produced])?;

            match status {
                CompressStatus::Done => break,
                CompressStatus::NeedsInput if pos == data.len() => break,
                _ => {}
            }
        }

        Ok(pos)
    }
}

impl<W: Write> Write for ZlibEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.drive(buf, FlushMode::None).map_err(io::Error::other)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drive(&[], FlushMode::Sync).map_err(io::Error::other)?;
        self.inner.flush()
    }
}
