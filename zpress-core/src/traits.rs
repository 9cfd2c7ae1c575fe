//! Streaming compression traits.
//!
//! A [`Compressor`] is driven with caller-owned input and output slices. Each
//! call reports how much it consumed and produced so the caller can refill or
//! drain buffers and call again.

use crate::error::Result;

/// Status of a streaming compression operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressStatus {
    /// All input was consumed; more input (or a flush) is expected.
    NeedsInput,
    /// The output buffer filled up; call again with more space.
    NeedsOutput,
    /// The stream is complete and every byte has been delivered.
    Done,
}

/// Flush mode for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum FlushMode {
    /// No flush - buffer data for best compression.
    #[default]
    None,
    /// Partial flush - emit pending output and an empty static block.
    Partial,
    /// Sync flush - emit all pending output on a byte boundary.
    Sync,
    /// Full flush - sync flush that also forgets match history.
    Full,
    /// Finish - complete the stream.
    Finish,
}

/// A streaming compressor (encoder).
pub trait Compressor {
    /// Compress data from input to output.
    ///
    /// # Arguments
    ///
    /// * `input` - Input data to compress
    /// * `output` - Output buffer for compressed data
    /// * `flush` - Flush mode
    ///
    /// # Returns
    ///
    /// A tuple of (bytes consumed from input, bytes written to output, status)
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<(usize, usize, CompressStatus)>;

    /// Reset the compressor to its initial state.
    fn reset(&mut self);

    /// Check if the compressor has finished.
    fn is_finished(&self) -> bool;

    /// Compress all data at once (convenience method).
    fn compress_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        let mut input_pos = 0;
        let mut buffer = vec![0u8; 32768];

        loop {
            let (consumed, produced, status) =
                self.compress(&input[input_pos..], &mut buffer, FlushMode::Finish)?;

            input_pos += consumed;
            output.extend_from_slice(&buffer[..produced]);

            if status == CompressStatus::Done {
                break;
            }
        }

        Ok(output)
    }
}
