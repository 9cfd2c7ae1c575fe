//! Bit-level output for DEFLATE encoders.
//!
//! This module provides `BitWriter`, which packs variable-length codes into a
//! pending byte buffer that the caller drains into output slices of any size.
//!
//! # Bit Ordering
//!
//! DEFLATE packs bits LSB-first within bytes. Huffman codes must therefore be
//! passed in already bit-reversed; extra bits and header fields are passed as
//! plain integers.
//!
//! # Example
//!
//! ```
//! use zpress_core::bitstream::BitWriter;
//!
//! let mut writer = BitWriter::new();
//! writer.send_bits(0b101, 3);
//! writer.send_bits(0b11001, 5);
//! writer.windup();
//!
//! let mut out = [0u8; 4];
//! let n = writer.drain_into(&mut out);
//! assert_eq!(&out[..n], &[0xCD]);
//! ```

/// Width of the accumulator flush unit in bits.
const WORD_BITS: u8 = 16;

/// A bit-level writer backed by an in-memory pending buffer.
///
/// Bits accumulate in a small register. Whenever 16 or more bits are held,
/// the low 16 are appended to the pending buffer as a little-endian word, so
/// fewer than 16 bits are ever outstanding between calls.
#[derive(Debug, Clone, Default)]
pub struct BitWriter {
    /// Bytes produced but not yet handed to the caller.
    pending: Vec<u8>,
    /// Index of the first undelivered byte in `pending`.
    pending_out: usize,
    /// Bit accumulator (LSB-first).
    bit_buf: u64,
    /// Number of valid bits in `bit_buf` (always < 16 between calls).
    bit_count: u8,
    /// Total bits written, including padding.
    total_bits_written: u64,
}

impl BitWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty writer with room for `capacity` pending bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            pending: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Discard all pending output and buffered bits.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.pending_out = 0;
        self.bit_buf = 0;
        self.bit_count = 0;
        self.total_bits_written = 0;
    }

    /// Total number of bits written so far, padding included.
    pub fn bits_written(&self) -> u64 {
        self.total_bits_written
    }

    /// Number of bits held in the accumulator.
    pub fn pending_bits(&self) -> u8 {
        self.bit_count
    }

    /// Number of whole bytes waiting to be drained.
    pub fn pending_len(&self) -> usize {
        self.pending.len() - self.pending_out
    }

    /// Whether no whole bytes are waiting to be drained.
    pub fn is_drained(&self) -> bool {
        self.pending_len() == 0
    }

    /// Write `length` bits of `value`, LSB first.
    ///
    /// `length` must be in `1..=32`. Bits of `value` above `length` are ignored.
    #[inline]
    pub fn send_bits(&mut self, value: u32, length: u8) {
        debug_assert!(
            (1..=32).contains(&length),
            "bit length {} out of range",
            length
        );

        let mask = if length >= 32 {
            u32::MAX
        } else {
            (1u32 << length).wrapping_sub(1)
        };

        self.bit_buf |= u64::from(value & mask) << self.bit_count;
        self.bit_count += length;
        self.total_bits_written += u64::from(length);

        while self.bit_count >= WORD_BITS {
            let word = self.bit_buf as u16;
            self.pending.extend_from_slice(&word.to_le_bytes());
            self.bit_buf >>= WORD_BITS;
            self.bit_count -= WORD_BITS;
        }
    }

    /// Emit a whole byte out of the accumulator if one is available.
    ///
    /// Unlike [`windup`](Self::windup) this never pads: up to 7 bits may stay
    /// buffered.
    pub fn flush_bits(&mut self) {
        if self.bit_count >= 8 {
            self.pending.push(self.bit_buf as u8);
            self.bit_buf >>= 8;
            self.bit_count -= 8;
        }
    }

    /// Pad with zero bits to the next byte boundary and emit everything.
    pub fn windup(&mut self) {
        if self.bit_count > 8 {
            self.pending
                .extend_from_slice(&(self.bit_buf as u16).to_le_bytes());
        } else if self.bit_count > 0 {
            self.pending.push(self.bit_buf as u8);
        }
        let padding = (8 - self.bit_count % 8) % 8;
        self.total_bits_written += u64::from(padding);
        self.bit_buf = 0;
        self.bit_count = 0;
    }

    /// Append one byte. The writer must be byte-aligned.
    pub fn put_byte(&mut self, byte: u8) {
        debug_assert_eq!(self.bit_count, 0, "put_byte on unaligned writer");
        self.pending.push(byte);
        self.total_bits_written += 8;
    }

    /// Append a 16-bit value, least significant byte first.
    pub fn put_u16_lsb(&mut self, value: u16) {
        self.write_bytes(&value.to_le_bytes());
    }

    /// Append a 16-bit value, most significant byte first.
    pub fn put_u16_msb(&mut self, value: u16) {
        self.write_bytes(&value.to_be_bytes());
    }

    /// Append a 32-bit value, most significant byte first.
    pub fn put_u32_msb(&mut self, value: u32) {
        self.write_bytes(&value.to_be_bytes());
    }

    /// Append raw bytes. The writer must be byte-aligned.
    pub fn write_bytes(&mut self, buf: &[u8]) {
        debug_assert_eq!(self.bit_count, 0, "write_bytes on unaligned writer");
        self.pending.extend_from_slice(buf);
        self.total_bits_written += buf.len() as u64 * 8;
    }

    /// Move as many pending bytes as fit into `out`.
    ///
    /// Returns the number of bytes copied. Bytes that do not fit stay pending
    /// for the next call.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let available = &self.pending[self.pending_out..];
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.pending_out += n;

        if self.pending_out == self.pending.len() {
            self.pending.clear();
            self.pending_out = 0;
        }
        n
    }

    /// Move all pending bytes into `out`.
    pub fn drain_to_vec(&mut self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.pending[self.pending_out..]);
        self.pending.clear();
        self.pending_out = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drained(writer: &mut BitWriter) -> Vec<u8> {
        let mut out = Vec::new();
        writer.drain_to_vec(&mut out);
        out
    }

    #[test]
    fn test_single_bits() {
        let mut writer = BitWriter::new();
        // 0b10110101 bit by bit, LSB first
        for bit in [1, 0, 1, 0, 1, 1, 0, 1] {
            writer.send_bits(bit, 1);
        }
        writer.windup();
        assert_eq!(drained(&mut writer), vec![0xB5]);
    }

    #[test]
    fn test_multi_bits() {
        let mut writer = BitWriter::new();
        writer.send_bits(0b101, 3);
        writer.send_bits(0b11001, 5);
        writer.windup();
        // 11001_101
        assert_eq!(drained(&mut writer), vec![0xCD]);
    }

    #[test]
    fn test_accumulator_stays_below_word() {
        let mut writer = BitWriter::new();
        writer.send_bits(0x7FFF, 15);
        assert_eq!(writer.pending_bits(), 15);
        assert_eq!(writer.pending_len(), 0);

        writer.send_bits(0b1, 1);
        assert_eq!(writer.pending_bits(), 0);
        assert_eq!(drained(&mut writer), vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_wide_values() {
        let mut writer = BitWriter::new();
        writer.send_bits(0b1, 1);
        writer.send_bits(0xDEAD_BEEF, 32);
        writer.windup();

        let bytes = drained(&mut writer);
        let mut value = 0u64;
        for (i, b) in bytes.iter().enumerate() {
            value |= u64::from(*b) << (8 * i);
        }
        assert_eq!(value & 1, 1);
        assert_eq!((value >> 1) as u32, 0xDEAD_BEEF);
        assert_eq!(writer.bits_written(), 40);
    }

    #[test]
    fn test_extra_high_bits_are_masked() {
        let mut writer = BitWriter::new();
        writer.send_bits(0xFF, 2);
        writer.windup();
        assert_eq!(drained(&mut writer), vec![0b11]);
    }

    #[test]
    fn test_windup_counts_padding() {
        let mut writer = BitWriter::new();
        writer.send_bits(0b1, 3);
        writer.windup();
        assert_eq!(writer.bits_written(), 8);
        writer.windup();
        assert_eq!(writer.bits_written(), 8);

        writer.send_bits(0x1FF, 9);
        writer.windup();
        assert_eq!(writer.bits_written(), 24);
        assert_eq!(drained(&mut writer), vec![0x01, 0xFF, 0x01]);
    }

    #[test]
    fn test_flush_bits_keeps_partial_byte() {
        let mut writer = BitWriter::new();
        writer.send_bits(0x3FF, 10);
        writer.flush_bits();
        assert_eq!(writer.pending_bits(), 2);
        assert_eq!(drained(&mut writer), vec![0xFF]);
    }

    #[test]
    fn test_byte_helpers() {
        let mut writer = BitWriter::new();
        writer.put_u16_msb(0x789C);
        writer.put_u16_lsb(0x0005);
        writer.put_u32_msb(0x0102_0304);
        writer.put_byte(0xAA);
        assert_eq!(
            drained(&mut writer),
            vec![0x78, 0x9C, 0x05, 0x00, 0x01, 0x02, 0x03, 0x04, 0xAA]
        );
    }

    #[test]
    fn test_partial_drain() {
        let mut writer = BitWriter::new();
        writer.write_bytes(&[1, 2, 3, 4, 5]);

        let mut out = [0u8; 2];
        assert_eq!(writer.drain_into(&mut out), 2);
        assert_eq!(out, [1, 2]);
        assert_eq!(writer.pending_len(), 3);

        assert_eq!(writer.drain_into(&mut out), 2);
        assert_eq!(out, [3, 4]);

        let mut big = [0u8; 8];
        assert_eq!(writer.drain_into(&mut big), 1);
        assert_eq!(big[0], 5);
        assert!(writer.is_drained());
        assert_eq!(writer.drain_into(&mut big), 0);
    }
}
