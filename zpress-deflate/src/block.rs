//! Block assembly: token buffer, block type selection and block encoding.
//!
//! Tokens from the matcher are tallied into the literal/length and distance
//! trees as they arrive. When a block is flushed, both trees and the bit
//! length tree are built and the cheapest of three encodings is written:
//!
//! - **stored**: raw bytes behind a LEN/NLEN header
//! - **static**: the fixed codes of RFC 1951 3.2.6
//! - **dynamic**: per-block codes, described in the block header

use crate::config::Strategy;
use crate::huffman::{BlockCost, Code, HuffmanTree};
use crate::lz77::Token;
use crate::tables::{
    BL_CODES, CODE_LENGTH_ORDER, DYN_TREES, END_BLOCK, MAX_MATCH, MAX_STORED, MIN_MATCH,
    REP_3_6, REPZ_3_10, REPZ_11_138, STATIC_TREES, STORED_BLOCK, distance_to_code, length_to_code,
    static_distance_codes, static_litlen_codes,
};
use tracing::trace;
use zpress_core::bitstream::BitWriter;
use zpress_core::error::{PressError, Result};

/// Encoding chosen for a flushed block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Uncompressed.
    Stored,
    /// Fixed Huffman codes.
    Static,
    /// Dynamic Huffman codes.
    Dynamic,
}

/// Number of blocks written with each encoding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockStats {
    /// Stored blocks, including empty flush markers.
    pub stored: u64,
    /// Fixed-code blocks.
    pub fixed: u64,
    /// Dynamic-code blocks.
    pub dynamic: u64,
    /// Largest match distance emitted.
    pub longest_distance: u16,
}

/// Accumulates the tokens of one block and encodes it.
#[derive(Debug, Clone)]
pub struct BlockEncoder {
    ltree: HuffmanTree,
    dtree: HuffmanTree,
    bltree: HuffmanTree,
    tokens: Vec<Token>,
    /// Block is full at this many tokens.
    sym_end: usize,
    cost: BlockCost,
    level: u8,
    strategy: Strategy,
    max_dist: usize,
    stats: BlockStats,
}

impl BlockEncoder {
    /// Create an encoder holding up to `lit_bufsize - 1` tokens per block.
    pub fn new(lit_bufsize: usize, level: u8, strategy: Strategy, max_dist: usize) -> Self {
        let mut encoder = Self {
            ltree: HuffmanTree::literal_length(),
            dtree: HuffmanTree::distance(),
            bltree: HuffmanTree::bit_length(),
            tokens: Vec::with_capacity(lit_bufsize),
            sym_end: lit_bufsize - 1,
            cost: BlockCost::default(),
            level,
            strategy,
            max_dist,
            stats: BlockStats::default(),
        };
        encoder.init_block();
        encoder
    }

    /// Drop the current block and the statistics.
    pub fn reset(&mut self) {
        self.init_block();
        self.stats = BlockStats::default();
    }

    /// Start a new, empty block.
    fn init_block(&mut self) {
        self.ltree.reset();
        self.dtree.reset();
        self.bltree.reset();
        self.ltree.add(END_BLOCK);
        self.cost = BlockCost::default();
        self.tokens.clear();
    }

    /// Tokens in the current block.
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Whether the current block holds no tokens.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Blocks written so far.
    pub fn stats(&self) -> BlockStats {
        self.stats
    }

    /// Record a literal. Returns `true` when the block is full.
    #[inline]
    pub fn tally_lit(&mut self, byte: u8) -> bool {
        self.tokens.push(Token::Literal(byte));
        self.ltree.add(usize::from(byte));
        self.tokens.len() == self.sym_end
    }

    /// Record a match. Returns `true` when the block is full.
    ///
    /// A distance outside `1..=max_dist` or a length outside 3-258 means the
    /// matcher is broken and is reported as an internal error.
    pub fn tally_dist(&mut self, distance: usize, length: usize) -> Result<bool> {
        if distance == 0 || distance > self.max_dist {
            return Err(PressError::internal(format!(
                "match distance {} outside 1..={}",
                distance, self.max_dist
            )));
        }
        if !(MIN_MATCH..=MAX_MATCH).contains(&length) {
            return Err(PressError::internal(format!(
                "match length {} outside {}..={}",
                length, MIN_MATCH, MAX_MATCH
            )));
        }

        let (length, distance) = (length as u16, distance as u16);
        self.tokens.push(Token::Match { length, distance });
        self.stats.longest_distance = self.stats.longest_distance.max(distance);
        self.ltree.add(usize::from(length_to_code(length).0));
        self.dtree.add(usize::from(distance_to_code(distance).0));
        Ok(self.tokens.len() == self.sym_end)
    }

    /// Write the current block and start a new one.
    ///
    /// `block` holds the block's uncompressed bytes when they are still
    /// available; only then can a stored block be chosen. `stored_len` is the
    /// block's uncompressed length either way. A final block is followed by
    /// padding to a byte boundary.
    pub fn flush_block(
        &mut self,
        writer: &mut BitWriter,
        block: Option<&[u8]>,
        stored_len: usize,
        last: bool,
    ) -> Result<BlockKind> {
        let mut max_blindex = 0;
        let (opt_lenb, static_lenb) = if self.level > 0 {
            self.ltree.build(&mut self.cost)?;
            self.dtree.build(&mut self.cost)?;
            max_blindex = self.build_bl_tree()?;

            let opt_lenb = (self.cost.opt_len + 3 + 7) >> 3;
            let static_lenb = (self.cost.static_len + 3 + 7) >> 3;
            if static_lenb <= opt_lenb || self.strategy == Strategy::Fixed {
                (static_lenb, static_lenb)
            } else {
                (opt_lenb, static_lenb)
            }
        } else {
            (stored_len + 5, stored_len + 5)
        };

        let kind = match block {
            Some(bytes) if stored_len + 4 <= opt_lenb && stored_len <= MAX_STORED => {
                stored_block(writer, bytes, last);
                self.stats.stored += 1;
                BlockKind::Stored
            }
            _ if static_lenb == opt_lenb => {
                writer.send_bits((STATIC_TREES << 1) + u32::from(last), 3);
                compress_block(
                    writer,
                    &self.tokens,
                    static_litlen_codes(),
                    static_distance_codes(),
                );
                self.stats.fixed += 1;
                BlockKind::Static
            }
            _ => {
                writer.send_bits((DYN_TREES << 1) + u32::from(last), 3);
                self.send_all_trees(
                    writer,
                    self.ltree.max_code() + 1,
                    self.dtree.max_code() + 1,
                    max_blindex + 1,
                );
                compress_block(writer, &self.tokens, self.ltree.codes(), self.dtree.codes());
                self.stats.dynamic += 1;
                BlockKind::Dynamic
            }
        };

        trace!(
            "flushed {kind:?} block: {} tokens, {stored_len} bytes in, estimates stored={} fixed={static_lenb} dynamic={}, last={last}",
            self.tokens.len(),
            stored_len + 4,
            (self.cost.opt_len + 3 + 7) >> 3,
        );

        self.init_block();
        if last {
            writer.windup();
        }
        Ok(kind)
    }

    /// Write an empty stored block (`00 00 FF FF` after the header bits).
    /// Non-final, it is the sync and full flush marker; final, it closes a
    /// stream that never received data.
    pub fn empty_stored_block(&mut self, writer: &mut BitWriter, last: bool) {
        stored_block(writer, &[], last);
        self.stats.stored += 1;
    }

    /// Write an empty fixed-code block and push out whole bytes.
    ///
    /// Gives the decoder enough bits to finish the previous block without
    /// padding the stream to a byte boundary.
    pub fn align(&mut self, writer: &mut BitWriter) {
        writer.send_bits(STATIC_TREES << 1, 3);
        let eob = static_litlen_codes()[END_BLOCK];
        writer.send_bits(u32::from(eob.code), eob.len);
        writer.flush_bits();
        self.stats.fixed += 1;
    }

    /// Build the bit length tree over the run-length coded tree lengths.
    ///
    /// Returns the index in [`CODE_LENGTH_ORDER`] of the last bit length
    /// code to transmit (at least 3, so 4 codes are always sent).
    fn build_bl_tree(&mut self) -> Result<usize> {
        let bltree = &mut self.bltree;
        for tree in [&self.ltree, &self.dtree] {
            scan_lengths(tree.codes(), tree.max_code(), |symbol, _, _| {
                bltree.add(symbol);
            });
        }

        self.bltree.build(&mut self.cost)?;

        let mut max_blindex = BL_CODES - 1;
        while max_blindex >= 3 && self.bltree.code(CODE_LENGTH_ORDER[max_blindex]).len == 0 {
            max_blindex -= 1;
        }

        // Three bits per bit length code, plus HLIT, HDIST and HCLEN.
        self.cost.opt_len += 3 * (max_blindex + 1) + 5 + 5 + 4;
        Ok(max_blindex)
    }

    /// Write the dynamic block header: tree sizes, the bit length code
    /// lengths, then both trees run-length coded.
    fn send_all_trees(&self, writer: &mut BitWriter, lcodes: usize, dcodes: usize, blcodes: usize) {
        writer.send_bits((lcodes - 257) as u32, 5);
        writer.send_bits((dcodes - 1) as u32, 5);
        writer.send_bits((blcodes - 4) as u32, 4);

        for &symbol in &CODE_LENGTH_ORDER[..blcodes] {
            let len = self.bltree.code(symbol).len;
            writer.send_bits(u32::from(len), 3);
        }

        let bl_codes = self.bltree.codes();
        for (codes, max_code) in [(self.ltree.codes(), lcodes - 1), (self.dtree.codes(), dcodes - 1)] {
            scan_lengths(codes, max_code, |symbol, extra_len, extra| {
                send_code(writer, bl_codes[symbol]);
                if extra_len > 0 {
                    writer.send_bits(extra, extra_len);
                }
            });
        }
    }
}

/// Write a stored block holding `data`.
fn stored_block(writer: &mut BitWriter, data: &[u8], last: bool) {
    writer.send_bits((STORED_BLOCK << 1) + u32::from(last), 3);
    writer.windup();
    let len = data.len() as u16;
    writer.put_u16_lsb(len);
    writer.put_u16_lsb(!len);
    writer.write_bytes(data);
}

#[inline]
fn send_code(writer: &mut BitWriter, code: Code) {
    debug_assert!(code.len > 0, "sending a symbol with no code");
    writer.send_bits(u32::from(code.code), code.len);
}

/// Write the tokens of a block with the given codes, then END_BLOCK.
fn compress_block(writer: &mut BitWriter, tokens: &[Token], lcodes: &[Code], dcodes: &[Code]) {
    for token in tokens {
        match *token {
            Token::Literal(byte) => send_code(writer, lcodes[usize::from(byte)]),
            Token::Match { length, distance } => {
                let (code, extra_bits, extra) = length_to_code(length);
                send_code(writer, lcodes[usize::from(code)]);
                if extra_bits > 0 {
                    writer.send_bits(u32::from(extra), extra_bits);
                }

                let (code, extra_bits, extra) = distance_to_code(distance);
                send_code(writer, dcodes[usize::from(code)]);
                if extra_bits > 0 {
                    writer.send_bits(u32::from(extra), extra_bits);
                }
            }
        }
    }
    send_code(writer, lcodes[END_BLOCK]);
}

/// Run-length code the code lengths of symbols `0..=max_code`.
///
/// Calls `emit(symbol, extra_len, extra)` for every bit length symbol in
/// transmission order: a plain length (0-15), 16 (repeat the previous length
/// 3-6 times), 17 (3-10 zeros) or 18 (11-138 zeros). Used both to count
/// bit length symbol frequencies and to send the trees.
fn scan_lengths(codes: &[Code], max_code: usize, mut emit: impl FnMut(usize, u8, u32)) {
    let len_at = |n: usize| -> Option<u8> {
        if n <= max_code {
            Some(codes[n].len)
        } else {
            None
        }
    };

    let mut prevlen: Option<u8> = None;
    let mut nextlen = len_at(0);
    let mut count = 0usize;
    let (mut max_count, mut min_count) = if nextlen == Some(0) { (138, 3) } else { (7, 4) };

    for n in 0..=max_code {
        let curlen = nextlen.unwrap_or(0);
        nextlen = len_at(n + 1);
        count += 1;

        if count < max_count && Some(curlen) == nextlen {
            continue;
        }

        if count < min_count {
            for _ in 0..count {
                emit(usize::from(curlen), 0, 0);
            }
        } else if curlen != 0 {
            if Some(curlen) != prevlen {
                emit(usize::from(curlen), 0, 0);
                count -= 1;
            }
            emit(REP_3_6, 2, (count - 3) as u32);
        } else if count <= 10 {
            emit(REPZ_3_10, 3, (count - 3) as u32);
        } else {
            emit(REPZ_11_138, 7, (count - 11) as u32);
        }

        count = 0;
        prevlen = Some(curlen);
        (max_count, min_count) = if nextlen == Some(0) {
            (138, 3)
        } else if nextlen == Some(curlen) {
            (6, 3)
        } else {
            (7, 4)
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::huffman::canonical_codes;
    use crate::tables::L_CODES;

    fn encoder(level: u8, strategy: Strategy) -> BlockEncoder {
        BlockEncoder::new(1 << 14, level, strategy, 32768 - 262)
    }

    fn runs(lengths: &[u8]) -> Vec<(usize, u8, u32)> {
        let codes: Vec<Code> = lengths.iter().map(|&len| Code { code: 0, len }).collect();
        let mut out = Vec::new();
        scan_lengths(&codes, lengths.len() - 1, |s, b, e| out.push((s, b, e)));
        out
    }

    /// Expand run-length coded lengths back to plain lengths.
    fn expand(items: &[(usize, u8, u32)]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        for &(symbol, _, extra) in items {
            match symbol {
                0..=15 => out.push(symbol as u8),
                REP_3_6 => {
                    let last = *out.last().unwrap();
                    out.extend(std::iter::repeat_n(last, 3 + extra as usize));
                }
                REPZ_3_10 => out.extend(std::iter::repeat_n(0, 3 + extra as usize)),
                REPZ_11_138 => out.extend(std::iter::repeat_n(0, 11 + extra as usize)),
                _ => panic!("bad symbol {symbol}"),
            }
        }
        out
    }

    #[test]
    fn test_scan_lengths_runs() {
        let lengths = [8, 8, 8, 8, 8, 8, 8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 5, 5];
        let items = runs(&lengths);
        assert_eq!(items[0], (8, 0, 0));
        assert_eq!(items[1], (REP_3_6, 2, 3));
        assert_eq!(items[2], (REPZ_11_138, 7, 1));
        assert_eq!(&items[3..], &[(5, 0, 0), (5, 0, 0)]);
        assert_eq!(expand(&items), lengths);
    }

    #[test]
    fn test_scan_lengths_round_trips() {
        let mut lengths = vec![0u8; 200];
        for (i, len) in lengths.iter_mut().enumerate() {
            *len = match i % 37 {
                0..=9 => 7,
                10..=12 => 3,
                13..=30 => 0,
                _ => (i % 15) as u8,
            };
        }
        lengths.extend(std::iter::repeat_n(0, 150));
        lengths.push(9);
        assert_eq!(expand(&runs(&lengths)), lengths);
    }

    #[test]
    fn test_tally_reports_full_block() {
        let mut blocks = BlockEncoder::new(8, 6, Strategy::Default, 1000);
        for i in 0..6 {
            assert!(!blocks.tally_lit(i));
        }
        assert!(blocks.tally_lit(6));
        assert_eq!(blocks.tokens().len(), 7);
    }

    #[test]
    fn test_tally_dist_rejects_out_of_range() {
        let mut blocks = encoder(6, Strategy::Default);
        assert!(blocks.tally_dist(0, 3).unwrap_err().is_internal());
        assert!(blocks.tally_dist(40_000, 3).unwrap_err().is_internal());
        assert!(blocks.tally_dist(1, 2).unwrap_err().is_internal());
        assert!(blocks.tally_dist(1, 259).unwrap_err().is_internal());
        assert!(!blocks.tally_dist(1, 258).unwrap());
        assert_eq!(blocks.tokens().len(), 1);
    }

    #[test]
    fn test_empty_stored_block_bytes() {
        let mut blocks = encoder(6, Strategy::Default);
        let mut writer = BitWriter::new();
        blocks.empty_stored_block(&mut writer, false);
        let mut out = Vec::new();
        writer.drain_to_vec(&mut out);
        assert_eq!(out, [0x00, 0x00, 0x00, 0xFF, 0xFF]);
        assert_eq!(blocks.stats().stored, 1);

        blocks.empty_stored_block(&mut writer, true);
        out.clear();
        writer.drain_to_vec(&mut out);
        assert_eq!(out, [0x01, 0x00, 0x00, 0xFF, 0xFF]);
        assert_eq!(blocks.stats().stored, 2);
    }

    #[test]
    fn test_level_zero_stores() {
        let mut blocks = encoder(0, Strategy::Default);
        let data = b"hello hello hello";
        for &b in data {
            blocks.tally_lit(b);
        }
        let mut writer = BitWriter::new();
        let kind = blocks
            .flush_block(&mut writer, Some(data), data.len(), true)
            .unwrap();
        assert_eq!(kind, BlockKind::Stored);

        let mut out = Vec::new();
        writer.drain_to_vec(&mut out);
        assert_eq!(out[0], 0x01);
        assert_eq!(&out[1..3], &(data.len() as u16).to_le_bytes());
        assert_eq!(&out[5..], data);
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_short_block_uses_fixed_codes() {
        let mut blocks = encoder(6, Strategy::Default);
        for &b in b"abc" {
            blocks.tally_lit(b);
        }
        let mut writer = BitWriter::new();
        let kind = blocks.flush_block(&mut writer, None, 3, true).unwrap();
        assert_eq!(kind, BlockKind::Static);

        // 3 header bits + 3 * 8 literal bits + 7 EOB bits = 34 bits.
        assert_eq!(writer.pending_len(), 5);
        let mut out = Vec::new();
        writer.drain_to_vec(&mut out);
        assert_eq!(out[0] & 0b111, 0b011);
    }

    #[test]
    fn test_skewed_block_uses_dynamic_codes() {
        let mut blocks = encoder(6, Strategy::Default);
        for i in 0..4000u32 {
            blocks.tally_lit(if i % 10 == 0 { b'b' } else { b'a' });
        }
        let mut writer = BitWriter::new();
        let kind = blocks.flush_block(&mut writer, None, 4000, false).unwrap();
        assert_eq!(kind, BlockKind::Dynamic);
        assert!(writer.pending_len() < 1000);
    }

    #[test]
    fn test_fixed_strategy_never_dynamic() {
        let mut blocks = encoder(6, Strategy::Fixed);
        for i in 0..4000u32 {
            blocks.tally_lit(if i % 10 == 0 { b'b' } else { b'a' });
        }
        let mut writer = BitWriter::new();
        let kind = blocks.flush_block(&mut writer, None, 4000, false).unwrap();
        assert_eq!(kind, BlockKind::Static);
    }

    #[test]
    fn test_incompressible_block_is_stored() {
        let mut blocks = encoder(6, Strategy::Default);
        let data: Vec<u8> = (0..=255u8).collect();
        for &b in &data {
            blocks.tally_lit(b);
        }
        let mut writer = BitWriter::new();
        let kind = blocks
            .flush_block(&mut writer, Some(&data), data.len(), false)
            .unwrap();
        assert_eq!(kind, BlockKind::Stored);
        assert_eq!(writer.pending_len(), data.len() + 5);
    }

    #[test]
    fn test_align_emits_static_eob() {
        let mut blocks = encoder(6, Strategy::Default);
        let mut writer = BitWriter::new();
        blocks.align(&mut writer);
        // 10 bits: one whole byte goes out, two bits stay buffered.
        assert_eq!(writer.pending_len(), 1);
        assert_eq!(writer.pending_bits(), 2);
    }

    #[test]
    fn test_static_codes_cover_alphabet() {
        let lit = static_litlen_codes();
        assert!(lit[..L_CODES].iter().all(|c| c.len > 0));
        assert_eq!(canonical_codes(&[1, 1])[1].code, 1);
    }
}
