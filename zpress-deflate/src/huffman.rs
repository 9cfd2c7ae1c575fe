//! Huffman tree construction for DEFLATE compression.
//!
//! DEFLATE transmits canonical Huffman codes: only the bit length of every
//! symbol is sent, and codes of the same length are assigned consecutive
//! values in symbol order. This module turns symbol frequencies into
//! length-limited canonical codes.
//!
//! # Algorithm
//!
//! 1. Put every symbol with a nonzero frequency into a binary min-heap,
//!    ordered by frequency and then by subtree depth.
//! 2. Repeatedly merge the two least frequent nodes into a new internal node.
//! 3. Read each leaf's depth as its bit length. Leaves deeper than the
//!    alphabet limit are clamped, and the length counts are then rebalanced by
//!    moving leaves out of the deepest non-empty level above the limit until
//!    the code is complete again.
//! 4. Assign canonical codes and bit-reverse them for LSB-first output.
//!
//! # Alphabets
//!
//! - **Literal/Length**: 0-285, at most 15 bits
//! - **Distance**: 0-29, at most 15 bits
//! - **Bit Length**: 0-18, at most 7 bits

use crate::tables::{
    BL_CODES, BL_EXTRA_BITS, D_CODES, DISTANCE_EXTRA_BITS, L_CODES, LENGTH_EXTRA_BITS, LITERALS,
    MAX_BITS, MAX_BL_BITS, static_distance_codes, static_litlen_codes,
};
use zpress_core::error::{PressError, Result};

/// Index of the heap root.
const SMALLEST: usize = 1;

/// A code ready for output: bit-reversed value and its length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Code {
    /// Code bits, reversed so they can be written LSB-first.
    pub code: u16,
    /// Code length in bits (0 = symbol unused).
    pub len: u8,
}

/// Running bit costs of the block under construction.
///
/// `opt_len` is the cost with the dynamic trees, `static_len` with the fixed
/// trees. Both exclude the 3-bit block header.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockCost {
    /// Bit length of the block with dynamic trees (data + tree description).
    pub opt_len: usize,
    /// Bit length of the block with fixed trees.
    pub static_len: usize,
}

/// Static description of one of the three DEFLATE alphabets.
#[derive(Debug, Clone, Copy)]
struct TreeDesc {
    /// Number of symbols.
    elems: usize,
    /// Longest allowed code.
    max_length: u8,
    /// First symbol that carries extra bits.
    extra_base: usize,
    /// Extra bits per symbol starting at `extra_base`.
    extra_bits: &'static [u8],
    /// Fixed code for the same alphabet, used to price the static block.
    static_codes: Option<&'static [Code]>,
}

/// A dynamic Huffman tree for one block.
#[derive(Debug, Clone)]
pub struct HuffmanTree {
    desc: TreeDesc,
    /// Frequencies for leaves and internal nodes.
    freq: Vec<u32>,
    /// Parent of each node.
    dad: Vec<u16>,
    /// Bit length of each node (depth in the final tree).
    node_len: Vec<u8>,
    /// Subtree depth, used to break frequency ties.
    depth: Vec<u8>,
    /// Heap of node indices; 1-based min-heap at the bottom, sorted nodes at the top.
    heap: Vec<usize>,
    heap_len: usize,
    heap_max: usize,
    /// Number of codes at each bit length.
    bl_count: [u16; MAX_BITS as usize + 1],
    /// Output codes for the leaves.
    codes: Vec<Code>,
    /// Largest symbol with a nonzero code.
    max_code: usize,
}

impl HuffmanTree {
    fn with_desc(desc: TreeDesc) -> Self {
        let nodes = 2 * desc.elems + 1;
        Self {
            desc,
            freq: vec![0; nodes],
            dad: vec![0; nodes],
            node_len: vec![0; nodes],
            depth: vec![0; nodes],
            heap: vec![0; nodes],
            heap_len: 0,
            heap_max: nodes,
            bl_count: [0; MAX_BITS as usize + 1],
            codes: vec![Code::default(); desc.elems],
            max_code: 0,
        }
    }

    /// Tree for the literal/length alphabet.
    pub fn literal_length() -> Self {
        Self::with_desc(TreeDesc {
            elems: L_CODES,
            max_length: MAX_BITS,
            extra_base: LITERALS + 1,
            extra_bits: &LENGTH_EXTRA_BITS,
            static_codes: Some(static_litlen_codes()),
        })
    }

    /// Tree for the distance alphabet.
    pub fn distance() -> Self {
        Self::with_desc(TreeDesc {
            elems: D_CODES,
            max_length: MAX_BITS,
            extra_base: 0,
            extra_bits: &DISTANCE_EXTRA_BITS,
            static_codes: Some(static_distance_codes()),
        })
    }

    /// Tree for the bit length alphabet used to describe the other two.
    pub fn bit_length() -> Self {
        Self::with_desc(TreeDesc {
            elems: BL_CODES,
            max_length: MAX_BL_BITS,
            extra_base: 0,
            extra_bits: &BL_EXTRA_BITS,
            static_codes: None,
        })
    }

    /// Number of symbols in the alphabet.
    pub fn elems(&self) -> usize {
        self.desc.elems
    }

    /// Longest code this tree may contain.
    pub fn max_length(&self) -> u8 {
        self.desc.max_length
    }

    /// Count one more occurrence of `symbol`.
    #[inline]
    pub fn add(&mut self, symbol: usize) {
        self.freq[symbol] += 1;
    }

    /// Count `count` more occurrences of `symbol`.
    #[inline]
    pub fn add_count(&mut self, symbol: usize, count: u32) {
        self.freq[symbol] += count;
    }

    /// Frequency of a leaf.
    pub fn frequency(&self, symbol: usize) -> u32 {
        self.freq[symbol]
    }

    /// Forget all leaf frequencies.
    pub fn reset(&mut self) {
        self.freq[..self.desc.elems].fill(0);
    }

    /// Codes of all leaves, indexed by symbol.
    pub fn codes(&self) -> &[Code] {
        &self.codes
    }

    /// Code of a single leaf.
    #[inline]
    pub fn code(&self, symbol: usize) -> Code {
        self.codes[symbol]
    }

    /// Largest symbol with a nonzero code after [`build`](Self::build).
    pub fn max_code(&self) -> usize {
        self.max_code
    }

    /// Build the tree from the current frequencies.
    ///
    /// Assigns a length and code to every leaf, adds the block's dynamic and
    /// static bit costs to `cost`, and returns the largest used symbol.
    /// Even an alphabet with zero or one used symbol gets two codes so the
    /// result is always a complete prefix code.
    pub fn build(&mut self, cost: &mut BlockCost) -> Result<usize> {
        let elems = self.desc.elems;
        // -1 while no symbol has been seen.
        let mut max_code: isize = -1;

        self.heap_len = 0;
        self.heap_max = self.heap.len();

        for n in 0..elems {
            if self.freq[n] != 0 {
                self.heap_len += 1;
                self.heap[self.heap_len] = n;
                max_code = n as isize;
                self.depth[n] = 0;
            } else {
                self.node_len[n] = 0;
            }
        }

        // A decoder needs at least one bit per code, so force at least two
        // codes. The dummy nodes never occur in the data.
        while self.heap_len < 2 {
            let node = if max_code < 2 {
                max_code += 1;
                max_code as usize
            } else {
                0
            };
            self.heap_len += 1;
            self.heap[self.heap_len] = node;
            self.freq[node] = 1;
            self.depth[node] = 0;
            cost.opt_len = cost.opt_len.wrapping_sub(1);
            if let Some(stree) = self.desc.static_codes {
                cost.static_len = cost.static_len.wrapping_sub(stree[node].len as usize);
            }
        }
        let max_code = max_code as usize;
        self.max_code = max_code;

        // Establish the heap property over the leaves.
        for n in (1..=self.heap_len / 2).rev() {
            self.pq_down_heap(n);
        }

        // Combine the two least frequent nodes until one root remains.
        let mut node = elems;
        loop {
            let n = self.pq_remove();
            let m = self.heap[SMALLEST];

            self.heap_max -= 1;
            self.heap[self.heap_max] = n;
            self.heap_max -= 1;
            self.heap[self.heap_max] = m;

            self.freq[node] = self.freq[n] + self.freq[m];
            self.depth[node] = self.depth[n].max(self.depth[m]) + 1;
            self.dad[n] = node as u16;
            self.dad[m] = node as u16;

            self.heap[SMALLEST] = node;
            node += 1;
            self.pq_down_heap(SMALLEST);

            if self.heap_len < 2 {
                break;
            }
        }

        self.heap_max -= 1;
        self.heap[self.heap_max] = self.heap[SMALLEST];

        self.gen_bitlen(cost);
        self.verify_lengths()?;
        self.gen_codes();

        Ok(max_code)
    }

    /// Whether node `n` sorts before node `m` in the heap.
    #[inline]
    fn smaller(&self, n: usize, m: usize) -> bool {
        self.freq[n] < self.freq[m] || (self.freq[n] == self.freq[m] && self.depth[n] <= self.depth[m])
    }

    /// Restore the heap property by sifting node `k` down.
    fn pq_down_heap(&mut self, mut k: usize) {
        let v = self.heap[k];
        let mut j = k << 1;

        while j <= self.heap_len {
            if j < self.heap_len && self.smaller(self.heap[j + 1], self.heap[j]) {
                j += 1;
            }
            if self.smaller(v, self.heap[j]) {
                break;
            }
            self.heap[k] = self.heap[j];
            k = j;
            j <<= 1;
        }
        self.heap[k] = v;
    }

    /// Remove and return the least frequent node.
    fn pq_remove(&mut self) -> usize {
        let top = self.heap[SMALLEST];
        self.heap[SMALLEST] = self.heap[self.heap_len];
        self.heap_len -= 1;
        self.pq_down_heap(SMALLEST);
        top
    }

    /// Compute bit lengths from the tree shape, enforcing the length limit.
    ///
    /// Nodes sit at the top of the heap array in order of decreasing
    /// frequency, so walking it from the root assigns parents before children.
    fn gen_bitlen(&mut self, cost: &mut BlockCost) {
        let max_length = self.desc.max_length;
        let mut overflow = 0i32;

        self.bl_count = [0; MAX_BITS as usize + 1];

        let root = self.heap[self.heap_max];
        self.node_len[root] = 0;

        for h in self.heap_max + 1..self.heap.len() {
            let n = self.heap[h];
            let mut bits = self.node_len[self.dad[n] as usize] + 1;
            if bits > max_length {
                bits = max_length;
                overflow += 1;
            }
            self.node_len[n] = bits;

            if n > self.max_code {
                continue; // internal node
            }

            self.bl_count[bits as usize] += 1;
            let xbits = if n >= self.desc.extra_base {
                self.desc.extra_bits[n - self.desc.extra_base] as usize
            } else {
                0
            };
            let f = self.freq[n] as usize;
            cost.opt_len = cost.opt_len.wrapping_add(f * (bits as usize + xbits));
            if let Some(stree) = self.desc.static_codes {
                cost.static_len = cost
                    .static_len
                    .wrapping_add(f * (stree[n].len as usize + xbits));
            }
        }

        if overflow == 0 {
            return;
        }

        // Each step moves one leaf from the deepest level with room down one
        // level and hangs an overflow leaf next to it.
        let max = max_length as usize;
        while overflow > 0 {
            let mut bits = max - 1;
            while self.bl_count[bits] == 0 {
                bits -= 1;
            }
            self.bl_count[bits] -= 1;
            self.bl_count[bits + 1] += 2;
            self.bl_count[max] -= 1;
            overflow -= 2;
        }

        // Reassign lengths: leaves come off the heap in increasing frequency,
        // so the rarest symbols get the longest codes.
        let mut h = self.heap.len();
        for bits in (1..=max).rev() {
            let mut n = self.bl_count[bits];
            while n != 0 {
                h -= 1;
                let m = self.heap[h];
                if m > self.max_code {
                    continue;
                }
                let current = self.node_len[m] as usize;
                if current != bits {
                    let f = self.freq[m] as usize;
                    cost.opt_len = cost
                        .opt_len
                        .wrapping_add(bits.wrapping_sub(current).wrapping_mul(f));
                    self.node_len[m] = bits as u8;
                }
                n -= 1;
            }
        }
    }

    /// Check the length limit and Kraft equality of the computed lengths.
    fn verify_lengths(&self) -> Result<()> {
        let max = self.desc.max_length as usize;
        let mut kraft = 0u64;

        for n in 0..=self.max_code {
            let len = self.node_len[n] as usize;
            if len == 0 {
                continue;
            }
            if len > max {
                return Err(PressError::internal(format!(
                    "code length {} for symbol {} exceeds limit {}",
                    len, n, max
                )));
            }
            kraft += 1u64 << (max - len);
        }

        if kraft != 1u64 << max {
            return Err(PressError::internal(format!(
                "code lengths violate Kraft equality ({} / {})",
                kraft,
                1u64 << max
            )));
        }
        Ok(())
    }

    /// Assign canonical, bit-reversed codes from the leaf lengths.
    fn gen_codes(&mut self) {
        let mut next_code = [0u16; MAX_BITS as usize + 1];
        let mut code = 0u16;
        for bits in 1..=MAX_BITS as usize {
            code = (code + self.bl_count[bits - 1]) << 1;
            next_code[bits] = code;
        }

        for n in 0..self.desc.elems {
            let len = if n <= self.max_code { self.node_len[n] } else { 0 };
            self.codes[n] = if len == 0 {
                Code::default()
            } else {
                let c = next_code[len as usize];
                next_code[len as usize] += 1;
                Code {
                    code: reverse_bits(c, len),
                    len,
                }
            };
        }
    }
}

/// Build canonical, bit-reversed codes from a list of code lengths.
pub fn canonical_codes(lengths: &[u8]) -> Vec<Code> {
    let mut bl_count = [0u16; MAX_BITS as usize + 1];
    for &len in lengths {
        if len > 0 {
            bl_count[len as usize] += 1;
        }
    }

    let mut next_code = [0u16; MAX_BITS as usize + 1];
    let mut code = 0u16;
    for bits in 1..=MAX_BITS as usize {
        code = (code + bl_count[bits - 1]) << 1;
        next_code[bits] = code;
    }

    lengths
        .iter()
        .map(|&len| {
            if len == 0 {
                Code::default()
            } else {
                let c = next_code[len as usize];
                next_code[len as usize] += 1;
                Code {
                    code: reverse_bits(c, len),
                    len,
                }
            }
        })
        .collect()
}

/// Reverse the low `length` bits of `value`.
#[inline]
pub fn reverse_bits(value: u16, length: u8) -> u16 {
    debug_assert!((1..=16).contains(&length));
    value.reverse_bits() >> (16 - length)
}
