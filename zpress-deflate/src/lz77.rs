//! Hash-chain LZ77 matcher for DEFLATE.
//!
//! The matcher owns a window of twice the configured window size. New input
//! is appended after the current position; once the position crosses into
//! the upper half far enough, the upper half is copied down and every stored
//! position is rebased.
//!
//! Strings of three bytes are hashed with a rolling hash. `head` maps a hash
//! to the most recent position with that hash, `prev` links each position to
//! the previous one with the same hash, restricted to the last window of
//! positions. Position 0 doubles as the end-of-chain marker, so it is never
//! offered as a match.

use crate::config::{DeflateConfig, Tuning};
use crate::tables::{MAX_MATCH, MIN_MATCH};
use tracing::trace;
use zpress_core::checksum::Adler32;

/// Minimum lookahead before matching, except when flushing: room for a
/// maximal match plus the next string to hash.
pub const MIN_LOOKAHEAD: usize = MAX_MATCH + MIN_MATCH + 1;

/// Matches of exactly `MIN_MATCH` bytes further back than this are dropped.
pub const TOO_FAR: usize = 4096;

/// Under [`Strategy::Filtered`](crate::config::Strategy::Filtered), matches
/// of this length or shorter are dropped.
pub const FILTERED_CUTOFF: usize = 5;

/// End of a hash chain.
const NIL: u16 = 0;

/// A token produced by the matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// A literal byte.
    Literal(u8),
    /// A back-reference to previously seen data.
    Match {
        /// Number of bytes to copy (3-258).
        length: u16,
        /// Distance back into the window (1-32768).
        distance: u16,
    },
}

/// Pull source over a caller-provided input slice.
#[derive(Debug)]
pub struct Input<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Input<'a> {
    /// Wrap a slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether everything has been read.
    pub fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Bytes read so far.
    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// Copy as much as fits into `buf`.
    pub fn read(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }
}

/// Sliding window with hash chains.
#[derive(Debug, Clone)]
pub struct MatchFinder {
    /// Twice the window size; input is appended at `strstart + lookahead`.
    pub(crate) window: Vec<u8>,
    w_size: usize,
    w_mask: usize,
    /// Previous position with the same hash, indexed by `pos & w_mask`.
    prev: Vec<u16>,
    /// Most recent position for each hash.
    head: Vec<u16>,
    ins_h: u32,
    hash_mask: u32,
    hash_shift: u32,

    /// Start of the string to encode next.
    pub(crate) strstart: usize,
    /// Valid bytes from `strstart` onwards.
    pub(crate) lookahead: usize,
    /// Window offset where the current block starts. Negative once the
    /// block's first bytes have been slid out of the window.
    pub(crate) block_start: isize,
    /// Start of the last match found by [`longest_match`](Self::longest_match).
    pub(crate) match_start: usize,
    /// Strings before `strstart` still waiting to be hashed.
    pub(crate) insert: usize,

    /// Length of the current match.
    pub(crate) match_length: usize,
    /// Length of the match at the previous position (lazy matching).
    pub(crate) prev_length: usize,
    /// Start of the match at the previous position.
    pub(crate) prev_match: usize,
    /// A literal for the previous position is waiting to be emitted.
    pub(crate) match_available: bool,

    tuning: Tuning,
}

impl MatchFinder {
    /// Allocate a matcher for `config`. The config must already be validated.
    pub fn new(config: &DeflateConfig) -> Self {
        let w_size = config.window_size();
        let hash_size = 1usize << config.hash_bits();
        let mut finder = Self {
            window: vec![0; 2 * w_size],
            w_size,
            w_mask: w_size - 1,
            prev: vec![NIL; w_size],
            head: vec![NIL; hash_size],
            ins_h: 0,
            hash_mask: (hash_size - 1) as u32,
            hash_shift: (config.hash_bits() + MIN_MATCH as u32 - 1) / MIN_MATCH as u32,
            strstart: 0,
            lookahead: 0,
            block_start: 0,
            match_start: 0,
            insert: 0,
            match_length: MIN_MATCH - 1,
            prev_length: MIN_MATCH - 1,
            prev_match: 0,
            match_available: false,
            tuning: config.tuning(),
        };
        finder.reset();
        finder
    }

    /// Forget all history and positions.
    pub fn reset(&mut self) {
        self.clear_hash();
        self.strstart = 0;
        self.block_start = 0;
        self.lookahead = 0;
        self.insert = 0;
        self.match_start = 0;
        self.match_length = MIN_MATCH - 1;
        self.prev_length = MIN_MATCH - 1;
        self.prev_match = 0;
        self.match_available = false;
        self.ins_h = 0;
    }

    /// Empty every hash chain. Later searches cannot reach earlier data.
    pub fn clear_hash(&mut self) {
        self.head.fill(NIL);
    }

    /// Window size in bytes.
    pub fn window_size(&self) -> usize {
        self.w_size
    }

    /// Largest distance a match may have.
    #[inline]
    pub fn max_dist(&self) -> usize {
        self.w_size - MIN_LOOKAHEAD
    }

    /// Tuning in effect.
    pub fn tuning(&self) -> &Tuning {
        &self.tuning
    }

    #[inline]
    fn update_hash(&self, h: u32, c: u8) -> u32 {
        ((h << self.hash_shift) ^ u32::from(c)) & self.hash_mask
    }

    /// Hash the string at `pos`, link it into its chain and return the
    /// previous chain head (0 when the chain was empty).
    ///
    /// The rolling hash must already cover `pos` and `pos + 1`.
    #[inline]
    pub fn insert_string(&mut self, pos: usize) -> usize {
        self.ins_h = self.update_hash(self.ins_h, self.window[pos + MIN_MATCH - 1]);
        let h = self.ins_h as usize;
        let head = self.head[h];
        self.prev[pos & self.w_mask] = head;
        self.head[h] = pos as u16;
        usize::from(head)
    }

    /// Restart the rolling hash at `pos` without inserting anything.
    #[inline]
    pub fn rehash_at(&mut self, pos: usize) {
        let byte_at = |i: usize| self.window.get(i).copied().unwrap_or(0);
        let h = u32::from(byte_at(pos));
        self.ins_h = self.update_hash(h, byte_at(pos + 1));
    }

    /// Find the longest match for the string at `strstart`, walking the chain
    /// from `cur_match`.
    ///
    /// Returns a length no greater than the lookahead. If it exceeds
    /// `prev_length`, `match_start` holds the start of the match. Among
    /// candidates of equal length the most recent one wins.
    pub fn longest_match(&mut self, mut cur_match: usize) -> usize {
        let mut chain_length = usize::from(self.tuning.max_chain);
        let scan = self.strstart;
        let mut best_len = self.prev_length;
        let mut nice_match = usize::from(self.tuning.nice_length);
        let limit = scan.saturating_sub(self.max_dist());

        if self.prev_length >= usize::from(self.tuning.good_length) {
            chain_length >>= 2;
        }
        nice_match = nice_match.min(self.lookahead);

        let max_len = MAX_MATCH.min(self.lookahead);
        if best_len >= max_len {
            return best_len.min(self.lookahead);
        }

        let window = &self.window;
        loop {
            let m = cur_match;
            // Cheap rejection: the candidate must extend past best_len and
            // agree on its first two bytes.
            if window[m + best_len] == window[scan + best_len]
                && window[m + best_len - 1] == window[scan + best_len - 1]
                && window[m] == window[scan]
                && window[m + 1] == window[scan + 1]
            {
                let len = 2 + window[m + 2..m + max_len]
                    .iter()
                    .zip(&window[scan + 2..scan + max_len])
                    .take_while(|(a, b)| a == b)
                    .count();

                if len > best_len {
                    self.match_start = cur_match;
                    best_len = len;
                    if len >= nice_match {
                        break;
                    }
                }
            }

            cur_match = usize::from(self.prev[cur_match & self.w_mask]);
            if cur_match <= limit || chain_length <= 1 {
                break;
            }
            chain_length -= 1;
        }

        best_len.min(self.lookahead)
    }

    /// Length of the run of bytes equal to the one before `strstart`, capped
    /// at the lookahead and at `MAX_MATCH`. Used by the RLE strategy.
    pub fn run_length(&self) -> usize {
        if self.lookahead < MIN_MATCH || self.strstart == 0 {
            return 0;
        }
        let byte = self.window[self.strstart - 1];
        let max = MAX_MATCH.min(self.lookahead);
        self.window[self.strstart..self.strstart + max]
            .iter()
            .take_while(|&&b| b == byte)
            .count()
    }

    /// Refill the lookahead from `input`.
    ///
    /// Slides the window when `strstart` gets too close to its end, then
    /// reads until the lookahead reaches [`MIN_LOOKAHEAD`] or the input runs
    /// dry. Bytes read are fed to `checksum` in order. Strings held back by
    /// the previous call are hashed once enough bytes follow them.
    ///
    /// Returns the number of bytes read.
    pub fn fill_window(&mut self, input: &mut Input<'_>, mut checksum: Option<&mut Adler32>) -> usize {
        let window_size = self.window.len();
        let mut total = 0;

        loop {
            let mut more = window_size - self.lookahead - self.strstart;

            if self.strstart >= self.w_size + self.max_dist() {
                self.slide();
                more += self.w_size;
            }

            if input.is_empty() {
                break;
            }

            let start = self.strstart + self.lookahead;
            let n = input.read(&mut self.window[start..start + more]);
            if let Some(adler) = checksum.as_deref_mut() {
                adler.update(&self.window[start..start + n]);
            }
            total += n;
            self.lookahead += n;

            if self.lookahead + self.insert >= MIN_MATCH {
                let mut pos = self.strstart - self.insert;
                self.rehash_at(pos);
                while self.insert > 0 {
                    self.insert_string(pos);
                    pos += 1;
                    self.insert -= 1;
                    if self.lookahead + self.insert < MIN_MATCH {
                        break;
                    }
                }
            }

            if self.lookahead >= MIN_LOOKAHEAD || input.is_empty() {
                break;
            }
        }

        total
    }

    /// Move the upper half of the window down and rebase all positions.
    fn slide(&mut self) {
        let w_size = self.w_size;
        self.window.copy_within(w_size..2 * w_size, 0);
        // A deferred match may start just below the slid half; let it wrap
        // so distances computed from it stay exact.
        self.match_start = self.match_start.wrapping_sub(w_size);
        self.strstart -= w_size;
        self.block_start -= w_size as isize;
        self.insert = self.insert.min(self.strstart);

        let w = w_size as u16;
        for entry in self.head.iter_mut().chain(self.prev.iter_mut()) {
            *entry = if *entry >= w { *entry - w } else { NIL };
        }

        trace!(
            "slid window by {w_size}, strstart={}, block_start={}",
            self.strstart, self.block_start
        );
    }

    /// Load a preset dictionary into the window and hash chains.
    ///
    /// Only the last window's worth of a long dictionary is kept. The
    /// dictionary becomes history: it is not part of any block.
    pub fn load_dictionary(&mut self, dictionary: &[u8]) {
        let mut dict = dictionary;
        if dict.len() >= self.w_size {
            self.clear_hash();
            self.strstart = 0;
            self.block_start = 0;
            self.insert = 0;
            dict = &dict[dict.len() - self.w_size..];
        }

        let mut input = Input::new(dict);
        self.fill_window(&mut input, None);
        while self.lookahead >= MIN_MATCH {
            let mut pos = self.strstart;
            for _ in 0..self.lookahead - (MIN_MATCH - 1) {
                self.insert_string(pos);
                pos += 1;
            }
            self.strstart = pos;
            self.lookahead = MIN_MATCH - 1;
            self.fill_window(&mut input, None);
        }

        self.strstart += self.lookahead;
        self.block_start = self.strstart as isize;
        self.insert = self.lookahead;
        self.lookahead = 0;
        self.match_length = MIN_MATCH - 1;
        self.prev_length = MIN_MATCH - 1;
        self.match_available = false;
    }

    /// Bytes of the current block, if they are all still in the window.
    pub fn block_bytes(&self) -> Option<&[u8]> {
        usize::try_from(self.block_start)
            .ok()
            .map(|start| &self.window[start..self.strstart])
    }

    /// Length of the current block in bytes.
    pub fn block_len(&self) -> usize {
        (self.strstart as isize - self.block_start) as usize
    }
}
