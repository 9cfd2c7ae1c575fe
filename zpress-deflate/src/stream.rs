//! Streaming zlib / raw DEFLATE compressor.
//!
//! [`Deflater`] is a push-pull state machine. Each call to
//! [`deflate`](Deflater::deflate) takes an input slice, an output slice and a
//! [`FlushMode`], pulls as much input into the window as it can use, and
//! delivers compressed bytes into the output slice. Bytes that do not fit
//! stay pending inside the compressor and go out first on the next call.
//!
//! # States
//!
//! ```text
//!   Init ──first deflate──▶ Busy ──FlushMode::Finish──▶ Finish
//!     ▲                                                    │
//!     └──────────────────────── reset() ───────────────────┘
//! ```
//!
//! The zlib header is written on the Init to Busy transition. The final block
//! and the Adler-32 trailer are written under `FlushMode::Finish`; once the
//! trailer has been delivered the call reports [`CompressStatus::Done`].

use crate::block::{BlockEncoder, BlockStats};
use crate::config::{CompressFunc, DeflateConfig, Format, Strategy};
use crate::lz77::{FILTERED_CUTOFF, Input, MIN_LOOKAHEAD, MatchFinder, TOO_FAR};
use crate::tables::{MAX_MATCH, MAX_STORED, MIN_MATCH};
use tracing::{debug, error};
use zpress_core::bitstream::BitWriter;
use zpress_core::checksum::Adler32;
use zpress_core::error::{PressError, Result};
use zpress_core::traits::{CompressStatus, Compressor, FlushMode};

/// Compression method "deflate" in the zlib header.
const Z_DEFLATED: u16 = 8;

/// FDICT bit of the zlib header.
const PRESET_DICT: u16 = 0x20;

/// Lifecycle state of a [`Deflater`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Nothing written yet.
    Init,
    /// Header written, accepting input.
    Busy,
    /// Final block written; only the trailer and pending bytes remain.
    Finish,
}

/// Outcome of one run of a compression loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    /// Input exhausted or output full.
    NeedMore,
    /// The requested flush has been carried out.
    BlockDone,
    /// The final block is written but not fully delivered.
    FinishStarted,
    /// The final block is written and delivered.
    FinishDone,
}

/// Caller's output slice and how much of it is used.
struct Output<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl Output<'_> {
    fn is_full(&self) -> bool {
        self.pos == self.buf.len()
    }
}

/// Streaming DEFLATE compressor with optional zlib framing.
///
/// # Example
///
/// ```
/// use zpress_core::{CompressStatus, FlushMode};
/// use zpress_deflate::{DeflateConfig, Deflater};
///
/// let mut deflater = Deflater::new(DeflateConfig::new(6)).unwrap();
/// let mut out = vec![0u8; 256];
/// let (consumed, produced, status) = deflater
///     .deflate(b"hello hello hello", &mut out, FlushMode::Finish)
///     .unwrap();
/// assert_eq!(consumed, 17);
/// assert_eq!(status, CompressStatus::Done);
/// assert_eq!(&out[..2], &[0x78, 0x9C]);
/// assert!(produced > 6);
/// ```
#[derive(Debug, Clone)]
pub struct Deflater {
    config: DeflateConfig,
    state: StreamState,
    matcher: MatchFinder,
    blocks: BlockEncoder,
    writer: BitWriter,
    adler: Adler32,
    /// Running checksum of the preset dictionary, if one was set.
    dictionary: Option<Adler32>,
    total_in: u64,
    total_out: u64,
    /// Strongest flush carried out since the last data was compressed.
    last_flush: Option<FlushMode>,
    trailer_written: bool,
    /// Message of the internal error that poisoned this instance.
    poisoned: Option<String>,
}

impl Deflater {
    /// Create a compressor. Fails without allocating if the configuration is
    /// out of range.
    pub fn new(config: DeflateConfig) -> Result<Self> {
        config.validate()?;

        let matcher = MatchFinder::new(&config);
        let blocks = BlockEncoder::new(
            config.lit_bufsize(),
            config.level,
            config.strategy,
            matcher.max_dist(),
        );

        debug!(
            "deflater created: level={} window_bits={} mem_level={} strategy={:?} format={:?}",
            config.level, config.window_bits, config.mem_level, config.strategy, config.format
        );

        Ok(Self {
            config,
            state: StreamState::Init,
            matcher,
            blocks,
            writer: BitWriter::with_capacity(config.lit_bufsize() * 4),
            adler: Adler32::new(),
            dictionary: None,
            total_in: 0,
            total_out: 0,
            last_flush: None,
            trailer_written: false,
            poisoned: None,
        })
    }

    /// Configuration in effect.
    pub fn config(&self) -> &DeflateConfig {
        &self.config
    }

    /// Current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Total input bytes consumed.
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Total compressed bytes delivered.
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Adler-32 of the input consumed so far (1 for raw streams).
    pub fn adler(&self) -> u32 {
        self.adler.finish()
    }

    /// Number of blocks written with each encoding.
    pub fn block_stats(&self) -> BlockStats {
        self.blocks.stats()
    }

    /// Whether an internal error has made this instance unusable.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned.is_some()
    }

    /// Upper bound on the compressed size of `source_len` bytes compressed in
    /// a single `Finish` call, including header and trailer.
    pub fn deflate_bound(&self, source_len: usize) -> usize {
        let wrap_len = match self.config.format {
            Format::Raw => 0,
            Format::Zlib if self.dictionary.is_some() => 10,
            Format::Zlib => 6,
        };

        let default_params = self.config.window_bits == 15 && self.config.hash_bits() == 15;
        if default_params {
            return source_len
                + (source_len >> 12)
                + (source_len >> 14)
                + (source_len >> 25)
                + 7
                + wrap_len;
        }

        let fixed_len =
            source_len + (source_len >> 3) + (source_len >> 8) + (source_len >> 9) + 4;
        let stored_len =
            source_len + (source_len >> 5) + (source_len >> 7) + (source_len >> 11) + 7;
        let bound = if u32::from(self.config.window_bits) <= self.config.hash_bits()
            && self.config.level > 0
        {
            fixed_len
        } else {
            stored_len
        };
        bound + wrap_len
    }

    /// Load a preset dictionary.
    ///
    /// Zlib streams accept a dictionary only before the first call to
    /// [`deflate`](Self::deflate); its Adler-32 goes into the header and the
    /// decoder must supply the same bytes. Raw streams accept one whenever no
    /// input is waiting in the window or in an unwritten block. Returns the dictionary's Adler-32.
    pub fn set_dictionary(&mut self, dictionary: &[u8]) -> Result<u32> {
        self.check_poisoned()?;
        if self.state == StreamState::Finish {
            return Err(PressError::StreamFinished);
        }
        if self.config.format == Format::Zlib && self.state != StreamState::Init {
            return Err(PressError::dictionary_not_allowed(
                "zlib streams take a dictionary only before the first deflate call",
            ));
        }
        if self.matcher.lookahead != 0 || !self.blocks.is_empty() {
            return Err(PressError::dictionary_not_allowed(
                "buffered input has not been compressed yet",
            ));
        }

        let id = match self.config.format {
            Format::Zlib => {
                let running = self.dictionary.get_or_insert_with(Adler32::new);
                running.update(dictionary);
                running.finish()
            }
            Format::Raw => Adler32::checksum(dictionary),
        };
        self.matcher.load_dictionary(dictionary);

        debug!("loaded {} byte dictionary, id {id:#010x}", dictionary.len());
        Ok(id)
    }

    /// Return to the initial state, keeping the configuration.
    ///
    /// A poisoned instance stays poisoned.
    pub fn reset(&mut self) {
        self.state = StreamState::Init;
        self.matcher.reset();
        self.blocks.reset();
        self.writer.reset();
        self.adler = Adler32::new();
        self.dictionary = None;
        self.total_in = 0;
        self.total_out = 0;
        self.last_flush = None;
        self.trailer_written = false;
        debug!("deflater reset");
    }

    /// Compress from `input` into `output`.
    ///
    /// Returns `(consumed, produced, status)`. Input that is not consumed
    /// must be offered again on the next call. After `FlushMode::Finish`
    /// keep calling with `Finish` until the status is
    /// [`CompressStatus::Done`].
    pub fn deflate(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<(usize, usize, CompressStatus)> {
        self.check_poisoned()?;
        if self.state == StreamState::Finish && (!input.is_empty() || flush != FlushMode::Finish) {
            return Err(PressError::StreamFinished);
        }

        let mut input = Input::new(input);
        let mut out = Output {
            buf: output,
            pos: 0,
        };

        match self.run(&mut input, &mut out, flush) {
            Ok(status) => Ok((input.consumed(), out.pos, status)),
            Err(err) => {
                if let PressError::Internal { message } = &err {
                    error!("deflater poisoned: {message}");
                    self.poisoned = Some(message.clone());
                }
                Err(err)
            }
        }
    }

    fn check_poisoned(&self) -> Result<()> {
        match &self.poisoned {
            Some(message) => Err(PressError::internal(message.clone())),
            None => Ok(()),
        }
    }

    fn run(
        &mut self,
        input: &mut Input<'_>,
        out: &mut Output<'_>,
        flush: FlushMode,
    ) -> Result<CompressStatus> {
        let old_flush = self.last_flush;

        // Deliver what the previous call left behind first.
        if !self.writer.is_drained() {
            self.flush_pending(out);
            if !self.writer.is_drained() {
                return Ok(CompressStatus::NeedsOutput);
            }
        }

        // A repeated flush with nothing new to compress has no effect.
        if input.is_empty()
            && self.matcher.lookahead == 0
            && flush != FlushMode::Finish
            && old_flush.is_some_and(|done| flush <= done)
        {
            return Ok(CompressStatus::NeedsInput);
        }

        if self.state == StreamState::Init {
            if self.config.format == Format::Zlib {
                self.write_header();
            }
            self.state = StreamState::Busy;
            self.flush_pending(out);
            if !self.writer.is_drained() {
                self.last_flush = None;
                return Ok(CompressStatus::NeedsOutput);
            }
        }

        let has_work = !input.is_empty()
            || self.matcher.lookahead != 0
            || (flush != FlushMode::None && self.state != StreamState::Finish);

        if has_work {
            let bstate = self.compress_blocks(input, out, flush)?;

            if matches!(bstate, BlockState::FinishStarted | BlockState::FinishDone) {
                self.state = StreamState::Finish;
            }

            match bstate {
                BlockState::NeedMore => {
                    self.last_flush = None;
                    return Ok(self.pending_status(out));
                }
                BlockState::FinishStarted => {
                    self.last_flush = Some(FlushMode::Finish);
                    return Ok(CompressStatus::NeedsOutput);
                }
                BlockState::BlockDone => {
                    self.emit_flush_marker(flush);
                    self.last_flush = Some(flush);
                    self.flush_pending(out);
                    if !self.writer.is_drained() {
                        return Ok(CompressStatus::NeedsOutput);
                    }
                }
                BlockState::FinishDone => {
                    self.last_flush = Some(FlushMode::Finish);
                }
            }
        }

        if flush != FlushMode::Finish {
            return Ok(self.pending_status(out));
        }

        if self.config.format == Format::Zlib && !self.trailer_written {
            self.writer.put_u32_msb(self.adler.finish());
            self.trailer_written = true;
            self.flush_pending(out);
        }

        if self.writer.is_drained() {
            debug!(
                "stream finished: {} bytes in, {} bytes out, adler {:#010x}",
                self.total_in,
                self.total_out,
                self.adler.finish()
            );
            Ok(CompressStatus::Done)
        } else {
            Ok(CompressStatus::NeedsOutput)
        }
    }

    fn pending_status(&self, out: &Output<'_>) -> CompressStatus {
        if !self.writer.is_drained() || out.is_full() {
            CompressStatus::NeedsOutput
        } else {
            CompressStatus::NeedsInput
        }
    }

    /// Close a sync, full or partial flush once its data blocks are out.
    fn emit_flush_marker(&mut self, flush: FlushMode) {
        match flush {
            FlushMode::Partial => self.blocks.align(&mut self.writer),
            FlushMode::Sync | FlushMode::Full => {
                self.blocks.empty_stored_block(&mut self.writer, false);
                if flush == FlushMode::Full {
                    self.matcher.clear_hash();
                    if self.matcher.lookahead == 0 {
                        self.matcher.strstart = 0;
                        self.matcher.block_start = 0;
                        self.matcher.insert = 0;
                    }
                    debug!("full flush after {} bytes in", self.total_in);
                }
            }
            FlushMode::None | FlushMode::Finish => {}
        }
    }

    fn write_header(&mut self) {
        let level = self.config.level;
        let level_flags: u16 = if matches!(self.config.strategy, Strategy::HuffmanOnly | Strategy::Rle)
            || level < 2
        {
            0
        } else if level < 6 {
            1
        } else if level == 6 {
            2
        } else {
            3
        };

        let mut header = (Z_DEFLATED + ((u16::from(self.config.window_bits) - 8) << 4)) << 8;
        header |= level_flags << 6;
        if self.dictionary.is_some() {
            header |= PRESET_DICT;
        }
        header += 31 - header % 31;

        self.writer.put_u16_msb(header);
        if let Some(dictionary) = &self.dictionary {
            self.writer.put_u32_msb(dictionary.finish());
        }
        self.adler = Adler32::new();

        debug!("wrote zlib header {header:#06x}");
    }

    /// Move pending bytes into the caller's output.
    fn flush_pending(&mut self, out: &mut Output<'_>) {
        let n = self.writer.drain_into(&mut out.buf[out.pos..]);
        out.pos += n;
        self.total_out += n as u64;
    }

    fn fill_window(&mut self, input: &mut Input<'_>) {
        let checksum = match self.config.format {
            Format::Zlib => Some(&mut self.adler),
            Format::Raw => None,
        };
        let n = self.matcher.fill_window(input, checksum);
        self.total_in += n as u64;
    }

    fn compress_blocks(
        &mut self,
        input: &mut Input<'_>,
        out: &mut Output<'_>,
        flush: FlushMode,
    ) -> Result<BlockState> {
        if self.config.level == 0 {
            return self.deflate_stored(input, out, flush);
        }
        match self.config.strategy {
            Strategy::HuffmanOnly => self.deflate_huff(input, out, flush),
            Strategy::Rle => self.deflate_rle(input, out, flush),
            _ => match self.matcher.tuning().func {
                CompressFunc::Stored => self.deflate_stored(input, out, flush),
                CompressFunc::Fast => self.deflate_fast(input, out, flush),
                CompressFunc::Slow => self.deflate_slow(input, out, flush),
            },
        }
    }

    /// Write the current block and mark the start of the next one.
    fn flush_block_only(&mut self, out: &mut Output<'_>, last: bool) -> Result<()> {
        let stored_len = self.matcher.block_len();
        let block = self.matcher.block_bytes();
        self.blocks
            .flush_block(&mut self.writer, block, stored_len, last)?;
        self.matcher.block_start = self.matcher.strstart as isize;
        self.flush_pending(out);
        Ok(())
    }

    /// Write the current block. Returns the state to stop with when the
    /// output is full.
    fn flush_block(&mut self, out: &mut Output<'_>, last: bool) -> Result<Option<BlockState>> {
        self.flush_block_only(out, last)?;
        if out.is_full() {
            Ok(Some(if last {
                BlockState::FinishStarted
            } else {
                BlockState::NeedMore
            }))
        } else {
            Ok(None)
        }
    }

    /// Shared tail of the compression loops once the lookahead is empty.
    fn finish_blocks(&mut self, out: &mut Output<'_>, flush: FlushMode) -> Result<BlockState> {
        if flush == FlushMode::Finish && self.total_in == 0 && self.blocks.is_empty() {
            // Nothing was ever compressed: close with a final empty stored block.
            self.blocks.empty_stored_block(&mut self.writer, true);
            self.matcher.block_start = self.matcher.strstart as isize;
            self.flush_pending(out);
            return Ok(if out.is_full() {
                BlockState::FinishStarted
            } else {
                BlockState::FinishDone
            });
        }
        if flush == FlushMode::Finish {
            if let Some(state) = self.flush_block(out, true)? {
                return Ok(state);
            }
            return Ok(BlockState::FinishDone);
        }
        if !self.blocks.is_empty() {
            if let Some(state) = self.flush_block(out, false)? {
                return Ok(state);
            }
        }
        Ok(BlockState::BlockDone)
    }

    /// Level 0: copy input into stored blocks.
    fn deflate_stored(
        &mut self,
        input: &mut Input<'_>,
        out: &mut Output<'_>,
        flush: FlushMode,
    ) -> Result<BlockState> {
        let max_block_size = MAX_STORED.min(self.config.lit_bufsize() * 4 - 5) as isize;

        loop {
            if self.matcher.lookahead <= 1 {
                self.fill_window(input);
                if self.matcher.lookahead == 0 {
                    if flush == FlushMode::None {
                        return Ok(BlockState::NeedMore);
                    }
                    break;
                }
            }

            let m = &mut self.matcher;
            m.strstart += m.lookahead;
            m.lookahead = 0;

            let max_start = m.block_start + max_block_size;
            if m.strstart as isize >= max_start {
                m.lookahead = (m.strstart as isize - max_start) as usize;
                m.strstart = max_start as usize;
                if let Some(state) = self.flush_block(out, false)? {
                    return Ok(state);
                }
            }

            // Flush before the block's bytes can be slid out of the window.
            if self.matcher.block_len() >= self.matcher.max_dist() {
                if let Some(state) = self.flush_block(out, false)? {
                    return Ok(state);
                }
            }
        }

        self.matcher.insert = 0;
        if flush == FlushMode::Finish {
            if let Some(state) = self.flush_block(out, true)? {
                return Ok(state);
            }
            return Ok(BlockState::FinishDone);
        }
        if self.matcher.block_len() > 0 {
            if let Some(state) = self.flush_block(out, false)? {
                return Ok(state);
            }
        }
        Ok(BlockState::BlockDone)
    }

    /// Levels 1-3: take the longest match at each position, no lazy search.
    fn deflate_fast(
        &mut self,
        input: &mut Input<'_>,
        out: &mut Output<'_>,
        flush: FlushMode,
    ) -> Result<BlockState> {
        loop {
            if self.matcher.lookahead < MIN_LOOKAHEAD {
                self.fill_window(input);
                if self.matcher.lookahead < MIN_LOOKAHEAD && flush == FlushMode::None {
                    return Ok(BlockState::NeedMore);
                }
                if self.matcher.lookahead == 0 {
                    break;
                }
            }

            let m = &mut self.matcher;
            let mut hash_head = 0;
            if m.lookahead >= MIN_MATCH {
                hash_head = m.insert_string(m.strstart);
            }
            if hash_head != 0 && m.strstart - hash_head <= m.max_dist() {
                m.match_length = m.longest_match(hash_head);
            }

            let block_full = if m.match_length >= MIN_MATCH {
                let full = self
                    .blocks
                    .tally_dist(m.strstart - m.match_start, m.match_length)?;
                m.lookahead -= m.match_length;

                // Hash the strings inside short matches only.
                if m.match_length <= usize::from(m.tuning().max_lazy) && m.lookahead >= MIN_MATCH {
                    m.match_length -= 1;
                    while m.match_length != 0 {
                        m.strstart += 1;
                        m.insert_string(m.strstart);
                        m.match_length -= 1;
                    }
                    m.strstart += 1;
                } else {
                    m.strstart += m.match_length;
                    m.match_length = 0;
                    m.rehash_at(m.strstart);
                }
                full
            } else {
                let full = self.blocks.tally_lit(m.window[m.strstart]);
                m.lookahead -= 1;
                m.strstart += 1;
                full
            };

            if block_full {
                if let Some(state) = self.flush_block(out, false)? {
                    return Ok(state);
                }
            }
        }

        self.matcher.insert = self.matcher.strstart.min(MIN_MATCH - 1);
        self.finish_blocks(out, flush)
    }

    /// Levels 4-9: lazy matching. A match is only taken if the next position
    /// does not start a longer one.
    fn deflate_slow(
        &mut self,
        input: &mut Input<'_>,
        out: &mut Output<'_>,
        flush: FlushMode,
    ) -> Result<BlockState> {
        let filtered = self.config.strategy == Strategy::Filtered;

        loop {
            if self.matcher.lookahead < MIN_LOOKAHEAD {
                self.fill_window(input);
                if self.matcher.lookahead < MIN_LOOKAHEAD && flush == FlushMode::None {
                    return Ok(BlockState::NeedMore);
                }
                if self.matcher.lookahead == 0 {
                    break;
                }
            }

            let m = &mut self.matcher;
            let mut hash_head = 0;
            if m.lookahead >= MIN_MATCH {
                hash_head = m.insert_string(m.strstart);
            }

            m.prev_length = m.match_length;
            m.prev_match = m.match_start;
            m.match_length = MIN_MATCH - 1;

            if hash_head != 0
                && m.prev_length < usize::from(m.tuning().max_lazy)
                && m.strstart - hash_head <= m.max_dist()
            {
                m.match_length = m.longest_match(hash_head);

                let distance = m.strstart.wrapping_sub(m.match_start);
                if m.match_length <= FILTERED_CUTOFF
                    && (filtered || (m.match_length == MIN_MATCH && distance > TOO_FAR))
                {
                    m.match_length = MIN_MATCH - 1;
                }
            }

            if m.prev_length >= MIN_MATCH && m.match_length <= m.prev_length {
                // The match at the previous position wins; emit it.
                let max_insert = m.strstart + m.lookahead - MIN_MATCH;
                let block_full = self
                    .blocks
                    .tally_dist((m.strstart - 1).wrapping_sub(m.prev_match), m.prev_length)?;

                // Hash the strings it covers. strstart-1 is already in.
                m.lookahead -= m.prev_length - 1;
                for _ in 0..m.prev_length - 2 {
                    m.strstart += 1;
                    if m.strstart <= max_insert {
                        m.insert_string(m.strstart);
                    }
                }
                m.prev_length = 0;
                m.match_available = false;
                m.match_length = MIN_MATCH - 1;
                m.strstart += 1;

                if block_full {
                    if let Some(state) = self.flush_block(out, false)? {
                        return Ok(state);
                    }
                }
            } else if m.match_available {
                // No better match here: emit the previous byte as a literal.
                let block_full = self.blocks.tally_lit(m.window[m.strstart - 1]);
                if block_full {
                    self.flush_block_only(out, false)?;
                }
                self.matcher.strstart += 1;
                self.matcher.lookahead -= 1;
                if out.is_full() {
                    return Ok(BlockState::NeedMore);
                }
            } else {
                // Defer the decision to the next position.
                m.match_available = true;
                m.strstart += 1;
                m.lookahead -= 1;
            }
        }

        if self.matcher.match_available {
            let byte = self.matcher.window[self.matcher.strstart - 1];
            self.blocks.tally_lit(byte);
            self.matcher.match_available = false;
        }
        self.matcher.insert = self.matcher.strstart.min(MIN_MATCH - 1);
        self.finish_blocks(out, flush)
    }

    /// `Strategy::Rle`: only look for runs at distance 1.
    fn deflate_rle(
        &mut self,
        input: &mut Input<'_>,
        out: &mut Output<'_>,
        flush: FlushMode,
    ) -> Result<BlockState> {
        loop {
            if self.matcher.lookahead <= MAX_MATCH {
                self.fill_window(input);
                if self.matcher.lookahead <= MAX_MATCH && flush == FlushMode::None {
                    return Ok(BlockState::NeedMore);
                }
                if self.matcher.lookahead == 0 {
                    break;
                }
            }

            let m = &mut self.matcher;
            let run = m.run_length();
            let block_full = if run >= MIN_MATCH {
                let full = self.blocks.tally_dist(1, run)?;
                m.lookahead -= run;
                m.strstart += run;
                full
            } else {
                let full = self.blocks.tally_lit(m.window[m.strstart]);
                m.lookahead -= 1;
                m.strstart += 1;
                full
            };

            if block_full {
                if let Some(state) = self.flush_block(out, false)? {
                    return Ok(state);
                }
            }
        }

        self.matcher.insert = 0;
        self.finish_blocks(out, flush)
    }

    /// `Strategy::HuffmanOnly`: literals only.
    fn deflate_huff(
        &mut self,
        input: &mut Input<'_>,
        out: &mut Output<'_>,
        flush: FlushMode,
    ) -> Result<BlockState> {
        loop {
            if self.matcher.lookahead == 0 {
                self.fill_window(input);
                if self.matcher.lookahead == 0 {
                    if flush == FlushMode::None {
                        return Ok(BlockState::NeedMore);
                    }
                    break;
                }
            }

            let m = &mut self.matcher;
            let block_full = self.blocks.tally_lit(m.window[m.strstart]);
            m.lookahead -= 1;
            m.strstart += 1;

            if block_full {
                if let Some(state) = self.flush_block(out, false)? {
                    return Ok(state);
                }
            }
        }

        self.matcher.insert = 0;
        self.finish_blocks(out, flush)
    }
}

impl Compressor for Deflater {
    fn compress(
        &mut self,
        input: &[u8],
        output: &mut [u8],
        flush: FlushMode,
    ) -> Result<(usize, usize, CompressStatus)> {
        self.deflate(input, output, flush)
    }

    fn reset(&mut self) {
        Deflater::reset(self);
    }

    fn is_finished(&self) -> bool {
        self.state == StreamState::Finish && self.writer.is_drained()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lz77::Token;
    use proptest::prelude::{ProptestConfig, prop, prop_assert, prop_assert_eq, proptest};

    fn compress(config: DeflateConfig, data: &[u8]) -> Vec<u8> {
        let mut deflater = Deflater::new(config).unwrap();
        deflater.compress_all(data).unwrap()
    }

    /// Rebuild the bytes a token sequence stands for, or `None` if a match
    /// reaches back before the start.
    fn replay(tokens: &[Token]) -> Option<Vec<u8>> {
        let mut bytes = Vec::new();
        for token in tokens {
            match *token {
                Token::Literal(byte) => bytes.push(byte),
                Token::Match { length, distance } => {
                    let start = bytes.len().checked_sub(usize::from(distance))?;
                    for i in 0..usize::from(length) {
                        bytes.push(bytes[start + i]);
                    }
                }
            }
        }
        Some(bytes)
    }

    #[test]
    fn test_header_bytes_per_level() {
        let cases = [(0u8, 0x01u8), (1, 0x01), (2, 0x5E), (5, 0x5E), (6, 0x9C), (7, 0xDA), (9, 0xDA)];
        for (level, flg) in cases {
            let out = compress(DeflateConfig::new(level), b"abc");
            assert_eq!(out[0], 0x78, "level {level}");
            assert_eq!(out[1], flg, "level {level}");
            assert_eq!((u16::from(out[0]) << 8 | u16::from(out[1])) % 31, 0);
        }
    }

    #[test]
    fn test_header_window_bits_and_strategy() {
        let out = compress(DeflateConfig::default().with_window_bits(9), b"abc");
        assert_eq!(out[0] >> 4, 1);
        assert_eq!(out[0] & 0x0F, 8);

        let out = compress(
            DeflateConfig::default().with_strategy(Strategy::HuffmanOnly),
            b"abc",
        );
        assert_eq!(out[1] >> 6, 0);
    }

    #[test]
    fn test_empty_stream() {
        // Header, one final empty stored block, Adler-32 of nothing.
        for level in 0..=9 {
            let out = compress(DeflateConfig::new(level), b"");
            assert_eq!(&out[2..], [0x01, 0x00, 0x00, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x01], "level {level}");
        }
        let out = compress(DeflateConfig::default(), b"");
        assert_eq!(out[..2], [0x78, 0x9C]);
    }

    #[test]
    fn test_raw_format_has_no_framing() {
        let out = compress(DeflateConfig::default().with_format(Format::Raw), b"");
        assert_eq!(out, [0x01, 0x00, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_trailer_is_adler_of_input() {
        let data = b"The quick brown fox jumps over the lazy dog";
        let out = compress(DeflateConfig::default(), data);
        let trailer = u32::from_be_bytes(out[out.len() - 4..].try_into().unwrap());
        assert_eq!(trailer, Adler32::checksum(data));
    }

    #[test]
    fn test_tiny_output_buffer() {
        let data: Vec<u8> = b"tiny output buffers still work. ".repeat(50);
        let expected = compress(DeflateConfig::default(), &data);

        let mut deflater = Deflater::new(DeflateConfig::default()).unwrap();
        let mut result = Vec::new();
        let mut pos = 0;
        let mut buf = [0u8; 3];
        loop {
            let (consumed, produced, status) = deflater
                .deflate(&data[pos..], &mut buf, FlushMode::Finish)
                .unwrap();
            pos += consumed;
            result.extend_from_slice(&buf[..produced]);
            if status == CompressStatus::Done {
                break;
            }
        }
        assert_eq!(pos, data.len());
        assert_eq!(result, expected);
        assert_eq!(deflater.total_out(), result.len() as u64);
        assert_eq!(deflater.total_in(), data.len() as u64);
        assert!(deflater.is_finished());
    }

    #[test]
    fn test_use_after_finish_is_an_error() {
        let mut deflater = Deflater::new(DeflateConfig::default()).unwrap();
        let mut out = vec![0u8; 64];
        deflater.deflate(b"abc", &mut out, FlushMode::Finish).unwrap();

        assert!(matches!(
            deflater.deflate(b"more", &mut out, FlushMode::None),
            Err(PressError::StreamFinished)
        ));
        assert!(matches!(
            deflater.deflate(b"", &mut out, FlushMode::Sync),
            Err(PressError::StreamFinished)
        ));
        let (_, produced, status) = deflater.deflate(b"", &mut out, FlushMode::Finish).unwrap();
        assert_eq!(produced, 0);
        assert_eq!(status, CompressStatus::Done);

        deflater.reset();
        assert_eq!(deflater.state(), StreamState::Init);
        let (_, _, status) = deflater.deflate(b"abc", &mut out, FlushMode::Finish).unwrap();
        assert_eq!(status, CompressStatus::Done);
    }

    #[test]
    fn test_sync_flush_ends_with_marker() {
        let mut deflater = Deflater::new(DeflateConfig::default()).unwrap();
        let mut out = vec![0u8; 256];
        let (_, produced, status) = deflater
            .deflate(b"hello world", &mut out, FlushMode::Sync)
            .unwrap();
        assert_eq!(status, CompressStatus::NeedsInput);
        assert_eq!(&out[produced - 4..produced], &[0x00, 0x00, 0xFF, 0xFF]);

        // Repeating the flush without new input writes nothing.
        let (_, produced, _) = deflater.deflate(b"", &mut out, FlushMode::Sync).unwrap();
        assert_eq!(produced, 0);
    }

    #[test]
    fn test_no_flush_buffers_small_input() {
        let mut deflater = Deflater::new(DeflateConfig::default()).unwrap();
        let mut out = vec![0u8; 256];
        let (consumed, produced, status) =
            deflater.deflate(b"hello", &mut out, FlushMode::None).unwrap();
        assert_eq!(consumed, 5);
        // Only the header goes out.
        assert_eq!(produced, 2);
        assert_eq!(status, CompressStatus::NeedsInput);
        assert_eq!(deflater.state(), StreamState::Busy);
    }

    #[test]
    fn test_dictionary_sets_fdict() {
        let dict = b"a shared preset dictionary";
        let mut deflater = Deflater::new(DeflateConfig::default()).unwrap();
        let id = deflater.set_dictionary(dict).unwrap();
        assert_eq!(id, Adler32::checksum(dict));

        let out = deflater.compress_all(b"a shared preset dictionary, again").unwrap();
        assert_eq!(out[1] & 0x20, 0x20);
        assert_eq!((u16::from(out[0]) << 8 | u16::from(out[1])) % 31, 0);
        assert_eq!(u32::from_be_bytes(out[2..6].try_into().unwrap()), id);
    }

    #[test]
    fn test_dictionary_rejected_after_start() {
        let mut deflater = Deflater::new(DeflateConfig::default()).unwrap();
        let mut out = vec![0u8; 64];
        deflater.deflate(b"x", &mut out, FlushMode::None).unwrap();
        assert!(matches!(
            deflater.set_dictionary(b"late"),
            Err(PressError::DictionaryNotAllowed { .. })
        ));
    }

    #[test]
    fn test_raw_dictionary_rejected_with_buffered_block() {
        let config = DeflateConfig::default()
            .with_format(Format::Raw)
            .with_strategy(Strategy::HuffmanOnly);
        let mut deflater = Deflater::new(config).unwrap();
        let mut out = vec![0u8; 64];
        deflater.deflate(b"literals", &mut out, FlushMode::None).unwrap();
        assert_eq!(deflater.matcher.lookahead, 0);
        assert!(!deflater.blocks.is_empty());
        assert!(matches!(
            deflater.set_dictionary(b"late"),
            Err(PressError::DictionaryNotAllowed { .. })
        ));

        // Once the block is written the dictionary is accepted.
        deflater.deflate(b"", &mut out, FlushMode::Sync).unwrap();
        assert!(deflater.set_dictionary(b"late").is_ok());
    }

    #[test]
    fn test_lazy_match_defers_one_position() {
        // "abc" at 13 matches at distance 4; "bcdefgh" at 14 matches longer.
        let mut data = b"_bcdefgh-abc!abcdefgh".to_vec();
        data.extend((0..300u32).map(|i| (i % 200) as u8));
        let mut out = vec![0u8; 1024];

        let mut deflater = Deflater::new(DeflateConfig::new(6)).unwrap();
        deflater.deflate(&data, &mut out, FlushMode::None).unwrap();
        let tokens = deflater.blocks.tokens();
        assert!(tokens[..13].iter().all(|t| matches!(t, Token::Literal(_))));
        assert_eq!(tokens[13], Token::Literal(b'a'));
        assert_eq!(tokens[14], Token::Match { length: 7, distance: 13 });

        // Greedy matching takes the first match it sees.
        let mut deflater = Deflater::new(DeflateConfig::new(1)).unwrap();
        deflater.deflate(&data, &mut out, FlushMode::None).unwrap();
        let tokens = deflater.blocks.tokens();
        assert_eq!(tokens[13], Token::Match { length: 3, distance: 4 });
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(matches!(
            Deflater::new(DeflateConfig::new(12)),
            Err(PressError::InvalidLevel { level: 12 })
        ));
        assert!(Deflater::new(DeflateConfig::default().with_mem_level(10))
            .unwrap_err()
            .is_config());
    }

    #[test]
    fn test_deflate_bound_holds() {
        let data: Vec<u8> = (0..50_000u32)
            .map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8)
            .collect();
        for level in [0u8, 1, 6, 9] {
            for config in [
                DeflateConfig::new(level),
                DeflateConfig::new(level).with_window_bits(10).with_mem_level(2),
            ] {
                let mut deflater = Deflater::new(config).unwrap();
                let bound = deflater.deflate_bound(data.len());
                let out = deflater.compress_all(&data).unwrap();
                assert!(out.len() <= bound, "level {level}: {} > {bound}", out.len());
            }
        }
    }

    #[test]
    fn test_stats_count_blocks() {
        let mut deflater = Deflater::new(DeflateConfig::default()).unwrap();
        deflater.compress_all(&b"abcabcabc".repeat(100)).unwrap();
        let stats = deflater.block_stats();
        assert_eq!(stats.stored + stats.fixed + stats.dynamic, 1);
        assert_eq!(stats.longest_distance, 3);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_tokens_stay_in_bounds(
            words in prop::collection::vec(prop::collection::vec(0u8..8, 3..12), 1..24),
            picks in prop::collection::vec(0usize..64, 100..600),
            chunk in 1usize..800,
            level in 1u8..=9,
            strategy in prop::sample::select(vec![Strategy::Default, Strategy::Filtered, Strategy::Rle]),
        ) {
            let data: Vec<u8> = picks
                .iter()
                .flat_map(|&i| words[i % words.len()].iter().copied())
                .collect();
            // A 512-byte window slides often; 32K tokens fit in one block.
            let config = DeflateConfig::new(level)
                .with_window_bits(9)
                .with_mem_level(9)
                .with_strategy(strategy);
            let mut deflater = Deflater::new(config).unwrap();
            let max_dist = deflater.matcher.max_dist();
            let mut out = vec![0u8; 64 * 1024];

            for piece in data.chunks(chunk) {
                let (consumed, _, _) = deflater.deflate(piece, &mut out, FlushMode::None).unwrap();
                prop_assert_eq!(consumed, piece.len());

                let tokens = deflater.blocks.tokens();
                for token in tokens {
                    if let Token::Match { length, distance } = *token {
                        prop_assert!((1..=max_dist).contains(&usize::from(distance)));
                        prop_assert!((MIN_MATCH..=MAX_MATCH).contains(&usize::from(length)));
                    }
                }
                let replayed = replay(tokens);
                prop_assert!(replayed.is_some());
                let replayed = replayed.unwrap_or_default();
                prop_assert_eq!(&replayed[..], &data[..replayed.len()]);
            }
        }
    }
}
