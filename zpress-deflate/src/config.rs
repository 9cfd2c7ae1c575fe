//! Compressor configuration and per-level tuning.

use zpress_core::error::{PressError, Result};

/// Largest supported compression level.
pub const MAX_LEVEL: u8 = 9;

/// Smallest and largest base-2 logarithm of the window size.
pub const MIN_WINDOW_BITS: u8 = 9;
/// Largest window: 32 KiB.
pub const MAX_WINDOW_BITS: u8 = 15;

/// Smallest and largest memory level.
pub const MIN_MEM_LEVEL: u8 = 1;
/// Largest memory level.
pub const MAX_MEM_LEVEL: u8 = 9;

/// Match selection strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    /// Regular LZ77 + Huffman coding.
    #[default]
    Default,
    /// Favour Huffman coding for data made of small, noisy values.
    /// Matches of 5 bytes or less are dropped.
    Filtered,
    /// Literals only, no string matching.
    HuffmanOnly,
    /// Only matches at distance 1 (run-length encoding).
    Rle,
    /// Never emit dynamic Huffman blocks.
    Fixed,
}

/// Container format around the DEFLATE data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// RFC 1950: 2-byte header, DEFLATE data, Adler-32 trailer.
    #[default]
    Zlib,
    /// Bare RFC 1951 DEFLATE data.
    Raw,
}

/// Compressor configuration.
///
/// # Example
///
/// ```
/// use zpress_deflate::config::{DeflateConfig, Strategy};
///
/// let config = DeflateConfig::default()
///     .with_level(9)
///     .with_strategy(Strategy::Filtered);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateConfig {
    /// Compression level, 0 (store) to 9 (best).
    pub level: u8,
    /// Base-2 logarithm of the window size (9-15).
    pub window_bits: u8,
    /// Memory level (1-9); sizes the hash table and the symbol buffer.
    pub mem_level: u8,
    /// Match selection strategy.
    pub strategy: Strategy,
    /// Output container.
    pub format: Format,
}

impl Default for DeflateConfig {
    fn default() -> Self {
        Self {
            level: 6,
            window_bits: MAX_WINDOW_BITS,
            mem_level: 8,
            strategy: Strategy::Default,
            format: Format::Zlib,
        }
    }
}

impl DeflateConfig {
    /// Default configuration at the given level.
    pub fn new(level: u8) -> Self {
        Self::default().with_level(level)
    }

    /// Set the compression level.
    pub fn with_level(mut self, level: u8) -> Self {
        self.level = level;
        self
    }

    /// Set the window size as a power of two.
    pub fn with_window_bits(mut self, window_bits: u8) -> Self {
        self.window_bits = window_bits;
        self
    }

    /// Set the memory level.
    pub fn with_mem_level(mut self, mem_level: u8) -> Self {
        self.mem_level = mem_level;
        self
    }

    /// Set the match strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the container format.
    pub fn with_format(mut self, format: Format) -> Self {
        self.format = format;
        self
    }

    /// Check every parameter against its allowed range.
    pub fn validate(&self) -> Result<()> {
        if self.level > MAX_LEVEL {
            return Err(PressError::invalid_level(self.level));
        }
        if !(MIN_WINDOW_BITS..=MAX_WINDOW_BITS).contains(&self.window_bits) {
            return Err(PressError::invalid_window_bits(self.window_bits));
        }
        if !(MIN_MEM_LEVEL..=MAX_MEM_LEVEL).contains(&self.mem_level) {
            return Err(PressError::invalid_mem_level(self.mem_level));
        }
        Ok(())
    }

    /// Window size in bytes.
    pub fn window_size(&self) -> usize {
        1 << self.window_bits
    }

    /// Number of hash bits.
    pub fn hash_bits(&self) -> u32 {
        u32::from(self.mem_level) + 7
    }

    /// Symbol buffer size; a block is flushed when it holds one less token.
    pub fn lit_bufsize(&self) -> usize {
        1 << (self.mem_level + 6)
    }

    /// Matcher tuning for the configured level.
    pub fn tuning(&self) -> Tuning {
        CONFIGURATION_TABLE[usize::from(self.level.min(MAX_LEVEL))]
    }
}

/// Which compression loop a level uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressFunc {
    /// Stored blocks only.
    Stored,
    /// Greedy matching.
    Fast,
    /// Lazy matching.
    Slow,
}

/// Per-level matcher parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tuning {
    /// Quarter the chain search once the previous match reaches this length.
    pub good_length: u16,
    /// Lazy: skip the lazy search above this length.
    /// Greedy: insert strings of matches up to this length into the hash.
    pub max_lazy: u16,
    /// Stop searching once a match this long is found.
    pub nice_length: u16,
    /// Maximum hash chain steps per search.
    pub max_chain: u16,
    /// Compression loop.
    pub func: CompressFunc,
}

impl Tuning {
    const fn new(
        good_length: u16,
        max_lazy: u16,
        nice_length: u16,
        max_chain: u16,
        func: CompressFunc,
    ) -> Self {
        Self {
            good_length,
            max_lazy,
            nice_length,
            max_chain,
            func,
        }
    }
}

/// Matcher effort for levels 0-9.
pub const CONFIGURATION_TABLE: [Tuning; 10] = [
    Tuning::new(0, 0, 0, 0, CompressFunc::Stored),
    Tuning::new(4, 4, 8, 4, CompressFunc::Fast),
    Tuning::new(4, 5, 16, 8, CompressFunc::Fast),
    Tuning::new(4, 6, 32, 32, CompressFunc::Fast),
    Tuning::new(4, 4, 16, 16, CompressFunc::Slow),
    Tuning::new(8, 16, 32, 32, CompressFunc::Slow),
    Tuning::new(8, 16, 128, 128, CompressFunc::Slow),
    Tuning::new(8, 32, 128, 256, CompressFunc::Slow),
    Tuning::new(32, 128, 258, 1024, CompressFunc::Slow),
    Tuning::new(32, 258, 258, 4096, CompressFunc::Slow),
];
