//! Adler-32 checksum (RFC 1950).
//!
//! The zlib trailer carries the Adler-32 of the uncompressed data. The
//! compressor never computes it itself: the stream feeds this accumulator the
//! exact bytes it pulls into its window, in the same order.

/// Largest prime smaller than 65536.
const ADLER_MOD: u32 = 65521;

/// Largest n such that 255n(n+1)/2 + (n+1)(ADLER_MOD-1) fits in a u32.
const NMAX: usize = 5552;

/// Adler-32 checksum accumulator.
///
/// # Example
///
/// ```
/// use zpress_core::checksum::Adler32;
///
/// let mut adler = Adler32::new();
/// adler.update(b"Wiki");
/// adler.update(b"pedia");
/// assert_eq!(adler.finish(), 0x11E6_0398);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Adler32 {
    a: u32,
    b: u32,
}

impl Adler32 {
    /// Create a new accumulator (checksum of the empty string, `1`).
    pub fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    /// Feed more bytes.
    pub fn update(&mut self, data: &[u8]) {
        let mut a = self.a;
        let mut b = self.b;

        for chunk in data.chunks(NMAX) {
            for &byte in chunk {
                a += u32::from(byte);
                b += a;
            }
            a %= ADLER_MOD;
            b %= ADLER_MOD;
        }

        self.a = a;
        self.b = b;
    }

    /// Current checksum value.
    pub fn finish(&self) -> u32 {
        (self.b << 16) | self.a
    }

    /// Compute the checksum of `data` in one shot.
    pub fn checksum(data: &[u8]) -> u32 {
        let mut adler = Self::new();
        adler.update(data);
        adler.finish()
    }
}

impl Default for Adler32 {
    fn default() -> Self {
        Self::new()
    }
}
