//! DEFLATE alphabets, extra-bit tables and the fixed Huffman trees (RFC 1951).
//!
//! The fixed trees are built once per process and shared read-only by every
//! compressor instance.

use crate::huffman::{Code, canonical_codes};
use std::sync::OnceLock;

/// Number of literal byte symbols.
pub const LITERALS: usize = 256;

/// End of block symbol.
pub const END_BLOCK: usize = 256;

/// Number of length codes, not counting the special END_BLOCK code.
pub const LENGTH_CODES: usize = 29;

/// Size of the literal/length alphabet (0-285).
pub const L_CODES: usize = LITERALS + 1 + LENGTH_CODES;

/// Size of the distance alphabet (0-29).
pub const D_CODES: usize = 30;

/// Size of the bit length alphabet (0-18).
pub const BL_CODES: usize = 19;

/// Longest code allowed for literal/length and distance trees.
pub const MAX_BITS: u8 = 15;

/// Longest code allowed for the bit length tree.
pub const MAX_BL_BITS: u8 = 7;

/// Repeat previous bit length 3-6 times (2 extra bits).
pub const REP_3_6: usize = 16;

/// Repeat a zero length 3-10 times (3 extra bits).
pub const REPZ_3_10: usize = 17;

/// Repeat a zero length 11-138 times (7 extra bits).
pub const REPZ_11_138: usize = 18;

/// Shortest match DEFLATE can express.
pub const MIN_MATCH: usize = 3;

/// Longest match DEFLATE can express.
pub const MAX_MATCH: usize = 258;

/// Largest payload of a single stored block.
pub const MAX_STORED: usize = 65535;

/// Block type field values.
pub const STORED_BLOCK: u32 = 0;
/// Block type field value for fixed Huffman codes.
pub const STATIC_TREES: u32 = 1;
/// Block type field value for dynamic Huffman codes.
pub const DYN_TREES: u32 = 2;

/// Length code base values (RFC 1951 Section 3.2.5).
///
/// For length codes 257-285, this gives the base length value.
/// Extra bits are added to get the final length.
pub const LENGTH_BASE: [u16; LENGTH_CODES] = [
    3, 4, 5, 6, 7, 8, 9, 10, // 257-264: 0 extra bits
    11, 13, 15, 17, // 265-268: 1 extra bit
    19, 23, 27, 31, // 269-272: 2 extra bits
    35, 43, 51, 59, // 273-276: 3 extra bits
    67, 83, 99, 115, // 277-280: 4 extra bits
    131, 163, 195, 227, // 281-284: 5 extra bits
    258, // 285: 0 extra bits (special case)
];

/// Number of extra bits for length codes 257-285.
pub const LENGTH_EXTRA_BITS: [u8; LENGTH_CODES] = [
    0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

/// Distance code base values (RFC 1951 Section 3.2.5).
pub const DISTANCE_BASE: [u16; D_CODES] = [
    1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537,
    2049, 3073, 4097, 6145, 8193, 12289, 16385, 24577,
];

/// Number of extra bits for distance codes 0-29.
pub const DISTANCE_EXTRA_BITS: [u8; D_CODES] = [
    0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13,
    13,
];

/// Number of extra bits for each bit length code.
pub const BL_EXTRA_BITS: [u8; BL_CODES] = [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2, 3, 7];

/// Order in which bit length code lengths are transmitted (RFC 1951 Section 3.2.7).
pub const CODE_LENGTH_ORDER: [usize; BL_CODES] = [
    16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

/// Fixed literal/length code lengths (RFC 1951 Section 3.2.6).
///
/// Covers all 288 symbols; 286 and 287 never occur in data but take part in
/// code construction.
pub fn fixed_litlen_lengths() -> [u8; L_CODES + 2] {
    let mut lengths = [0u8; L_CODES + 2];
    for (symbol, len) in lengths.iter_mut().enumerate() {
        *len = match symbol {
            0..=143 => 8,
            144..=255 => 9,
            256..=279 => 7,
            _ => 8,
        };
    }
    lengths
}

/// Fixed literal/length codes, built on first use.
pub fn static_litlen_codes() -> &'static [Code] {
    static TREE: OnceLock<Vec<Code>> = OnceLock::new();
    TREE.get_or_init(|| canonical_codes(&fixed_litlen_lengths()))
}

/// Fixed distance codes: all 5 bits, built on first use.
pub fn static_distance_codes() -> &'static [Code] {
    static TREE: OnceLock<Vec<Code>> = OnceLock::new();
    TREE.get_or_init(|| canonical_codes(&[5u8; D_CODES]))
}

/// Convert a match length (3-258) to `(symbol, extra_bits, extra_value)`.
///
/// `symbol` is in 257-285.
pub fn length_to_code(length: u16) -> (u16, u8, u16) {
    debug_assert!(
        (3..=258).contains(&length),
        "Length out of range: {}",
        length
    );

    let length = length as usize;

    let code = match length {
        3..=10 => length - 3 + 257,
        11..=18 => (length - 11) / 2 + 265,
        19..=34 => (length - 19) / 4 + 269,
        35..=66 => (length - 35) / 8 + 273,
        67..=130 => (length - 67) / 16 + 277,
        131..=257 => (length - 131) / 32 + 281,
        _ => 285,
    };

    let base = LENGTH_BASE[code - 257] as usize;
    let extra_bits = LENGTH_EXTRA_BITS[code - 257];
    let extra_value = (length - base) as u16;

    (code as u16, extra_bits, extra_value)
}

/// Convert a distance (1-32768) to `(code, extra_bits, extra_value)`.
pub fn distance_to_code(distance: u16) -> (u16, u8, u16) {
    debug_assert!(distance >= 1, "Distance out of range: {}", distance);

    // Codes 2k+4 and 2k+5 share k+1 extra bits, so the code follows from the
    // position of the highest set bit of (distance - 1).
    let d = u32::from(distance - 1);
    let code = if d < 4 {
        d
    } else {
        let msb = 31 - d.leading_zeros();
        2 * msb + ((d >> (msb - 1)) & 1)
    };

    let base = DISTANCE_BASE[code as usize];
    let extra_bits = DISTANCE_EXTRA_BITS[code as usize];
    let extra_value = distance - base;

    (code as u16, extra_bits, extra_value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_litlen_lengths() {
        let lengths = fixed_litlen_lengths();

        assert_eq!(lengths[0], 8);
        assert_eq!(lengths[143], 8);
        assert_eq!(lengths[144], 9);
        assert_eq!(lengths[255], 9);
        assert_eq!(lengths[256], 7); // End of block
        assert_eq!(lengths[279], 7);
        assert_eq!(lengths[280], 8);
        assert_eq!(lengths[287], 8);
    }

    #[test]
    fn test_static_codes_match_rfc() {
        let lit = static_litlen_codes();
        // RFC 1951 3.2.6: 0 -> 00110000, 144 -> 110010000, 256 -> 0000000, 280 -> 11000000.
        // Codes are stored bit-reversed for LSB-first output.
        let msb_first = |c: Code| {
            let mut v = 0u16;
            for i in 0..c.len {
                v = (v << 1) | ((c.code >> i) & 1);
            }
            v
        };
        assert_eq!(msb_first(lit[0]), 0b0011_0000);
        assert_eq!(msb_first(lit[144]), 0b1_1001_0000);
        assert_eq!(msb_first(lit[256]), 0);
        assert_eq!(msb_first(lit[280]), 0b1100_0000);

        let dist = static_distance_codes();
        assert_eq!(dist.len(), D_CODES);
        assert!(dist.iter().all(|c| c.len == 5));
        assert_eq!(msb_first(dist[3]), 3);
    }

    #[test]
    fn test_length_to_code_boundaries() {
        for length in 3..=258u16 {
            let (code, extra_bits, extra_value) = length_to_code(length);
            assert!((257..=285).contains(&code));
            let idx = (code - 257) as usize;
            assert_eq!(LENGTH_BASE[idx] + extra_value, length);
            assert!(u32::from(extra_value) < (1u32 << extra_bits));
        }
    }

    #[test]
    fn test_distance_to_code_boundaries() {
        for distance in 1..=32768u16 {
            let (code, extra_bits, extra_value) = distance_to_code(distance);
            assert!(code < D_CODES as u16);
            assert_eq!(DISTANCE_BASE[code as usize] + extra_value, distance);
            assert!(u32::from(extra_value) < (1u32 << extra_bits));
        }
    }

    #[test]
    fn test_specific_lengths() {
        assert_eq!(length_to_code(3), (257, 0, 0));
        assert_eq!(length_to_code(10), (264, 0, 0));
        assert_eq!(length_to_code(11), (265, 1, 0));
        assert_eq!(length_to_code(12), (265, 1, 1));
        assert_eq!(length_to_code(227), (284, 5, 0));
        assert_eq!(length_to_code(257), (284, 5, 30));
        assert_eq!(length_to_code(258), (285, 0, 0));
    }

    #[test]
    fn test_specific_distances() {
        assert_eq!(distance_to_code(1), (0, 0, 0));
        assert_eq!(distance_to_code(4), (3, 0, 0));
        assert_eq!(distance_to_code(5), (4, 1, 0));
        assert_eq!(distance_to_code(6), (4, 1, 1));
        assert_eq!(distance_to_code(7), (5, 1, 0));
        assert_eq!(distance_to_code(24577), (29, 13, 0));
        assert_eq!(distance_to_code(32768), (29, 13, 8191));
    }
}
