//! Table-driven CRC-32 (IEEE 802.3).
//!
//! Reversed polynomial 0xEDB88320, seeded with all-ones, finalized by
//! bitwise complement — the checksum zlib, PNG, and Ethernet use. The
//! 256-entry byte table is built by const evaluation, so there is no
//! lazily-initialized process state and no synchronization question.
//!
//! Two entry points:
//!
//! ```
//! use marcasite_crypto::{Crc32, crc32};
//!
//! // One-shot over a contiguous buffer.
//! let sum = crc32(b"123456789");
//!
//! // Incremental, for data that lives in more than one slice.
//! let mut hasher = Crc32::new();
//! hasher.update(b"1234");
//! hasher.update(b"56789");
//! assert_eq!(hasher.finalize(), sum);
//! ```

/// Reversed IEEE 802.3 polynomial.
const POLYNOMIAL: u32 = 0xEDB8_8320;

/// Byte-at-a-time lookup table, one entry per input byte value.
const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut byte = 0;
    while byte < 256 {
        let mut crc = byte as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 == 1 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[byte] = crc;
        byte += 1;
    }
    table
}

/// Computes the fully finalized CRC-32 of `data` in one shot.
pub fn crc32(data: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(data);
    hasher.finalize()
}

/// Incremental CRC-32 state for data spread across multiple slices.
///
/// Feeding the same bytes in any chunking yields the same checksum as the
/// one-shot [`crc32`].
#[derive(Debug, Clone)]
pub struct Crc32 {
    state: u32,
}

impl Crc32 {
    /// Starts a new checksum with the all-ones seed.
    #[must_use]
    pub fn new() -> Self {
        Self { state: 0xFFFF_FFFF }
    }

    /// Folds `data` into the running checksum.
    pub fn update(&mut self, data: &[u8]) {
        for &byte in data {
            let index = ((self.state ^ u32::from(byte)) & 0xFF) as usize;
            self.state = (self.state >> 8) ^ TABLE[index];
        }
    }

    /// Applies the final complement and returns the checksum.
    #[must_use]
    pub fn finalize(self) -> u32 {
        self.state ^ 0xFFFF_FFFF
    }
}

impl Default for Crc32 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn empty_input() {
        assert_eq!(crc32(b""), 0);
    }

    #[test]
    fn known_vectors() {
        // The standard check value for CRC-32/ISO-HDLC.
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(crc32(b"a"), 0xE8B7_BE43);
        assert_eq!(
            crc32(b"The quick brown fox jumps over the lazy dog"),
            0x414F_A339
        );
    }

    #[test]
    fn incremental_matches_oneshot() {
        let data = b"append-only logs tolerate torn tails";
        let mut hasher = Crc32::new();
        hasher.update(data);
        assert_eq!(hasher.finalize(), crc32(data));
    }

    #[test]
    fn split_points_do_not_matter() {
        let data = b"0123456789abcdef";
        for split in 0..=data.len() {
            let mut hasher = Crc32::new();
            hasher.update(&data[..split]);
            hasher.update(&data[split..]);
            assert_eq!(hasher.finalize(), crc32(data), "split at {split}");
        }
    }

    proptest! {
        #[test]
        fn chunked_equals_oneshot(data: Vec<u8>, split: usize) {
            let split = if data.is_empty() { 0 } else { split % data.len() };
            let mut hasher = Crc32::new();
            hasher.update(&data[..split]);
            hasher.update(&data[split..]);
            prop_assert_eq!(hasher.finalize(), crc32(&data));
        }

        #[test]
        fn single_bit_flip_changes_checksum(data: Vec<u8>, pos: usize, bit in 0u8..8) {
            prop_assume!(!data.is_empty());
            let pos = pos % data.len();
            let mut flipped = data.clone();
            flipped[pos] ^= 1 << bit;
            prop_assert_ne!(crc32(&data), crc32(&flipped));
        }
    }
}
