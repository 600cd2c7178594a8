//! Fixed-width bit vectors indexed by an item's assigned bit position

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte/bit coordinate of a bit index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BitCoord {
    pub byte_index: usize,
    pub bit_index: u8,
}

impl BitCoord {
    pub fn of(index: usize) -> Self {
        Self {
            byte_index: index / 8,
            bit_index: (index % 8) as u8,
        }
    }

    /// Single-bit mask within the byte
    pub fn mask(&self) -> u8 {
        1 << self.bit_index
    }
}

/// Bit vector sized to `ceil(item_count / 8)` bytes
///
/// A zero-length mask is the result of OR-ing no masks at all and reads as
/// "nothing set" for every index.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Bitmask {
    bytes: Vec<u8>,
}

impl Bitmask {
    /// All-zero mask with room for `item_count` items
    pub fn with_items(item_count: usize) -> Self {
        Self {
            bytes: vec![0; item_count.div_ceil(8)],
        }
    }

    /// Mask for `item_count` items with `indices` set
    pub fn from_indices(item_count: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = Self::with_items(item_count);
        for index in indices {
            mask.set(index);
        }
        mask
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.is_set_at(BitCoord::of(index))
    }

    pub fn is_set_at(&self, coord: BitCoord) -> bool {
        self.bytes
            .get(coord.byte_index)
            .is_some_and(|byte| byte & coord.mask() != 0)
    }

    /// Set bit `index`; out-of-range indices are ignored
    pub fn set(&mut self, index: usize) {
        let coord = BitCoord::of(index);
        if let Some(byte) = self.bytes.get_mut(coord.byte_index) {
            *byte |= coord.mask();
        }
    }

    /// Clear bit `index`; out-of-range indices are ignored
    pub fn unset(&mut self, index: usize) {
        let coord = BitCoord::of(index);
        if let Some(byte) = self.bytes.get_mut(coord.byte_index) {
            *byte &= !coord.mask();
        }
    }

    /// Bitwise union of `masks`
    ///
    /// The result is as long as the longest input; zero inputs give the
    /// empty mask.
    pub fn or<'a>(masks: impl IntoIterator<Item = &'a Bitmask>) -> Bitmask {
        let mut result = Bitmask::default();
        for mask in masks {
            result.or_assign(mask);
        }
        result
    }

    /// In-place union with `other`
    pub fn or_assign(&mut self, other: &Bitmask) {
        if self.bytes.len() < other.bytes.len() {
            self.bytes.resize(other.bytes.len(), 0);
        }
        for (byte, other) in self.bytes.iter_mut().zip(&other.bytes) {
            *byte |= *other;
        }
    }

    /// Indices of every set bit, ascending
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.bytes.iter().enumerate().flat_map(|(byte_index, byte)| {
            (0..8u8)
                .filter(move |bit| byte & (1 << bit) != 0)
                .map(move |bit| byte_index * 8 + bit as usize)
        })
    }

    /// Length in bytes; 0 for the empty mask
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl fmt::Debug for Bitmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bitmask[")?;
        for (i, byte) in self.bytes.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{:08b}", byte)?;
        }
        write!(f, "]")
    }
}
