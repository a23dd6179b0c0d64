use bittle::{Bits, BitsMut};
use serde::{Deserialize, Serialize};
use std::ops::Index;

/// A compact array of bits, backed by `u64` words.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BitMap {
    bits: Vec<u64>,
    nbits: usize,
}

impl BitMap {
    const ONE: bool = true;
    const ZERO: bool = false;

    /// Creates a new `BitMap` by repeating `value` for `nbits` bits.
    pub fn repeat(value: bool, nbits: usize) -> Self {
        let vec_len = nbits.div_ceil(64);
        let mut bits = Vec::with_capacity(vec_len);
        if value == Self::ONE {
            bits.resize(vec_len, !0u64);
        } else {
            bits.resize(vec_len, 0u64);
        }

        if nbits % 64 != 0 {
            bits[vec_len - 1]
                .iter_ones()
                .filter(|index| (*index as usize) >= nbits % 64)
                .for_each(|index| bits[vec_len - 1].clear_bit(index));
        }

        Self { bits, nbits }
    }

    /// Returns the total number of bits.
    pub fn len(&self) -> usize {
        self.nbits
    }

    /// Returns `true` if the bitmap has zero bits.
    pub fn is_empty(&self) -> bool {
        self.nbits == 0
    }

    fn check_index(&self, index: usize) {
        if index >= self.len() {
            panic!(
                "bitmap index {} is out of range, total bits {}",
                index, self.nbits,
            );
        }
    }

    /// Tests if the given bit is set.
    pub fn test_bit(&self, index: usize) -> bool {
        self.check_index(index);
        self.bits.test_bit(index as _)
    }

    /// Sets the given bit to one.
    pub fn set_bit(&mut self, index: usize) {
        self.check_index(index);
        self.bits.set_bit(index as _);
    }

    /// Clears the given bit to zero.
    pub fn clear_bit(&mut self, index: usize) {
        self.check_index(index);
        self.bits.clear_bit(index as _)
    }

    /// Sets the given bit to `value`.
    pub fn set(&mut self, index: usize, value: bool) {
        if value == Self::ONE {
            self.set_bit(index);
        } else {
            self.clear_bit(index);
        }
    }

    fn bits_not_in_use(&self) -> usize {
        self.bits.len() * 64 - self.nbits
    }

    /// Returns the number of one bits.
    pub fn count_ones(&self) -> usize {
        self.bits.count_ones() as _
    }

    /// Returns the number of zero bits.
    pub fn count_zeros(&self) -> usize {
        let total_zeros = self.bits.count_zeros() as usize;
        total_zeros - self.bits_not_in_use()
    }

    /// Finds the index of the first one bit at or after `from`.
    pub fn first_one(&self, from: usize) -> Option<usize> {
        self.check_index(from);
        let first_u64_index = from / 64;

        self.bits[first_u64_index..]
            .iter_ones()
            .map(|index| first_u64_index * 64 + (index as usize))
            .find(|&index| index >= from)
    }

    /// Finds `count` indexes of the first one bits at or after `from`.
    pub fn first_ones(&self, from: usize, count: usize) -> Option<Vec<usize>> {
        if count == 0 {
            return Some(Vec::new());
        }
        self.check_index(from + count - 1);
        let first_u64_index = from / 64;

        let ones: Vec<_> = self.bits[first_u64_index..]
            .iter_ones()
            .map(|index| first_u64_index * 64 + (index as usize))
            .filter(|&index| index >= from)
            .take(count)
            .collect();
        if ones.len() == count {
            Some(ones)
        } else {
            None
        }
    }

    /// Finds the index of the first zero bit at or after `from`.
    pub fn first_zero(&self, from: usize) -> Option<usize> {
        self.check_index(from);
        let first_u64_index = from / 64;

        self.bits[first_u64_index..]
            .iter_zeros()
            .map(|index| first_u64_index * 64 + (index as usize))
            .find(|&index| index >= from && index < self.len())
    }
}

impl Index<usize> for BitMap {
    type Output = bool;

    fn index(&self, index: usize) -> &Self::Output {
        if self.test_bit(index) {
            &BitMap::ONE
        } else {
            &BitMap::ZERO
        }
    }
}
