//! Bijective mapping from operation indices onto keys.
//!
//! The sequential pattern is the identity.  The random pattern is a balanced Feistel network over
//! the smallest even-width power of two covering the item count, with cycle walking to stay
//! inside `0..items`.  Indices past the item count are permuted block by block, so index
//! `q * items + r` maps to `q * items + perm(r)` and the whole mapping stays bijective.

use guacamole::{FromGuacamole, Guacamole};

use crate::config::AccessPattern;

const ROUNDS: usize = 4;

fn mix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51afd7ed558ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ceb9fe1a85ec53);
    h ^= h >> 33;
    h
}

///////////////////////////////////////////// KeySpace /////////////////////////////////////////////

#[derive(Clone, Debug)]
pub struct KeySpace {
    items: u64,
    pattern: AccessPattern,
    half_bits: u32,
    round_keys: [u64; ROUNDS],
}

impl KeySpace {
    /// A key space of `items` keys per block, permuted under `seed` when `pattern` is random.
    ///
    /// # Panics
    ///
    /// If `items` is zero.
    pub fn new(items: u64, pattern: AccessPattern, seed: u64) -> Self {
        assert!(items > 0, "a key space needs at least one item");
        let bits = 64 - (items - 1).leading_zeros();
        let bits = bits.max(2);
        let half_bits = (bits + 1) / 2;
        let mut guac = Guacamole::new(seed);
        let mut round_keys = [0u64; ROUNDS];
        for key in round_keys.iter_mut() {
            *key = u64::from_guacamole(&mut (), &mut guac);
        }
        Self {
            items,
            pattern,
            half_bits,
            round_keys,
        }
    }

    /// The number of distinct keys in one block.
    pub fn len(&self) -> u64 {
        self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items == 0
    }

    pub fn pattern(&self) -> AccessPattern {
        self.pattern
    }

    /// The numeric key for an operation index.
    pub fn key(&self, index: u64) -> u64 {
        match self.pattern {
            AccessPattern::Sequential => index,
            AccessPattern::Random => {
                let block = index / self.items;
                let offset = index % self.items;
                block * self.items + self.permute(offset)
            }
        }
    }

    /// The on-disk key for an operation index.  Byte order matches numeric order.
    pub fn key_bytes(&self, index: u64) -> [u8; 8] {
        self.key(index).to_be_bytes()
    }

    fn permute(&self, mut x: u64) -> u64 {
        debug_assert!(x < self.items);
        loop {
            x = self.feistel(x);
            if x < self.items {
                return x;
            }
        }
    }

    fn feistel(&self, x: u64) -> u64 {
        let mask = (1u64 << self.half_bits) - 1;
        let mut left = (x >> self.half_bits) & mask;
        let mut right = x & mask;
        for key in self.round_keys.iter() {
            let f = mix64(right ^ key) & mask;
            let next = left ^ f;
            left = right;
            right = next;
        }
        (left << self.half_bits) | right
    }
}

/////////////////////////////////////////////// tests //////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn sequential_is_identity() {
        let ks = KeySpace::new(10, AccessPattern::Sequential, 42);
        let keys = (0..10).map(|i| ks.key(i)).collect::<Vec<_>>();
        assert_eq!((0..10).collect::<Vec<_>>(), keys);
        assert_eq!(25, ks.key(25));
    }

    #[test]
    fn sequential_bytes_increase() {
        let ks = KeySpace::new(1000, AccessPattern::Sequential, 0);
        for i in 1..1000 {
            assert!(ks.key_bytes(i - 1) < ks.key_bytes(i));
        }
    }

    #[test]
    fn random_is_not_identity() {
        let ks = KeySpace::new(1000, AccessPattern::Random, 0);
        let keys = (0..1000).map(|i| ks.key(i)).collect::<Vec<_>>();
        assert_ne!((0..1000).collect::<Vec<_>>(), keys);
    }

    #[test]
    fn single_item() {
        let ks = KeySpace::new(1, AccessPattern::Random, 7);
        assert_eq!(0, ks.key(0));
        assert_eq!(1, ks.key(1));
        assert_eq!(5, ks.key(5));
    }

    #[test]
    #[should_panic(expected = "at least one item")]
    fn empty_key_space_panics() {
        KeySpace::new(0, AccessPattern::Sequential, 0);
    }

    #[test]
    fn seeds_change_the_permutation() {
        let lhs = KeySpace::new(1000, AccessPattern::Random, 1);
        let rhs = KeySpace::new(1000, AccessPattern::Random, 2);
        let lhs = (0..1000).map(|i| lhs.key(i)).collect::<Vec<_>>();
        let rhs = (0..1000).map(|i| rhs.key(i)).collect::<Vec<_>>();
        assert_ne!(lhs, rhs);
    }

    proptest! {
        #[test]
        fn random_is_a_permutation(items in 1u64..2048, seed: u64) {
            let ks = KeySpace::new(items, AccessPattern::Random, seed);
            let mut seen = HashSet::new();
            for i in 0..items {
                let key = ks.key(i);
                prop_assert!(key < items);
                prop_assert!(seen.insert(key));
            }
            prop_assert_eq!(items as usize, seen.len());
        }

        #[test]
        fn blocks_stay_in_their_block(items in 1u64..512, seed: u64, block in 0u64..16) {
            let ks = KeySpace::new(items, AccessPattern::Random, seed);
            let mut seen = HashSet::new();
            for i in block * items..(block + 1) * items {
                let key = ks.key(i);
                prop_assert!(key >= block * items && key < (block + 1) * items);
                prop_assert!(seen.insert(key));
            }
        }

        #[test]
        fn same_seed_same_keys(items in 1u64..4096, seed: u64, index: u64) {
            let index = index % (items * 4);
            let lhs = KeySpace::new(items, AccessPattern::Random, seed);
            let rhs = KeySpace::new(items, AccessPattern::Random, seed);
            prop_assert_eq!(lhs.key(index), rhs.key(index));
        }
    }
}
