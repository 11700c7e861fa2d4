// Copyright 2026 the Tributary Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Dense-id bit set with amortized clearing.

use alloc::vec::Vec;

const WORD_BITS: usize = 64;

/// Compact membership set for dense `u32` ids (field ids, node ids).
///
/// Storage is one bit per id, grouped into `u64` words. Besides the words
/// themselves the set remembers which words were written since the last
/// clear, so that [`clear`](Self::clear) only touches those words when the
/// set was used sparsely. This keeps per-transaction reuse cheap for large
/// graphs where a typical transaction dirties a handful of ids.
///
/// # Example
///
/// ```
/// use tributary_dirty::DenseIdBitSet;
///
/// let mut set = DenseIdBitSet::with_capacity(128);
/// assert!(set.add(3));
/// assert!(!set.add(3));
/// assert!(set.has(3));
///
/// set.clear();
/// assert!(!set.has(3));
/// assert!(set.add(100));
/// assert_eq!(set.iter().collect::<Vec<_>>(), vec![100]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct DenseIdBitSet {
    words: Vec<u64>,
    /// Word indices that went from zero to non-zero since the last clear.
    touched: Vec<u32>,
    /// Set once `touched` stops paying for itself; the next clear zeroes
    /// every word.
    saturated: bool,
    len: usize,
}

impl DenseIdBitSet {
    /// Creates an empty set with no preallocated words.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty set able to hold ids `0..capacity` without growing.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: alloc::vec![0; capacity.div_ceil(WORD_BITS)],
            touched: Vec::new(),
            saturated: false,
            len: 0,
        }
    }

    /// Number of ids the set can hold without growing.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Number of ids currently in the set.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if no id is in the set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `id`. Returns `true` if it was not present.
    pub fn add(&mut self, id: u32) -> bool {
        let (word, mask) = split(id);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let word_count = self.words.len();
        let slot = &mut self.words[word];
        if *slot & mask != 0 {
            return false;
        }
        if *slot == 0 && !self.saturated {
            // Add/remove churn can zero and refill the same word repeatedly,
            // so the list is bounded by the word count.
            if self.touched.len() * 4 >= word_count {
                self.saturated = true;
                self.touched.clear();
            } else {
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "word index derives from a u32 id"
                )]
                self.touched.push(word as u32);
            }
        }
        *slot |= mask;
        self.len += 1;
        true
    }

    /// Returns `true` if `id` is in the set.
    #[inline]
    #[must_use]
    pub fn has(&self, id: u32) -> bool {
        let (word, mask) = split(id);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    /// Removes `id`. Returns `true` if it was present.
    ///
    /// The word stays in the touched list; a later [`clear`](Self::clear)
    /// simply finds it already zero.
    pub fn remove(&mut self, id: u32) -> bool {
        let (word, mask) = split(id);
        match self.words.get_mut(word) {
            Some(slot) if *slot & mask != 0 => {
                *slot &= !mask;
                self.len -= 1;
                true
            }
            _ => false,
        }
    }

    /// Clears the set, touching only the words written since the last clear
    /// when that is cheaper than zeroing every word.
    pub fn clear(&mut self) {
        if !self.saturated {
            for &word in &self.touched {
                self.words[word as usize] = 0;
            }
        } else {
            self.words.fill(0);
        }
        self.touched.clear();
        self.saturated = false;
        self.len = 0;
    }

    /// Clears every word regardless of how the set was used.
    pub fn clear_all(&mut self) {
        self.words.fill(0);
        self.touched.clear();
        self.saturated = false;
        self.len = 0;
    }

    /// Iterates the ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            let mut bits = word;
            core::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros();
                bits &= bits - 1;
                #[expect(
                    clippy::cast_possible_truncation,
                    reason = "ids were inserted as u32"
                )]
                let id = (index * WORD_BITS) as u32 + bit;
                Some(id)
            })
        })
    }

    /// Adds every id of `other` to `self`.
    pub fn union_with(&mut self, other: &Self) {
        for id in other.iter() {
            self.add(id);
        }
    }
}

#[inline]
fn split(id: u32) -> (usize, u64) {
    let id = id as usize;
    (id / WORD_BITS, 1_u64 << (id % WORD_BITS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn add_has_remove() {
        let mut set = DenseIdBitSet::with_capacity(10);
        assert!(set.is_empty());
        assert!(set.add(0));
        assert!(set.add(9));
        assert!(!set.add(9));
        assert!(set.has(0));
        assert!(set.has(9));
        assert!(!set.has(5));
        assert_eq!(set.len(), 2);

        assert!(set.remove(9));
        assert!(!set.remove(9));
        assert!(!set.has(9));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn grows_past_capacity() {
        let mut set = DenseIdBitSet::new();
        assert!(!set.has(1_000));
        assert!(set.add(1_000));
        assert!(set.has(1_000));
        assert!(set.capacity() > 1_000);
    }

    #[test]
    fn clear_then_add_round_trip() {
        let mut set = DenseIdBitSet::with_capacity(4096);
        for id in [1, 64, 65, 4000] {
            set.add(id);
        }
        set.clear();
        assert!(set.is_empty());
        for id in [1, 64, 65, 4000] {
            assert!(!set.has(id), "id {id} survived clear");
        }

        set.add(65);
        assert!(set.has(65));
        assert!(!set.has(64));
        assert!(!set.has(4000));
    }

    #[test]
    fn dense_usage_falls_back_to_full_clear() {
        let mut set = DenseIdBitSet::with_capacity(256);
        for id in 0..256 {
            set.add(id);
        }
        set.clear();
        assert_eq!(set.iter().count(), 0);
        set.add(200);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![200]);
    }

    #[test]
    fn add_remove_churn_keeps_touched_bounded() {
        let mut set = DenseIdBitSet::with_capacity(4096);
        for _ in 0..10_000 {
            set.add(5);
            set.remove(5);
        }
        assert!(set.touched.len() <= set.words.len());

        set.add(5);
        set.add(4000);
        // Grows after the list stopped recording.
        set.add(9000);
        set.clear();
        assert!(set.is_empty());
        assert_eq!(set.iter().count(), 0);

        // Sparse clearing resumes after a clear.
        set.add(70);
        assert_eq!(set.touched.len(), 1);
        set.clear();
        assert!(!set.has(70));
    }

    #[test]
    fn clear_all_resets_everything() {
        let mut set = DenseIdBitSet::with_capacity(128);
        set.add(7);
        set.add(127);
        set.clear_all();
        assert!(!set.has(7));
        assert!(!set.has(127));
        assert_eq!(set.len(), 0);
    }

    #[test]
    fn iter_is_ascending() {
        let mut set = DenseIdBitSet::new();
        for id in [130, 2, 64, 63] {
            set.add(id);
        }
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![2, 63, 64, 130]);
    }

    #[test]
    fn union_merges_members() {
        let mut a = DenseIdBitSet::new();
        let mut b = DenseIdBitSet::new();
        a.add(1);
        b.add(1);
        b.add(90);
        a.union_with(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 90]);
        assert_eq!(a.len(), 2);
    }
}
