//! Fixed-length bit vector over document ordinals.
//!
//! A [`DocBitSet`] is used both as a segment's live-docs set (bit set = the
//! document at that ordinal is live) and as the failed-position set produced
//! by the bulk response parser (bit set = the item at that position failed).
//!
//! The length is fixed at construction and always equals the number of
//! ordinals the set describes. Binary operations combine word-by-word; bits
//! that lie beyond the other operand's length are treated as clear.

use std::fmt;

const WORD_BITS: usize = 64;

/// Fixed-length bit vector backed by 64-bit words.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DocBitSet {
    words: Vec<u64>,
    len: usize,
}

impl DocBitSet {
    /// Create a set of `len` bits, all clear.
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    /// Create a set of `len` bits, all set.
    pub fn full(len: usize) -> Self {
        let mut set = Self {
            words: vec![u64::MAX; len.div_ceil(WORD_BITS)],
            len,
        };
        set.mask_tail();
        set
    }

    /// Create a set of `len` bits with the given ordinals set.
    ///
    /// Ordinals outside `[0, len)` are ignored.
    pub fn from_ordinals(len: usize, ordinals: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new(len);
        for ordinal in ordinals {
            if ordinal < len {
                set.set(ordinal);
            }
        }
        set
    }

    /// Number of ordinals covered by this set.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the set covers zero ordinals.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the bit at `index` is set. Out-of-range indexes read as clear.
    pub fn get(&self, index: usize) -> bool {
        if index >= self.len {
            return false;
        }
        self.words[index / WORD_BITS] & (1u64 << (index % WORD_BITS)) != 0
    }

    /// Set the bit at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn set(&mut self, index: usize) {
        assert!(index < self.len, "bit {} out of range for length {}", index, self.len);
        self.words[index / WORD_BITS] |= 1u64 << (index % WORD_BITS);
    }

    /// Clear the bit at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len`.
    pub fn clear(&mut self, index: usize) {
        assert!(index < self.len, "bit {} out of range for length {}", index, self.len);
        self.words[index / WORD_BITS] &= !(1u64 << (index % WORD_BITS));
    }

    /// Number of set bits.
    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Whether no bit is set.
    pub fn none(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// `self = self AND other`.
    pub fn and(&mut self, other: &DocBitSet) {
        for (i, word) in self.words.iter_mut().enumerate() {
            *word &= other.words.get(i).copied().unwrap_or(0);
        }
    }

    /// `self = self OR other`.
    pub fn or(&mut self, other: &DocBitSet) {
        for (word, theirs) in self.words.iter_mut().zip(other.words.iter()) {
            *word |= *theirs;
        }
        self.mask_tail();
    }

    /// `self = self AND NOT other`.
    pub fn and_not(&mut self, other: &DocBitSet) {
        for (word, theirs) in self.words.iter_mut().zip(other.words.iter()) {
            *word &= !*theirs;
        }
    }

    /// `self = self XOR other`.
    pub fn xor(&mut self, other: &DocBitSet) {
        for (word, theirs) in self.words.iter_mut().zip(other.words.iter()) {
            *word ^= *theirs;
        }
        self.mask_tail();
    }

    /// Invert every bit in `[0, len)`.
    pub fn not(&mut self) {
        for word in self.words.iter_mut() {
            *word = !*word;
        }
        self.mask_tail();
    }

    /// Invert every bit in `[start, end)`. The range is clamped to `len`.
    pub fn flip(&mut self, start: usize, end: usize) {
        let end = end.min(self.len);
        for index in start..end {
            self.words[index / WORD_BITS] ^= 1u64 << (index % WORD_BITS);
        }
    }

    /// Return a copy resized to `len` bits. New bits are clear.
    pub fn resized(&self, len: usize) -> Self {
        let mut words = self.words.clone();
        words.resize(len.div_ceil(WORD_BITS), 0);
        let mut set = Self { words, len };
        set.mask_tail();
        set
    }

    /// First set bit at or after `from`.
    pub fn next_set_bit(&self, from: usize) -> Option<usize> {
        if from >= self.len {
            return None;
        }
        let mut word_index = from / WORD_BITS;
        let mut word = self.words[word_index] & (u64::MAX << (from % WORD_BITS));
        loop {
            if word != 0 {
                let index = word_index * WORD_BITS + word.trailing_zeros() as usize;
                return (index < self.len).then_some(index);
            }
            word_index += 1;
            if word_index >= self.words.len() {
                return None;
            }
            word = self.words[word_index];
        }
    }

    /// Iterate over set bits in ascending order.
    pub fn ones(&self) -> Ones<'_> {
        Ones { set: self, next: 0 }
    }

    /// Clear any bits past `len` in the final word.
    fn mask_tail(&mut self) {
        let rem = self.len % WORD_BITS;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

impl fmt::Debug for DocBitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocBitSet")
            .field("len", &self.len)
            .field("ones", &self.ones().collect::<Vec<_>>())
            .finish()
    }
}

/// Iterator over the set bits of a [`DocBitSet`].
pub struct Ones<'a> {
    set: &'a DocBitSet,
    next: usize,
}

impl Iterator for Ones<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let index = self.set.next_set_bit(self.next)?;
        self.next = index + 1;
        Some(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_and_full() {
        let empty = DocBitSet::new(70);
        assert_eq!(empty.len(), 70);
        assert_eq!(empty.cardinality(), 0);
        assert!(empty.none());

        let full = DocBitSet::full(70);
        assert_eq!(full.cardinality(), 70);
        assert!(full.get(69));
        assert!(!full.get(70));
    }

    #[test]
    fn test_set_clear_get() {
        let mut set = DocBitSet::new(130);
        set.set(0);
        set.set(64);
        set.set(129);
        assert!(set.get(0) && set.get(64) && set.get(129));
        assert_eq!(set.cardinality(), 3);

        set.clear(64);
        assert!(!set.get(64));
        assert_eq!(set.cardinality(), 2);
    }

    #[test]
    fn test_and_not() {
        let mut current = DocBitSet::from_ordinals(8, [0, 1, 2, 5, 7]);
        let previous = DocBitSet::from_ordinals(8, [0, 1, 2, 3]);
        current.and_not(&previous);
        assert_eq!(current.ones().collect::<Vec<_>>(), vec![5, 7]);
    }

    #[test]
    fn test_and_or_xor() {
        let a = DocBitSet::from_ordinals(10, [1, 2, 3]);
        let b = DocBitSet::from_ordinals(10, [2, 3, 4]);

        let mut and = a.clone();
        and.and(&b);
        assert_eq!(and.ones().collect::<Vec<_>>(), vec![2, 3]);

        let mut or = a.clone();
        or.or(&b);
        assert_eq!(or.ones().collect::<Vec<_>>(), vec![1, 2, 3, 4]);

        let mut xor = a;
        xor.xor(&b);
        assert_eq!(xor.ones().collect::<Vec<_>>(), vec![1, 4]);
    }

    #[test]
    fn test_not_respects_length() {
        let mut set = DocBitSet::from_ordinals(5, [0, 2]);
        set.not();
        assert_eq!(set.ones().collect::<Vec<_>>(), vec![1, 3, 4]);
        assert_eq!(set.cardinality(), 3);
    }

    #[test]
    fn test_flip_range() {
        let mut set = DocBitSet::new(10);
        set.flip(2, 5);
        assert_eq!(set.ones().collect::<Vec<_>>(), vec![2, 3, 4]);
        set.flip(3, 100);
        assert_eq!(set.ones().collect::<Vec<_>>(), vec![2, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_resized() {
        let set = DocBitSet::from_ordinals(3, [0, 2]);
        let grown = set.resized(6);
        assert_eq!(grown.len(), 6);
        assert_eq!(grown.ones().collect::<Vec<_>>(), vec![0, 2]);

        let shrunk = DocBitSet::full(100).resized(65);
        assert_eq!(shrunk.cardinality(), 65);
    }

    #[test]
    fn test_next_set_bit_across_words() {
        let set = DocBitSet::from_ordinals(200, [3, 150]);
        assert_eq!(set.next_set_bit(0), Some(3));
        assert_eq!(set.next_set_bit(4), Some(150));
        assert_eq!(set.next_set_bit(151), None);
        assert_eq!(set.next_set_bit(500), None);
    }

    #[test]
    fn test_zero_length() {
        let mut set = DocBitSet::full(0);
        assert!(set.is_empty());
        set.not();
        assert_eq!(set.cardinality(), 0);
        assert_eq!(set.next_set_bit(0), None);
    }
}
