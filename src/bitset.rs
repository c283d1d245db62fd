//! Compact sets of state indices.
//!
//! [`StateSet`] is the bit set used everywhere a set of states is needed:
//! initial states, labels, deadlocks, the `u`/`v` arguments of the fixpoint
//! kernels, BSCCs. It grows on demand, so a set never needs to know the size
//! of the model it belongs to, and iterates its members in increasing order.

use std::fmt;

/// A growable set of state indices backed by a vector of u64 words.
#[derive(Clone, Default)]
pub struct StateSet {
    /// Storage: each u64 holds 64 bits
    words: Vec<u64>,
    /// Number of set bits (cached for O(1) len())
    count: usize,
}

impl StateSet {
    /// Number of bits per word.
    const BITS_PER_WORD: usize = 64;

    /// Creates a new empty set with room for `capacity` states.
    pub fn new(capacity: usize) -> Self {
        let num_words = capacity.div_ceil(Self::BITS_PER_WORD);
        Self {
            words: vec![0; num_words],
            count: 0,
        }
    }

    /// Creates an empty set with no pre-allocated capacity.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates the set `{0, 1, ..., n-1}`.
    pub fn full(n: usize) -> Self {
        let mut set = Self::new(n);
        set.insert_range(0, n);
        set
    }

    /// Creates the set containing exactly the given state.
    pub fn singleton(state: usize) -> Self {
        let mut set = Self::empty();
        set.insert(state);
        set
    }

    /// Returns the number of states in the set.
    #[inline]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Returns true if the set has no members.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Returns the capacity in bits.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.words.len() * Self::BITS_PER_WORD
    }

    /// Gets the word index and bit position for a given state.
    #[inline]
    fn word_and_bit(index: usize) -> (usize, usize) {
        (index / Self::BITS_PER_WORD, index % Self::BITS_PER_WORD)
    }

    /// Returns true if `index` is a member.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        let (word_idx, bit_idx) = Self::word_and_bit(index);
        match self.words.get(word_idx) {
            Some(word) => (word >> bit_idx) & 1 == 1,
            None => false,
        }
    }

    /// Adds `index`. Returns true if it was not previously a member.
    #[inline]
    pub fn insert(&mut self, index: usize) -> bool {
        let (word_idx, bit_idx) = Self::word_and_bit(index);
        if word_idx >= self.words.len() {
            self.words.resize(word_idx + 1, 0);
        }
        let mask = 1u64 << bit_idx;
        let was_clear = (self.words[word_idx] & mask) == 0;
        if was_clear {
            self.words[word_idx] |= mask;
            self.count += 1;
        }
        was_clear
    }

    /// Removes `index`. Returns true if it was previously a member.
    #[inline]
    pub fn remove(&mut self, index: usize) -> bool {
        let (word_idx, bit_idx) = Self::word_and_bit(index);
        if word_idx >= self.words.len() {
            return false;
        }
        let mask = 1u64 << bit_idx;
        let was_set = (self.words[word_idx] & mask) != 0;
        if was_set {
            self.words[word_idx] &= !mask;
            self.count -= 1;
        }
        was_set
    }

    /// Sets membership of `index` to `value`.
    #[inline]
    pub fn set(&mut self, index: usize, value: bool) {
        if value {
            self.insert(index);
        } else {
            self.remove(index);
        }
    }

    /// Inserts every index in `from..to`.
    pub fn insert_range(&mut self, from: usize, to: usize) {
        for index in from..to {
            self.insert(index);
        }
    }

    /// Returns the smallest member, if any.
    pub fn first(&self) -> Option<usize> {
        self.iter().next()
    }

    /// Returns one past the largest member (0 for the empty set).
    pub fn length(&self) -> usize {
        for (word_idx, &word) in self.words.iter().enumerate().rev() {
            if word != 0 {
                let top = Self::BITS_PER_WORD - 1 - word.leading_zeros() as usize;
                return word_idx * Self::BITS_PER_WORD + top + 1;
            }
        }
        0
    }

    /// Finds and removes the smallest member.
    pub fn pop_first(&mut self) -> Option<usize> {
        let first = self.first()?;
        self.remove(first);
        Some(first)
    }

    /// Removes all members.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
        self.count = 0;
    }

    fn recount(&mut self) {
        self.count = self.words.iter().map(|w| w.count_ones() as usize).sum();
    }

    /// In-place union.
    pub fn union_with(&mut self, other: &StateSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a |= *b;
        }
        self.recount();
    }

    /// In-place intersection.
    pub fn intersect_with(&mut self, other: &StateSet) {
        for (i, a) in self.words.iter_mut().enumerate() {
            *a &= other.words.get(i).copied().unwrap_or(0);
        }
        self.recount();
    }

    /// In-place difference (`self \ other`).
    pub fn difference_with(&mut self, other: &StateSet) {
        for (a, b) in self.words.iter_mut().zip(&other.words) {
            *a &= !*b;
        }
        self.recount();
    }

    /// Returns `self ∪ other`.
    pub fn union(&self, other: &StateSet) -> StateSet {
        let mut result = self.clone();
        result.union_with(other);
        result
    }

    /// Returns `self ∩ other`.
    pub fn intersection(&self, other: &StateSet) -> StateSet {
        let mut result = self.clone();
        result.intersect_with(other);
        result
    }

    /// Returns `self \ other`.
    pub fn difference(&self, other: &StateSet) -> StateSet {
        let mut result = self.clone();
        result.difference_with(other);
        result
    }

    /// Returns `{0..bound} \ self`.
    pub fn complement(&self, bound: usize) -> StateSet {
        let mut result = StateSet::new(bound);
        for index in 0..bound {
            if !self.contains(index) {
                result.insert(index);
            }
        }
        result
    }

    /// Returns true if every member of `self` is in `other`.
    pub fn is_subset(&self, other: &StateSet) -> bool {
        self.words.iter().enumerate().all(|(i, &w)| {
            let o = other.words.get(i).copied().unwrap_or(0);
            w & !o == 0
        })
    }

    /// Returns true if the sets share a member.
    pub fn intersects(&self, other: &StateSet) -> bool {
        self.words.iter().zip(&other.words).any(|(a, b)| a & b != 0)
    }

    /// Returns the set `{s + offset | s ∈ self}`.
    pub fn shift_up(&self, offset: usize) -> StateSet {
        let mut result = StateSet::new(self.length() + offset);
        for index in self.iter() {
            result.insert(index + offset);
        }
        result
    }

    /// Adds all indices from an iterator.
    pub fn extend(&mut self, iter: impl IntoIterator<Item = usize>) {
        for index in iter {
            self.insert(index);
        }
    }

    /// Returns an iterator over the members in increasing order.
    pub fn iter(&self) -> StateSetIter<'_> {
        StateSetIter {
            set: self,
            word_idx: 0,
            current_word: self.words.first().copied().unwrap_or(0),
        }
    }
}

impl PartialEq for StateSet {
    fn eq(&self, other: &Self) -> bool {
        if self.count != other.count {
            return false;
        }
        let n = self.words.len().max(other.words.len());
        (0..n).all(|i| self.words.get(i).copied().unwrap_or(0) == other.words.get(i).copied().unwrap_or(0))
    }
}

impl Eq for StateSet {}

impl fmt::Debug for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl fmt::Display for StateSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, s) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", s)?;
        }
        write!(f, "}}")
    }
}

impl FromIterator<usize> for StateSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = StateSet::empty();
        set.extend(iter);
        set
    }
}

impl<'a> IntoIterator for &'a StateSet {
    type Item = usize;
    type IntoIter = StateSetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the members of a [`StateSet`].
pub struct StateSetIter<'a> {
    set: &'a StateSet,
    word_idx: usize,
    current_word: u64,
}

impl Iterator for StateSetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                let bit_idx = self.current_word.trailing_zeros() as usize;
                self.current_word &= self.current_word - 1; // Clear lowest set bit
                return Some(self.word_idx * StateSet::BITS_PER_WORD + bit_idx);
            }
            self.word_idx += 1;
            if self.word_idx >= self.set.words.len() {
                return None;
            }
            self.current_word = self.set.words[self.word_idx];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        let set = StateSet::empty();
        assert!(set.is_empty());
        assert_eq!(set.len(), 0);
        assert!(!set.contains(0));
        assert!(!set.contains(100));
        assert_eq!(set.length(), 0);
    }

    #[test]
    fn test_insert_remove() {
        let mut set = StateSet::new(100);
        assert!(set.insert(42));
        assert!(!set.insert(42));
        assert!(set.contains(42));
        assert!(set.remove(42));
        assert!(!set.remove(42));
        assert!(set.is_empty());
    }

    #[test]
    fn test_auto_grow() {
        let mut set = StateSet::empty();
        set.insert(1000);
        assert!(set.contains(1000));
        assert_eq!(set.length(), 1001);
    }

    #[test]
    fn test_iter_in_order() {
        let set: StateSet = [65, 3, 64, 10, 5].into_iter().collect();
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 5, 10, 64, 65]);
        assert_eq!(set.first(), Some(3));
    }

    #[test]
    fn test_pop_first() {
        let mut set: StateSet = [5, 10, 3].into_iter().collect();
        assert_eq!(set.pop_first(), Some(3));
        assert_eq!(set.pop_first(), Some(5));
        assert_eq!(set.pop_first(), Some(10));
        assert_eq!(set.pop_first(), None);
    }

    #[test]
    fn test_set_algebra() {
        let a: StateSet = [1, 2, 3, 70].into_iter().collect();
        let b: StateSet = [2, 3, 4].into_iter().collect();
        assert_eq!(a.union(&b), [1, 2, 3, 4, 70].into_iter().collect());
        assert_eq!(a.intersection(&b), [2, 3].into_iter().collect());
        assert_eq!(a.difference(&b), [1, 70].into_iter().collect());
        assert!(a.intersects(&b));
        assert!(a.intersection(&b).is_subset(&a));
        assert!(!a.is_subset(&b));
    }

    #[test]
    fn test_complement_and_shift() {
        let a: StateSet = [0, 2].into_iter().collect();
        assert_eq!(a.complement(4), [1, 3].into_iter().collect());
        assert_eq!(a.shift_up(3), [3, 5].into_iter().collect());
        assert_eq!(StateSet::full(3), [0, 1, 2].into_iter().collect());
    }

    #[test]
    fn test_equality_ignores_capacity() {
        let mut a = StateSet::new(1000);
        a.insert(7);
        let b = StateSet::singleton(7);
        assert_eq!(a, b);
        assert_eq!(format!("{}", a), "{7}");
    }
}
