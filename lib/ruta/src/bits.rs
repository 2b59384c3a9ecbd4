use std::fmt;

/// A set of small non-negative integers packed into 64-bit words. Item and
/// requirement indices go well past what a single machine word can hold, so
/// the storage grows by whole words as members demand it.
///
/// Trailing zero words are always trimmed, which keeps the derived equality
/// and hashing canonical regardless of how a set was built.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Bits {
    words: Vec<u64>,
}

impl Bits {
    /// Returns the empty set.
    pub fn new() -> Self {
        Bits { words: vec![] }
    }

    /// Builds a set containing exactly the given indices.
    pub fn of(indices: &[usize]) -> Self {
        let mut bits = Bits::new();
        for &index in indices {
            bits.insert(index);
        }
        bits
    }

    /// Returns a copy of this set with `index` added.
    pub fn with(&self, index: usize) -> Self {
        let mut ret = self.clone();
        ret.insert(index);
        ret
    }

    /// Returns a copy of this set with `index` removed.
    pub fn without(&self, index: usize) -> Self {
        let mut ret = self.clone();
        ret.remove(index);
        ret
    }

    /// Adds `index` to the set.
    pub fn insert(&mut self, index: usize) {
        let word = index / 64;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (index % 64);
    }

    /// Removes `index` from the set.
    pub fn remove(&mut self, index: usize) {
        let word = index / 64;
        if word < self.words.len() {
            self.words[word] &= !(1u64 << (index % 64));
            self.trim();
        }
    }

    /// Returns true if `index` is a member of the set.
    pub fn has(&self, index: usize) -> bool {
        match self.words.get(index / 64) {
            Some(word) => (word >> (index % 64)) & 1 == 1,
            None => false,
        }
    }

    /// Returns true if every member of `other` is also a member of this set.
    pub fn contains_all(&self, other: &Bits) -> bool {
        for (i, &word) in other.words.iter().enumerate() {
            if self.words.get(i).copied().unwrap_or(0) & word != word {
                return false;
            }
        }
        true
    }

    /// Returns the members of this set which are not members of `other`.
    pub fn difference(&self, other: &Bits) -> Bits {
        let words = self
            .words
            .iter()
            .enumerate()
            .map(|(i, &word)| word & !other.words.get(i).copied().unwrap_or(0))
            .collect();

        let mut ret = Bits { words };
        ret.trim();
        ret
    }

    /// Returns the union of this set and `other`.
    pub fn union(&self, other: &Bits) -> Bits {
        let (longer, shorter) = if self.words.len() >= other.words.len() {
            (self, other)
        } else {
            (other, self)
        };

        let mut words = longer.words.clone();
        for (i, &word) in shorter.words.iter().enumerate() {
            words[i] |= word;
        }
        Bits { words }
    }

    /// Returns true if the set has no members.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns the number of members.
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterates over the members from the lowest index to the highest.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64)
                .filter(move |bit| (word >> bit) & 1 == 1)
                .map(move |bit| i * 64 + bit)
        })
    }

    // Drop trailing zero words so equal sets compare equal.
    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl fmt::Debug for Bits {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}
