// src/core/coverage.rs
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::ops::Range;

const WORD_BITS: usize = 64;

/// Set of translated source positions, stored as a bitset.
///
/// Words are only ever added, never trimmed, and only as far as the highest
/// set bit, so the derived equality and hash agree with set equality.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoverageSet {
    words: SmallVec<[u64; 2]>,
}

impl CoverageSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_span(span: Range<usize>) -> Self {
        let mut set = Self::new();
        for pos in span {
            set.insert(pos);
        }
        set
    }

    /// Marks `pos` as covered. Used on working copies owned by the caller.
    pub fn insert(&mut self, pos: usize) {
        let word = pos / WORD_BITS;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (pos % WORD_BITS);
    }

    pub fn contains(&self, pos: usize) -> bool {
        self.words
            .get(pos / WORD_BITS)
            .is_some_and(|word| word & (1u64 << (pos % WORD_BITS)) != 0)
    }

    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Returns a new set with `span` added; the receiver is untouched.
    pub fn union_span(&self, span: Range<usize>) -> CoverageSet {
        let mut out = self.clone();
        for pos in span {
            out.insert(pos);
        }
        out
    }

    pub fn overlaps(&self, span: Range<usize>) -> bool {
        span.into_iter().any(|pos| self.contains(pos))
    }

    /// Covered positions in ascending order.
    pub fn positions(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            let base = index * WORD_BITS;
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let offset = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(base + offset)
            })
        })
    }
}

impl std::fmt::Debug for CoverageSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.positions()).finish()
    }
}
