// src/core/types.rs
use crate::core::coverage::CoverageSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Identifies which input sentence a derivation translates.
pub type InputId = usize;

/// Marker placed in front of a context that ran into the sentence start.
pub const START_TOKEN: &str = "<s>";

/// Class assigned to tokens missing from a class map.
pub const UNKNOWN_CLASS: &str = "<unk>";

/// A shared, immutable token. Clones share one allocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Token(Arc<str>);

impl Token {
    pub fn new(text: &str) -> Self {
        Self(Arc::from(text))
    }

    pub fn start() -> Self {
        Self::new(START_TOKEN)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// An immutable token sequence. Sub-ranges, projections and concatenations
/// always allocate fresh storage, so no two sequences alias mutable memory.
#[derive(Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequence(Arc<[Token]>);

impl Sequence {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self(Arc::from(tokens))
    }

    /// Splits on whitespace.
    pub fn from_text(text: &str) -> Self {
        text.split_whitespace().map(Token::new).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.0.get(index)
    }

    pub fn tokens(&self) -> &[Token] {
        &self.0
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.0.iter()
    }

    /// Copies out `range`. Returns `None` if the range falls outside the sequence.
    pub fn subsequence(&self, range: Range<usize>) -> Option<Sequence> {
        self.0.get(range).map(|slice| Self(Arc::from(slice)))
    }

    /// Projects the sequence onto the covered positions, in ascending order.
    /// Positions past the end are skipped.
    pub fn project(&self, coverage: &CoverageSet) -> Sequence {
        coverage
            .positions()
            .filter_map(|pos| self.0.get(pos).cloned())
            .collect()
    }

    pub fn concat(&self, other: &Sequence) -> Sequence {
        self.0.iter().chain(other.0.iter()).cloned().collect()
    }

    pub fn join(&self, separator: &str) -> String {
        let mut out = String::new();
        for (i, token) in self.0.iter().enumerate() {
            if i > 0 {
                out.push_str(separator);
            }
            out.push_str(token.as_str());
        }
        out
    }
}

impl FromIterator<Token> for Sequence {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Sequence {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Debug for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.join(" "))
    }
}

/// One translation step: the source span it covers, the phrase pair, and the
/// rule's dense scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleApplication {
    /// First covered source position.
    pub source_position: usize,
    pub source: Sequence,
    pub target: Sequence,
    /// Dense rule scores. One slot may hold `ln(count)` for frequency gating.
    pub scores: Vec<f64>,
}

impl RuleApplication {
    pub fn new(source_position: usize, source: Sequence, target: Sequence, scores: Vec<f64>) -> Self {
        Self {
            source_position,
            source,
            target,
            scores,
        }
    }

    /// Number of source positions covered; equals the source phrase length.
    pub fn span_len(&self) -> usize {
        self.source.len()
    }

    pub fn span(&self) -> Range<usize> {
        self.source_position..self.source_position + self.span_len()
    }

    pub fn span_end(&self) -> usize {
        self.source_position + self.span_len()
    }
}

/// A named feature contribution handed to the scheduler's linear model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    pub name: String,
    pub value: f64,
}

impl FeatureValue {
    pub fn indicator(name: String) -> Self {
        Self { name, value: 1.0 }
    }
}
