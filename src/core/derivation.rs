// src/core/derivation.rs
use crate::core::context::ContextState;
use crate::core::coverage::CoverageSet;
use crate::core::types::{InputId, RuleApplication};
use crate::error::{FeatError, Result};
use smallvec::SmallVec;
use std::fmt;

/// Handle of a derivation record inside a [`DerivationArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DerivationId(u32);

impl DerivationId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DerivationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d{}", self.0)
    }
}

/// Stable identity of a stateful featurizer within one decoder setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeaturizerId(pub u16);

/// State a featurizer attaches to a derivation. One variant per stateful
/// featurizer kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FeaturizerState {
    RuleContext(ContextState),
}

/// One immutable step of a derivation's ancestor chain.
#[derive(Debug, Clone)]
pub struct DerivationRecord {
    pub id: DerivationId,
    /// `None` for a sentence-initial extension.
    pub parent: Option<DerivationId>,
    pub rule: RuleApplication,
    /// Parent coverage plus this rule's span.
    pub coverage: CoverageSet,
    pub input_id: InputId,
    states: SmallVec<[(FeaturizerId, FeaturizerState); 2]>,
}

impl DerivationRecord {
    pub fn state(&self, featurizer: FeaturizerId) -> Option<&FeaturizerState> {
        self.states
            .binary_search_by_key(&featurizer, |(id, _)| *id)
            .ok()
            .map(|slot| &self.states[slot].1)
    }

    /// Attached states ordered by featurizer id.
    pub fn states(&self) -> impl Iterator<Item = (FeaturizerId, &FeaturizerState)> + '_ {
        self.states.iter().map(|(id, state)| (*id, state))
    }
}

/// Append-only store of the derivations explored for one input sentence.
/// Records refer to parents by handle, so shared prefixes cost nothing and
/// the chain needs no reference counting.
#[derive(Debug)]
pub struct DerivationArena {
    input_id: InputId,
    source_len: usize,
    records: Vec<DerivationRecord>,
}

impl DerivationArena {
    pub fn new(input_id: InputId, source_len: usize) -> Self {
        Self {
            input_id,
            source_len,
            records: Vec::new(),
        }
    }

    pub fn input_id(&self) -> InputId {
        self.input_id
    }

    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records the application of `rule` on top of `parent`.
    ///
    /// The span must be non-empty, inside the source, and disjoint from the
    /// parent's coverage.
    pub fn extend(
        &mut self,
        parent: Option<DerivationId>,
        rule: RuleApplication,
    ) -> Result<DerivationId> {
        if rule.span_len() == 0 {
            return Err(FeatError::contract("rule covers an empty source span"));
        }
        if rule.span_end() > self.source_len {
            return Err(FeatError::contract(format!(
                "span {:?} exceeds source length {}",
                rule.span(),
                self.source_len
            )));
        }
        let coverage = match parent {
            Some(parent_id) => {
                let parent_coverage = &self.get(parent_id)?.coverage;
                if parent_coverage.overlaps(rule.span()) {
                    return Err(FeatError::contract(format!(
                        "span {:?} overlaps coverage of {parent_id}",
                        rule.span()
                    )));
                }
                parent_coverage.union_span(rule.span())
            }
            None => CoverageSet::from_span(rule.span()),
        };
        let id = u32::try_from(self.records.len())
            .map(DerivationId)
            .map_err(|_| FeatError::contract("derivation arena is full"))?;
        self.records.push(DerivationRecord {
            id,
            parent,
            rule,
            coverage,
            input_id: self.input_id,
            states: SmallVec::new(),
        });
        Ok(id)
    }

    pub fn get(&self, id: DerivationId) -> Result<&DerivationRecord> {
        self.records
            .get(id.index())
            .ok_or_else(|| FeatError::contract(format!("unknown derivation {id}")))
    }

    /// Attaches `featurizer`'s state to `id`. Each featurizer writes at most
    /// once per derivation.
    pub fn attach_state(
        &mut self,
        id: DerivationId,
        featurizer: FeaturizerId,
        state: FeaturizerState,
    ) -> Result<()> {
        let record = self
            .records
            .get_mut(id.index())
            .ok_or_else(|| FeatError::contract(format!("unknown derivation {id}")))?;
        match record
            .states
            .binary_search_by_key(&featurizer, |(existing, _)| *existing)
        {
            Ok(_) => Err(FeatError::contract(format!(
                "featurizer {} already attached state to {id}",
                featurizer.0
            ))),
            Err(slot) => {
                record.states.insert(slot, (featurizer, state));
                Ok(())
            }
        }
    }

    /// Walks from `id` back to the sentence-initial derivation.
    pub fn ancestors(&self, id: DerivationId) -> Ancestors<'_> {
        Ancestors {
            arena: self,
            next: Some(id),
        }
    }

    /// Rules of the chain ending at `id`, in application order.
    pub fn backtrace(&self, id: DerivationId) -> Vec<&RuleApplication> {
        let mut rules: Vec<&RuleApplication> =
            self.ancestors(id).map(|record| &record.rule).collect();
        rules.reverse();
        rules
    }
}

pub struct Ancestors<'a> {
    arena: &'a DerivationArena,
    next: Option<DerivationId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a DerivationRecord;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.arena.records.get(self.next?.index())?;
        self.next = record.parent;
        Some(record)
    }
}
