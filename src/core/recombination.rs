// src/core/recombination.rs
use crate::core::coverage::CoverageSet;
use crate::core::derivation::{DerivationArena, DerivationId, FeaturizerId, FeaturizerState};
use crate::error::Result;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

/// True when every featurizer state attached to `a` equals the one on `b`.
///
/// Equivalent derivations score their next extension alike. Rule-context
/// states are not a full summary of the history, so after a short-span
/// extension the two may stop being equivalent.
pub fn forward_equivalent(arena: &DerivationArena, a: DerivationId, b: DerivationId) -> Result<bool> {
    let left = arena.get(a)?;
    let right = arena.get(b)?;
    Ok(left.states().eq(right.states()))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RecombinationKey {
    coverage: CoverageSet,
    states: SmallVec<[(FeaturizerId, FeaturizerState); 2]>,
}

#[derive(Debug)]
struct Slot {
    best: DerivationId,
    score: f64,
    /// Merged-away derivations, kept for backtrace and n-best output.
    recombined: Vec<DerivationId>,
}

/// Result of offering a derivation to the [`Recombiner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    /// The derivation is the best of its class; `displaced` lost to it.
    Kept { displaced: Option<DerivationId> },
    /// An equivalent, better-scoring derivation already exists.
    Recombined { into: DerivationId },
}

/// Keeps the arg-max derivation per (coverage, featurizer states) class.
///
/// Merging is approximate: see [`forward_equivalent`]. A merged-away
/// derivation could have reached states its survivor cannot.
#[derive(Debug, Default)]
pub struct Recombiner {
    slots: FxHashMap<RecombinationKey, Slot>,
}

impl Recombiner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offer(&mut self, arena: &DerivationArena, id: DerivationId, score: f64) -> Result<Offer> {
        let record = arena.get(id)?;
        let key = RecombinationKey {
            coverage: record.coverage.clone(),
            states: record.states().map(|(fid, state)| (fid, state.clone())).collect(),
        };
        let Some(slot) = self.slots.get_mut(&key) else {
            self.slots.insert(
                key,
                Slot {
                    best: id,
                    score,
                    recombined: Vec::new(),
                },
            );
            return Ok(Offer::Kept { displaced: None });
        };
        if score > slot.score {
            let displaced = slot.best;
            slot.recombined.push(displaced);
            slot.best = id;
            slot.score = score;
            trace!(%id, %displaced, score, "recombined, new best");
            Ok(Offer::Kept {
                displaced: Some(displaced),
            })
        } else {
            slot.recombined.push(id);
            trace!(%id, into = %slot.best, score, "recombined into existing");
            Ok(Offer::Recombined { into: slot.best })
        }
    }

    /// Surviving derivations, best-first.
    pub fn survivors(&self) -> Vec<(DerivationId, f64)> {
        let mut out: Vec<(DerivationId, f64)> =
            self.slots.values().map(|slot| (slot.best, slot.score)).collect();
        out.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        out
    }

    /// Derivations merged into `best`, in merge order.
    pub fn recombined_into(&self, best: DerivationId) -> &[DerivationId] {
        self.slots
            .values()
            .find(|slot| slot.best == best)
            .map(|slot| slot.recombined.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuleContextConfig;
    use crate::core::class_map::{ClassMap, ClassMaps};
    use crate::core::context::RuleContext;
    use crate::core::featurizer::{featurize_and_attach, DerivationFeaturizer};
    use crate::core::types::{RuleApplication, Sequence};
    use std::sync::Arc;

    fn rule(pos: usize, src: &str) -> RuleApplication {
        RuleApplication::new(pos, Sequence::from_text(src), Sequence::from_text("t"), vec![])
    }

    #[test]
    fn different_histories_with_equal_state_recombine() {
        let classes = Arc::new(ClassMaps::new(
            ClassMap::from_pairs([("a", "A"), ("b", "B"), ("c", "C"), ("d", "D")]),
            ClassMap::new(),
        ));
        let featurizer =
            RuleContext::new(FeaturizerId(0), RuleContextConfig::default(), classes).unwrap();
        let input = featurizer.initialize(0, &Sequence::from_text("a b c d"));
        let mut arena = DerivationArena::new(0, 4);

        // a b | c d  versus  b a | c d: both end with context C D.
        let left = arena.extend(None, rule(0, "a b")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, left).unwrap();
        let left = arena.extend(Some(left), rule(2, "c d")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, left).unwrap();

        let right = arena.extend(None, rule(1, "b")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, right).unwrap();
        let right = arena.extend(Some(right), rule(0, "a")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, right).unwrap();
        let right = arena.extend(Some(right), rule(2, "c d")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, right).unwrap();

        assert!(forward_equivalent(&arena, left, right).unwrap());

        let mut recombiner = Recombiner::new();
        assert_eq!(
            recombiner.offer(&arena, left, -2.0).unwrap(),
            Offer::Kept { displaced: None }
        );
        assert_eq!(
            recombiner.offer(&arena, right, -1.0).unwrap(),
            Offer::Kept {
                displaced: Some(left)
            }
        );
        assert_eq!(recombiner.len(), 1);
        assert_eq!(recombiner.survivors(), vec![(right, -1.0)]);
        assert_eq!(recombiner.recombined_into(right), &[left]);
    }

    #[test]
    fn different_states_stay_apart() {
        let classes = Arc::new(ClassMaps::new(
            ClassMap::from_pairs([("a", "A"), ("b", "B"), ("c", "C")]),
            ClassMap::new(),
        ));
        let featurizer =
            RuleContext::new(FeaturizerId(0), RuleContextConfig::default(), classes).unwrap();
        let input = featurizer.initialize(0, &Sequence::from_text("a b c"));
        let mut arena = DerivationArena::new(0, 3);
        let first = arena.extend(None, rule(0, "a")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, first).unwrap();
        let second = arena.extend(None, rule(2, "c")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, second).unwrap();

        assert!(!forward_equivalent(&arena, first, second).unwrap());
        let mut recombiner = Recombiner::new();
        recombiner.offer(&arena, first, 0.0).unwrap();
        recombiner.offer(&arena, second, 0.0).unwrap();
        assert_eq!(recombiner.len(), 2);
        assert!(recombiner.recombined_into(first).is_empty());
    }

    #[test]
    fn equivalent_derivations_can_diverge_after_a_short_span() {
        let classes = Arc::new(ClassMaps::new(
            ClassMap::from_pairs([("a", "A"), ("b", "B"), ("c", "C"), ("d", "D")]),
            ClassMap::new(),
        ));
        let featurizer =
            RuleContext::new(FeaturizerId(0), RuleContextConfig::default(), classes).unwrap();
        let input = featurizer.initialize(0, &Sequence::from_text("a b c d"));
        let mut arena = DerivationArena::new(0, 4);

        // "a b" in one step versus "b" then "a": both cover {0, 1} with context A B.
        let whole = arena.extend(None, rule(0, "a b")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, whole).unwrap();
        let split = arena.extend(None, rule(1, "b")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, split).unwrap();
        let split = arena.extend(Some(split), rule(0, "a")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, split).unwrap();

        assert!(forward_equivalent(&arena, whole, split).unwrap());
        let mut recombiner = Recombiner::new();
        recombiner.offer(&arena, whole, 0.0).unwrap();
        assert_eq!(
            recombiner.offer(&arena, split, 0.0).unwrap(),
            Offer::Recombined { into: whole }
        );

        // The same short-span extension walks different chains.
        let whole_next = arena.extend(Some(whole), rule(3, "d")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, whole_next).unwrap();
        let split_next = arena.extend(Some(split), rule(3, "d")).unwrap();
        featurize_and_attach(&featurizer, &input, &mut arena, split_next).unwrap();

        let context = |id| match arena.get(id).unwrap().state(featurizer.id()) {
            Some(FeaturizerState::RuleContext(state)) => state.context().join(" "),
            None => panic!("no state on {id}"),
        };
        assert_eq!(context(whole_next), "B D");
        assert_eq!(context(split_next), "A D");
        assert!(!forward_equivalent(&arena, whole_next, split_next).unwrap());
    }
}
