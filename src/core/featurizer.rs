// src/core/featurizer.rs
use crate::core::derivation::{DerivationArena, DerivationId, FeaturizerId, FeaturizerState};
use crate::core::types::{FeatureValue, InputId, Sequence};
use crate::error::Result;

/// Output of one extension step: features for the linear model and the state
/// to attach to the new derivation.
#[derive(Debug, Clone, PartialEq)]
pub struct Featurization {
    pub features: Vec<FeatureValue>,
    pub state: FeaturizerState,
}

/// A featurizer that carries state from a derivation to its extensions.
///
/// The featurizer itself is shared by every worker. Per-input data lives in
/// `Self::Input`, built once by [`initialize`](Self::initialize) before any
/// extension of that input and read-only afterwards.
pub trait DerivationFeaturizer: Send + Sync {
    type Input: Send + Sync;

    fn id(&self) -> FeaturizerId;

    fn initialize(&self, input_id: InputId, source: &Sequence) -> Self::Input;

    /// Scores the rule that produced `derivation`, reading only this
    /// featurizer's state on the parent.
    fn featurize(
        &self,
        input: &Self::Input,
        arena: &DerivationArena,
        derivation: DerivationId,
    ) -> Result<Featurization>;
}

/// Runs `featurizer` on `derivation` and attaches the resulting state.
pub fn featurize_and_attach<F: DerivationFeaturizer>(
    featurizer: &F,
    input: &F::Input,
    arena: &mut DerivationArena,
    derivation: DerivationId,
) -> Result<Vec<FeatureValue>> {
    let Featurization { features, state } = featurizer.featurize(input, arena, derivation)?;
    arena.attach_state(derivation, featurizer.id(), state)?;
    Ok(features)
}
