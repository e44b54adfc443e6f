// File: src/postprocess.rs
use crate::core::types::{Sequence, Token};
use crate::error::{FeatError, Result};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// One output token of a sequence classifier, tagged with the input token it
/// was produced from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledToken {
    pub word: String,
    pub original: String,
}

/// A trained tagger that rewrites a token sequence (re-segmentation,
/// re-casing, ...). Treated as a black box.
pub trait SequenceClassifier: Send + Sync {
    fn classify(&self, tokens: &[String]) -> Vec<LabeledToken>;
}

/// Word alignment between a decoder output and its post-processed form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alignment {
    pub source: Sequence,
    pub target: Sequence,
    /// `(source index, target index)` pairs, target-ascending.
    pub links: Vec<(usize, usize)>,
}

impl Alignment {
    /// Target indices aligned to source position `i`.
    pub fn targets_of(&self, i: usize) -> Vec<usize> {
        self.links
            .iter()
            .filter(|(s, _)| *s == i)
            .map(|(_, t)| *t)
            .collect()
    }
}

pub struct Postprocessor<C> {
    classifier: C,
}

impl<C: SequenceClassifier> Postprocessor<C> {
    pub fn new(classifier: C) -> Self {
        Self { classifier }
    }

    /// Runs the classifier over `sequence` and aligns its output back.
    ///
    /// The alignment is monotone: the source index advances each time an
    /// output token names a different original token than the current one.
    pub fn process(&self, sequence: &Sequence) -> Result<Alignment> {
        let tokens: Vec<String> = sequence.iter().map(|t| t.as_str().to_string()).collect();
        let labeled = self.classifier.classify(&tokens);
        let target: Sequence = labeled.iter().map(|l| Token::new(&l.word)).collect();

        let mut links = Vec::with_capacity(labeled.len());
        let mut i = 0;
        for (j, label) in labeled.iter().enumerate() {
            let current = sequence.get(i).ok_or_else(|| {
                FeatError::contract(format!("classifier output {j} has no source token"))
            })?;
            if label.original != current.as_str() {
                i += 1;
                if i >= sequence.len() {
                    return Err(FeatError::contract(format!(
                        "classifier output {j} ({:?}) ran past the source",
                        label.original
                    )));
                }
            }
            links.push((i, j));
        }
        trace!(source_len = sequence.len(), target_len = target.len(), "post-processed");
        Ok(Alignment {
            source: sequence.clone(),
            target,
            links,
        })
    }
}
