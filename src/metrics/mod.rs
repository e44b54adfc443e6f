// src/metrics/mod.rs
pub mod bleu;

use crate::core::types::{InputId, Sequence};

/// Scores one candidate against its references.
///
/// `update` lets corpus-level variants accumulate statistics between calls;
/// sentence-level variants leave it empty.
pub trait SentenceLevelMetric: Send + Sync {
    fn score(&self, input_id: InputId, references: &[Sequence], candidate: &Sequence) -> f64;

    fn update(&mut self, input_id: InputId, references: &[Sequence], candidate: &Sequence);
}
