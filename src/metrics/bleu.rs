// src/metrics/bleu.rs
use crate::config::{BleuConfig, Smoothing};
use crate::core::types::{InputId, Sequence, Token};
use crate::error::Result;
use crate::metrics::SentenceLevelMetric;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use tracing::debug;

type NgramCounts<'a> = FxHashMap<&'a [Token], u64>;

fn ngram_counts(tokens: &[Token], order: usize) -> NgramCounts<'_> {
    let mut counts = NgramCounts::default();
    for n in 1..=order {
        for window in tokens.windows(n) {
            *counts.entry(window).or_insert(0) += 1;
        }
    }
    counts
}

/// Per n-gram, the largest count seen in any single reference.
fn max_reference_counts<'a>(references: &'a [Sequence], order: usize) -> NgramCounts<'a> {
    let mut max_counts = NgramCounts::default();
    for reference in references {
        for (ngram, count) in ngram_counts(reference.tokens(), order) {
            let slot = max_counts.entry(ngram).or_insert(0);
            *slot = (*slot).max(count);
        }
    }
    max_counts
}

/// Length of the reference closest to `candidate_len`; ties go to the shorter.
fn closest_reference_len(references: &[Sequence], candidate_len: usize) -> usize {
    references
        .iter()
        .map(Sequence::len)
        .min_by_key(|&len| (len.abs_diff(candidate_len), len))
        .unwrap_or(0)
}

/// Sufficient statistics of BLEU. Sentence statistics add up to corpus
/// statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BleuStats {
    /// Clipped n-gram matches, index `n - 1`.
    pub matches: Vec<u64>,
    /// Candidate n-gram totals, index `n - 1`.
    pub totals: Vec<u64>,
    pub candidate_len: u64,
    pub reference_len: u64,
}

impl BleuStats {
    pub fn empty(order: usize) -> Self {
        Self {
            matches: vec![0; order],
            totals: vec![0; order],
            candidate_len: 0,
            reference_len: 0,
        }
    }

    pub fn from_sentence(references: &[Sequence], candidate: &Sequence, order: usize) -> Self {
        let mut stats = Self::empty(order);
        let reference_counts = max_reference_counts(references, order);
        for (ngram, count) in ngram_counts(candidate.tokens(), order) {
            let clip = reference_counts.get(ngram).copied().unwrap_or(0);
            stats.matches[ngram.len() - 1] += count.min(clip);
        }
        let len = candidate.len();
        for n in 1..=order {
            stats.totals[n - 1] = (len + 1).saturating_sub(n) as u64;
        }
        stats.candidate_len = len as u64;
        stats.reference_len = closest_reference_len(references, len) as u64;
        stats
    }

    pub fn order(&self) -> usize {
        self.matches.len()
    }

    /// Geometric mean of smoothed precisions times the brevity penalty.
    /// An empty candidate, or any zero precision, scores 0.
    pub fn score(&self, smoothing: &Smoothing) -> f64 {
        if self.candidate_len == 0 || self.order() == 0 {
            return 0.0;
        }
        let order = self.order() as f64;
        let mut log_precision = 0.0;
        for (index, (&matched, &total)) in self.matches.iter().zip(&self.totals).enumerate() {
            let add = smoothing.for_order(index + 1);
            let denominator = total as f64 + add;
            if denominator <= 0.0 {
                return 0.0;
            }
            let precision = (matched as f64 + add) / denominator;
            if precision <= 0.0 {
                return 0.0;
            }
            log_precision += precision.ln() / order;
        }
        self.brevity_penalty() * log_precision.exp()
    }

    /// `exp(1 - r/c)` for a candidate shorter than its reference, else 1.
    pub fn brevity_penalty(&self) -> f64 {
        if self.candidate_len == 0 {
            return 0.0;
        }
        let (c, r) = (self.candidate_len as f64, self.reference_len as f64);
        if c < r {
            (1.0 - r / c).exp()
        } else {
            1.0
        }
    }
}

impl AddAssign<&BleuStats> for BleuStats {
    fn add_assign(&mut self, other: &BleuStats) {
        if self.order() < other.order() {
            self.matches.resize(other.order(), 0);
            self.totals.resize(other.order(), 0);
        }
        for (index, (&matched, &total)) in other.matches.iter().zip(&other.totals).enumerate() {
            self.matches[index] += matched;
            self.totals[index] += total;
        }
        self.candidate_len += other.candidate_len;
        self.reference_len += other.reference_len;
    }
}

/// Smoothed sentence-level BLEU (BLEU+1 by default). Holds no per-sentence
/// state, so `update` does nothing.
#[derive(Debug, Clone)]
pub struct SmoothedBleu {
    config: BleuConfig,
}

impl SmoothedBleu {
    pub fn new(config: BleuConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BleuConfig {
        &self.config
    }

    pub fn stats(&self, references: &[Sequence], candidate: &Sequence) -> BleuStats {
        BleuStats::from_sentence(references, candidate, self.config.order)
    }
}

impl Default for SmoothedBleu {
    fn default() -> Self {
        Self {
            config: BleuConfig::default(),
        }
    }
}

impl SentenceLevelMetric for SmoothedBleu {
    fn score(&self, _input_id: InputId, references: &[Sequence], candidate: &Sequence) -> f64 {
        self.stats(references, candidate).score(&self.config.smoothing)
    }

    fn update(&mut self, _input_id: InputId, _references: &[Sequence], _candidate: &Sequence) {}
}

/// Unsmoothed corpus BLEU over the sentences fed to `update`. `score` reports
/// the corpus BLEU that would result from adding the candidate.
#[derive(Debug, Clone)]
pub struct CorpusBleu {
    order: usize,
    totals: BleuStats,
    sentences: usize,
}

impl CorpusBleu {
    pub fn new(order: usize) -> Self {
        Self {
            order,
            totals: BleuStats::empty(order),
            sentences: 0,
        }
    }

    pub fn totals(&self) -> &BleuStats {
        &self.totals
    }

    pub fn corpus_score(&self) -> f64 {
        self.totals.score(&Smoothing {
            unigram: 0.0,
            higher_order: 0.0,
        })
    }
}

impl SentenceLevelMetric for CorpusBleu {
    fn score(&self, _input_id: InputId, references: &[Sequence], candidate: &Sequence) -> f64 {
        let mut stats = self.totals.clone();
        stats += &BleuStats::from_sentence(references, candidate, self.order);
        stats.score(&Smoothing {
            unigram: 0.0,
            higher_order: 0.0,
        })
    }

    fn update(&mut self, input_id: InputId, references: &[Sequence], candidate: &Sequence) {
        self.totals += &BleuStats::from_sentence(references, candidate, self.order);
        self.sentences += 1;
        debug!(input_id, sentences = self.sentences, "corpus BLEU statistics updated");
    }
}
