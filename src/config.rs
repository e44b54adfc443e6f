// File: src/config.rs
use crate::error::{FeatError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONTEXT_LENGTH: usize = 2;
pub const DEFAULT_LEXICAL_CUTOFF: u64 = 50;
pub const DEFAULT_FEATURE_PREFIX: &str = "RCTX";
pub const DEFAULT_BLEU_ORDER: usize = 4;

/// Options of the rule-context featurizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleContextConfig {
    /// Fire `(context, source phrase, target phrase)` indicators.
    pub add_lexicalized: bool,
    /// Fire `(context, source classes, target classes)` indicators.
    pub add_class_based: bool,
    /// Dense score slot holding `ln(count)`. `None` disables the frequency gate.
    pub count_feature_index: Option<usize>,
    /// Lexicalized features fire only for rules seen more often than this.
    pub lexical_cutoff: u64,
    pub context_length: usize,
    /// `input_id label [aux]` file; enables domain-specific feature copies.
    pub domain_file: Option<PathBuf>,
    pub feature_prefix: String,
}

impl Default for RuleContextConfig {
    fn default() -> Self {
        Self {
            add_lexicalized: true,
            add_class_based: false,
            count_feature_index: None,
            lexical_cutoff: DEFAULT_LEXICAL_CUTOFF,
            context_length: DEFAULT_CONTEXT_LENGTH,
            domain_file: None,
            feature_prefix: DEFAULT_FEATURE_PREFIX.to_string(),
        }
    }
}

impl RuleContextConfig {
    pub fn validate(&self) -> Result<()> {
        if self.context_length == 0 {
            return Err(FeatError::InvalidConfig(
                "context_length must be at least 1".to_string(),
            ));
        }
        if !self.add_lexicalized && !self.add_class_based {
            return Err(FeatError::InvalidConfig(
                "rule context needs add_lexicalized or add_class_based".to_string(),
            ));
        }
        if self.feature_prefix.is_empty() {
            return Err(FeatError::InvalidConfig(
                "feature_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Additive smoothing applied to matched and total n-gram counts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Smoothing {
    pub unigram: f64,
    pub higher_order: f64,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self {
            unigram: 0.0,
            higher_order: 1.0,
        }
    }
}

impl Smoothing {
    pub fn for_order(&self, n: usize) -> f64 {
        if n <= 1 {
            self.unigram
        } else {
            self.higher_order
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BleuConfig {
    pub order: usize,
    pub smoothing: Smoothing,
}

impl Default for BleuConfig {
    fn default() -> Self {
        Self {
            order: DEFAULT_BLEU_ORDER,
            smoothing: Smoothing::default(),
        }
    }
}

impl BleuConfig {
    pub fn validate(&self) -> Result<()> {
        if self.order == 0 {
            return Err(FeatError::InvalidConfig(
                "BLEU order must be at least 1".to_string(),
            ));
        }
        let Smoothing {
            unigram,
            higher_order,
        } = self.smoothing;
        if !(unigram.is_finite() && higher_order.is_finite()) || unigram < 0.0 || higher_order < 0.0
        {
            return Err(FeatError::InvalidConfig(format!(
                "smoothing constants must be finite and non-negative, got {unigram} / {higher_order}"
            )));
        }
        Ok(())
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatConfig {
    pub rule_context: RuleContextConfig,
    pub bleu: BleuConfig,
}

impl FeatConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.rule_context.validate()?;
        config.bleu.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| FeatError::io(path, e))?;
        let config = Self::from_json_str(&text)?;
        debug!(path = %path.display(), ?config, "configuration loaded");
        Ok(config)
    }
}
