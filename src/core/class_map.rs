// src/core/class_map.rs
use crate::core::types::{Sequence, Token, UNKNOWN_CLASS};
use crate::error::{FeatError, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Maps surface tokens to coarser class tokens (e.g. word clusters).
/// Built once, then shared read-only behind an `Arc`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMap {
    classes: FxHashMap<Token, Token>,
}

impl ClassMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut map = Self::new();
        for (token, class) in pairs {
            map.insert(token, class);
        }
        map
    }

    pub fn insert(&mut self, token: &str, class: &str) {
        self.classes.insert(Token::new(token), Token::new(class));
    }

    /// Loads `token<TAB>class` lines. Blank lines and `#` comments are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| FeatError::io(path, e))?;
        let mut map = Self::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next(), fields.next()) {
                (Some(token), Some(class), None) => map.insert(token, class),
                _ => {
                    return Err(FeatError::Parse {
                        path: path.to_path_buf(),
                        line: index + 1,
                        reason: format!("expected `token<TAB>class`, got {line:?}"),
                    })
                }
            }
        }
        info!(path = %path.display(), entries = map.len(), "class map loaded");
        Ok(map)
    }

    /// Class of `token`, or the reserved unknown class.
    pub fn get(&self, token: &Token) -> Token {
        self.classes
            .get(token)
            .cloned()
            .unwrap_or_else(|| Token::new(UNKNOWN_CLASS))
    }

    /// Maps every token of `sequence` to its class.
    pub fn map_sequence(&self, sequence: &Sequence) -> Sequence {
        sequence.iter().map(|token| self.get(token)).collect()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// The source- and target-side class maps, injected into every featurizer
/// that needs class context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassMaps {
    pub source: ClassMap,
    pub target: ClassMap,
}

impl ClassMaps {
    pub fn new(source: ClassMap, target: ClassMap) -> Self {
        Self { source, target }
    }
}
