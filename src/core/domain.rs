// src/core/domain.rs
use crate::core::types::InputId;
use crate::error::{FeatError, Result};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Domain (genre) label of one input, plus the auxiliary integer carried in
/// the domain file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainInfo {
    pub label: String,
    pub aux: i64,
}

/// Input id -> domain info. Loaded at configuration time, read-only after.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainTable {
    entries: FxHashMap<InputId, DomainInfo>,
}

impl DomainTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, input_id: InputId, label: &str, aux: i64) {
        self.entries.insert(
            input_id,
            DomainInfo {
                label: label.to_string(),
                aux,
            },
        );
    }

    /// Loads `input_id label [aux]` lines; `aux` defaults to 0.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(FeatError::MissingDomainFile(path.to_path_buf()));
        }
        let text = fs::read_to_string(path).map_err(|e| FeatError::io(path, e))?;
        let mut table = Self::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let parse_error = |reason: String| FeatError::Parse {
                path: path.to_path_buf(),
                line: index + 1,
                reason,
            };
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 2 || fields.len() > 3 {
                return Err(parse_error(format!(
                    "expected `input_id label [aux]`, got {line:?}"
                )));
            }
            let input_id: InputId = fields[0]
                .parse()
                .map_err(|_| parse_error(format!("bad input id {:?}", fields[0])))?;
            let aux = match fields.get(2) {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| parse_error(format!("bad auxiliary value {raw:?}")))?,
                None => 0,
            };
            table.insert(input_id, fields[1], aux);
        }
        info!(path = %path.display(), inputs = table.len(), "domain table loaded");
        Ok(table)
    }

    pub fn contains(&self, input_id: InputId) -> bool {
        self.entries.contains_key(&input_id)
    }

    pub fn get(&self, input_id: InputId) -> Option<&DomainInfo> {
        self.entries.get(&input_id)
    }

    /// Domain label of `input_id`, or `None` for "no domain".
    pub fn label(&self, input_id: InputId) -> Option<&str> {
        self.get(input_id).map(|info| info.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
