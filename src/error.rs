// File: src/error.rs
use std::path::PathBuf;

/// Errors surfaced by featurizer construction, resource loading and the
/// per-extension contract checks.
///
/// Lookup misses (unseen tokens, unseen input ids) and rules without a count
/// score are not errors; they resolve to documented fallbacks at the call site.
#[derive(Debug, thiserror::Error)]
pub enum FeatError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A resource file had a malformed line.
    #[error("{path}:{line}: {reason}")]
    Parse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Domain features were requested but the domain file is absent.
    #[error("domain file {0} does not exist; domain features cannot be enabled")]
    MissingDomainFile(PathBuf),

    #[error("snapshot encoding failed: {0}")]
    Snapshot(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The decoder pipeline broke an invariant (bad span, wrong state type,
    /// dangling derivation handle). Fatal to the enclosing search.
    #[error("contract violation: {0}")]
    ContractViolation(String),
}

impl FeatError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn contract(reason: impl Into<String>) -> Self {
        Self::ContractViolation(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, FeatError>;
