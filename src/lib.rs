// src/lib.rs

pub mod config;
pub mod core;
pub mod error;
pub mod metrics;
pub mod persistence;
pub mod postprocess;

pub use crate::config::{BleuConfig, FeatConfig, RuleContextConfig, Smoothing};
pub use crate::core::context::{ContextState, RuleContext};
pub use crate::error::{FeatError, Result};
pub use crate::metrics::bleu::SmoothedBleu;
