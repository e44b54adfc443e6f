// src/core/mod.rs
pub mod class_map;
pub mod context;
pub mod coverage;
pub mod derivation;
pub mod domain;
pub mod featurizer;
pub mod recombination;
pub mod types;
