//! Transformation module.
//!
//! Stages of the star schema build, leaf first:
//! - Cleaner: schema contract, validity rules, column pruning
//! - Imputer: median / mean / constant fill of numeric columns
//! - FeatureDeriver: risk index, propulsion encoding, age bins
//! - Sampler: seeded subset of vehicles
//! - KeyAssigner: run-wide surrogate keys
//! - SchemaAssembler: dimension, fact and lineage tables
//! - Pipeline: stage plan, orchestration and run report

pub mod assembler;
pub mod cleaner;
pub mod features;
pub mod imputer;
pub mod keys;
pub mod pipeline;
pub mod sampler;

pub use assembler::{assemble, Assembly, KeyPlan};
pub use cleaner::{clean_casualties, clean_collisions, clean_vehicles, CleanReport, Cleaned, SchemaContract};
pub use features::{age_group, encode_propulsion, risk_index};
pub use imputer::{impute_column, Imputation, ImputeStrategy};
pub use keys::{DimensionPolicy, KeyAssigner, KeyBlock, KeySequence};
pub use pipeline::*;
pub use sampler::{sample, SampleSummary};
