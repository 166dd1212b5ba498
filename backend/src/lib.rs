//! # Roadsafety - STATS19 collision data to a star schema
//!
//! Roadsafety cleans the three road-safety source tables (collisions,
//! vehicles, casualties), imputes and derives features, and assembles a
//! star schema ready for loading into an analytical store.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────┐   ┌─────────┐   ┌──────────┐   ┌─────────┐
//! │ raw tables │──▶│ Cleaner │──▶│ Imputer │──▶│ Features │──▶│ Sampler │
//! └────────────┘   └─────────┘   └─────────┘   └──────────┘   └────┬────┘
//!                                                                  │
//! ┌────────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐    │
//! │ load sink  │◀──│ Integrity │◀──│ Assembler │◀──│   Keys   │◀───┘
//! └────────────┘   └───────────┘   └───────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use roadsafety::{run, MemorySink, PipelineConfig, SourceTables};
//!
//! let sources = SourceTables::from_csv_files("collisions.csv", "vehicles.csv", "casualties.csv")?;
//! let mut sink = MemorySink::new();
//! let report = run(&sources, &PipelineConfig::default(), &mut sink)?;
//! println!("{} facts", report.tables["fact_accident"]);
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Pipeline configuration and its JSON Schema
//! - [`logs`] - Pipeline log entries on top of `tracing`
//! - [`models`] - Code sets, typed records and star schema rows
//! - [`parser`] - Raw tables and CSV extraction
//! - [`transform`] - Cleaning, imputation, features, sampling, keys, assembly
//! - [`validation`] - Referential integrity and row accounting
//! - [`load`] - Load sinks

// Core modules
pub mod config;
pub mod error;
pub mod logs;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Loading
pub mod load;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigError, CsvError, ImputationError, IntegrityError, LoadError, PipelineError,
    PipelineResult, SchemaError, ValidationError, Violation,
};

// =============================================================================
// Re-exports - Configuration
// =============================================================================

pub use config::PipelineConfig;

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    AgeGroup, CasualtyClass, Dataset, Propulsion, RoadType, Severity, StarSchema, VehicleType,
    Weather,
};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_file_auto,
    parse_csv_str, RawTable,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    build_star_schema, build_with_plan, run, RunReport, SourceTables, Stage, StageCount,
    StagePlan,
};
pub use transform::ImputeStrategy;

// =============================================================================
// Re-exports - Validation and load
// =============================================================================

pub use load::{check_constraints, CsvSink, MemorySink, StarSink};
pub use validation::{validate_star, IntegritySummary};
