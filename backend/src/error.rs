//! Error types for the road-safety star schema pipeline.
//!
//! This module defines one error type per concern:
//!
//! - [`CsvError`] - reading and decoding source extracts
//! - [`SchemaError`] - a raw table does not honour its column contract
//! - [`ValidationError`] - a single raw row fails a hard validity rule
//! - [`ImputationError`] - no statistic can be computed for a column
//! - [`IntegrityError`] - the assembled star schema is inconsistent
//! - [`ConfigError`] - unrecognised or out-of-range configuration
//! - [`LoadError`] - the load sink rejected or failed to persist the tables
//! - [`PipelineError`] - top-level orchestration errors
//!
//! Row-level [`ValidationError`]s are recovered locally (the row is dropped
//! and counted). Everything else converts into [`PipelineError`] via `From`,
//! so `?` works across stage boundaries.

use serde::Serialize;
use thiserror::Error;

use crate::models::Dataset;

// =============================================================================
// CSV Errors
// =============================================================================

/// Errors while reading a source extract.
#[derive(Debug, Error)]
pub enum CsvError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed CSV content.
    #[error("Invalid CSV format at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Empty file.
    #[error("CSV file is empty")]
    EmptyFile,

    /// No headers found.
    #[error("No headers found in CSV")]
    NoHeaders,
}

// =============================================================================
// Schema Contract Errors
// =============================================================================

/// A raw table does not carry the columns its dataset contract requires.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// Required columns are absent from the header.
    #[error("{dataset} table is missing required columns: {}", .missing.join(", "))]
    MissingColumns {
        dataset: Dataset,
        missing: Vec<String>,
    },
}

// =============================================================================
// Row Validation Errors
// =============================================================================

/// A raw row failed a hard validity rule.
///
/// Never propagated on its own: the Cleaner drops the row and records the
/// error in its report.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// A required cell is absent.
    #[error("row {row}: missing value for '{column}'")]
    Missing { row: usize, column: String },

    /// A cell could not be parsed into its declared type.
    #[error("row {row}: cannot parse '{column}' from '{value}'")]
    Unparseable {
        row: usize,
        column: String,
        value: String,
    },

    /// A coded cell holds a code outside its closed set.
    #[error("row {row}: unknown code '{value}' for '{column}'")]
    UnknownCode {
        row: usize,
        column: String,
        value: String,
    },

    /// The collision index was already seen in an earlier row.
    #[error("row {row}: duplicate collision index '{collision_index}'")]
    DuplicateCollision { row: usize, collision_index: String },
}

impl ValidationError {
    /// Rule name used when counting drops.
    pub fn rule(&self) -> String {
        match self {
            Self::Missing { column, .. } => format!("missing_{column}"),
            Self::Unparseable { column, .. } => format!("unparseable_{column}"),
            Self::UnknownCode { column, .. } => format!("unknown_{column}"),
            Self::DuplicateCollision { .. } => "duplicate_collision_index".to_string(),
        }
    }

    /// Source row the error refers to.
    pub fn row(&self) -> usize {
        match self {
            Self::Missing { row, .. }
            | Self::Unparseable { row, .. }
            | Self::UnknownCode { row, .. }
            | Self::DuplicateCollision { row, .. } => *row,
        }
    }
}

// =============================================================================
// Imputation Errors
// =============================================================================

/// No safe imputation statistic exists for a column.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ImputationError {
    /// Every cell of the column is missing.
    #[error("cannot impute '{column}': all {rows} values are missing")]
    NoObservedValues { column: String, rows: usize },

    /// Every present cell of the column is non-numeric.
    #[error("cannot impute '{column}': {count} present values are all non-numeric")]
    NonNumeric { column: String, count: usize },

    /// The constant strategy was given a non-finite value.
    #[error("cannot impute '{column}': constant {value} is not finite")]
    InvalidConstant { column: String, value: f64 },
}

// =============================================================================
// Integrity Errors
// =============================================================================

/// A single referential-integrity or accounting violation.
#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    /// A fact row points at a key that its dimension does not contain.
    #[error("fact row {fact_row} (collision '{collision_index}'): {column} {key} not found in {table}")]
    UnresolvedForeignKey {
        fact_row: usize,
        collision_index: String,
        column: &'static str,
        table: &'static str,
        key: u64,
    },

    /// A natural key has no dimension row in the key mapping.
    #[error("{table}: natural key '{natural_key}' has no surrogate key")]
    UnmappedNaturalKey {
        table: &'static str,
        natural_key: String,
    },

    /// A per-source-row dimension was handed the same natural key twice.
    #[error("{table}: natural key '{natural_key}' appears more than once")]
    DuplicateNaturalKey {
        table: &'static str,
        natural_key: String,
    },

    /// The same primary key appears twice in a table.
    #[error("{table}: duplicate primary key {key}")]
    DuplicateKey { table: &'static str, key: u64 },

    /// More than one fact row exists for a collision.
    #[error("fact_accident: {count} rows for collision_key {collision_key}")]
    GrainViolation { collision_key: u64, count: usize },

    /// A dimension is empty although its source table was not.
    #[error("{table} is empty but its source had {source_rows} rows")]
    EmptyDimension {
        table: &'static str,
        source_rows: usize,
    },

    /// A dimension row that no fact row references.
    #[error("{table}: key {key} is not referenced by any fact row")]
    OrphanedDimensionRow { table: &'static str, key: u64 },

    /// A vehicle or casualty row traces back to a collision that is not loaded.
    #[error("{table}: key {key} belongs to collision '{collision_index}' which is not in dim_collision")]
    DanglingLineage {
        table: &'static str,
        key: u64,
        collision_index: String,
    },

    /// Rows disappeared from a stage without a documented rule.
    #[error("{stage} ({dataset}): expected {expected} rows out, found {actual}")]
    UnexplainedRowLoss {
        stage: String,
        dataset: Dataset,
        expected: usize,
        actual: usize,
    },
}

/// The assembled star schema is not safe to load.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrityError {
    /// One or more violations were found.
    #[error("{} integrity violation(s), first: {}", .0.len(), .0.first().map(|v| v.to_string()).unwrap_or_default())]
    Violations(Vec<Violation>),
}

impl IntegrityError {
    /// All violations carried by this error.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Violations(v) => v,
        }
    }
}

impl From<Violation> for IntegrityError {
    fn from(violation: Violation) -> Self {
        Self::Violations(vec![violation])
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Configuration rejected at startup, before any row is processed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document does not match the configuration schema.
    #[error("Invalid configuration: {}", .errors.join("; "))]
    Schema { errors: Vec<String> },

    /// A value is outside its accepted range.
    #[error("Configuration option '{option}' out of range: {message}")]
    OutOfRange { option: &'static str, message: String },

    /// The document is not valid JSON.
    #[error("Configuration JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failed to read the configuration file.
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Load Errors
// =============================================================================

/// Errors raised by a load sink.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The tables violate a primary-key or foreign-key constraint.
    #[error("Load rejected: {0}")]
    Constraint(#[from] IntegrityError),

    /// IO failure while persisting.
    #[error("Load IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV serialisation failure.
    #[error("Load CSV error: {0}")]
    Csv(#[from] csv::Error),
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the error type returned by [`crate::transform::pipeline::run`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Source extract could not be read.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Column contract violated.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Imputation failed.
    #[error("Imputation error: {0}")]
    Imputation(#[from] ImputationError),

    /// Integrity check failed.
    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Load sink failure.
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    /// Stage descriptor is out of order.
    #[error("Stage order error: {0}")]
    StageOrder(String),

    /// Row-level validation failures exceeded the configured threshold.
    #[error("{dataset}: {invalid} of {total} rows failed validation (limit {limit:.0}%)")]
    TooManyInvalidRows {
        dataset: Dataset,
        invalid: usize,
        total: usize,
        limit: f64,
    },
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for imputation.
pub type ImputationResult<T> = Result<T, ImputationError>;

/// Result type for configuration handling.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type for load operations.
pub type LoadResult<T> = Result<T, LoadError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
