//! Pipeline configuration.
//!
//! Configuration is an explicit object passed to the pipeline. It can be
//! built in code (`PipelineConfig::default()`) or loaded from JSON, in which
//! case the document is first checked against the embedded JSON Schema
//! (`schemas/pipeline-config.json`) so unknown options are rejected before
//! any row is processed.
//!
//! # Example
//!
//! ```rust,ignore
//! use roadsafety::PipelineConfig;
//!
//! let config = PipelineConfig::from_json(r#"{ "sample_fraction": 0.25, "seed": 7 }"#)?;
//! assert_eq!(config.age_min, 17);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};
use crate::transform::imputer::ImputeStrategy;

/// Options recognised by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Youngest valid driver age, inclusive.
    pub age_min: u32,

    /// Oldest valid driver age, inclusive.
    pub age_max: u32,

    /// Fraction of vehicle rows kept by the Sampler.
    pub sample_fraction: f64,

    /// How missing speed limits are filled.
    pub speed_limit_strategy: ImputeStrategy,

    /// How missing engine capacities are filled.
    pub engine_capacity_strategy: ImputeStrategy,

    /// Seed for the Sampler.
    pub seed: u64,

    /// Share of a dataset's rows that may fail row-level validation before
    /// the run is aborted.
    pub max_invalid_row_fraction: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            age_min: 17,
            age_max: 90,
            sample_fraction: 0.10,
            speed_limit_strategy: ImputeStrategy::Median,
            engine_capacity_strategy: ImputeStrategy::Mean,
            seed: 42,
            max_invalid_row_fraction: 0.10,
        }
    }
}

impl PipelineConfig {
    /// Parse, schema-check and range-check a JSON configuration document.
    ///
    /// Options left out take their default value.
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        let document: Value = serde_json::from_str(json)?;
        check_schema(&document)?;
        let config: Self = serde_json::from_value(document)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Check value ranges that the schema cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.age_min > self.age_max {
            return Err(ConfigError::OutOfRange {
                option: "age_min",
                message: format!("{} is greater than age_max {}", self.age_min, self.age_max),
            });
        }
        if !(self.sample_fraction > 0.0 && self.sample_fraction <= 1.0) {
            return Err(ConfigError::OutOfRange {
                option: "sample_fraction",
                message: format!("{} is not in (0, 1]", self.sample_fraction),
            });
        }
        if !(0.0..=1.0).contains(&self.max_invalid_row_fraction) {
            return Err(ConfigError::OutOfRange {
                option: "max_invalid_row_fraction",
                message: format!("{} is not in [0, 1]", self.max_invalid_row_fraction),
            });
        }
        for (option, strategy) in [
            ("speed_limit_strategy", self.speed_limit_strategy),
            ("engine_capacity_strategy", self.engine_capacity_strategy),
        ] {
            if let ImputeStrategy::Constant(v) = strategy {
                if !v.is_finite() {
                    return Err(ConfigError::OutOfRange {
                        option,
                        message: format!("constant {v} is not finite"),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Validate a configuration document against the embedded JSON Schema.
fn check_schema(document: &Value) -> ConfigResult<()> {
    let schema: Value = serde_json::from_str(include_str!("../schemas/pipeline-config.json"))?;
    let validator = jsonschema::draft7::new(&schema).map_err(|e| ConfigError::Schema {
        errors: vec![format!("invalid embedded schema: {e}")],
    })?;

    let errors: Vec<String> = validator
        .iter_errors(document)
        .map(|e| e.to_string())
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Schema { errors })
    }
}
