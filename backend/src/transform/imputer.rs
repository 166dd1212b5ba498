//! Imputer: fill missing numeric cells from a per-column statistic.
//!
//! The statistic is computed from the rows handed in, which are the rows
//! that survived the Cleaner. Imputing before filtering would let invalid
//! rows bias the median or mean.

use serde::{Deserialize, Serialize};

use crate::error::{ImputationError, ImputationResult};

/// How missing values of a column are replaced.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImputeStrategy {
    Median,
    Mean,
    Constant(f64),
}

impl ImputeStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Median => "median",
            Self::Mean => "mean",
            Self::Constant(_) => "constant",
        }
    }
}

/// What the Imputer did to one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Imputation {
    pub column: String,
    pub strategy: ImputeStrategy,
    /// Value written into every missing cell.
    pub statistic: f64,
    /// Number of cells filled.
    pub filled: usize,
    /// Number of cells that were present.
    pub observed: usize,
}

/// Median of a non-empty slice; an even count averages the two middle values.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Arithmetic mean of a non-empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Compute the statistic for `strategy` over the present cells of a column.
///
/// `non_numeric` is the number of cells the Cleaner saw as present but not
/// numeric; it only changes which error is reported when nothing numeric is
/// left.
pub fn column_statistic(
    column: &str,
    values: &[Option<f64>],
    strategy: ImputeStrategy,
    non_numeric: usize,
) -> ImputationResult<f64> {
    if let ImputeStrategy::Constant(value) = strategy {
        if !value.is_finite() {
            return Err(ImputationError::InvalidConstant {
                column: column.to_string(),
                value,
            });
        }
        return Ok(value);
    }

    let observed: Vec<f64> = values.iter().flatten().copied().collect();
    if observed.is_empty() {
        if non_numeric > 0 {
            return Err(ImputationError::NonNumeric {
                column: column.to_string(),
                count: non_numeric,
            });
        }
        return Err(ImputationError::NoObservedValues {
            column: column.to_string(),
            rows: values.len(),
        });
    }

    let stat = match strategy {
        ImputeStrategy::Median => median(&observed),
        ImputeStrategy::Mean => mean(&observed),
        ImputeStrategy::Constant(v) => Some(v),
    };
    stat.ok_or_else(|| ImputationError::NoObservedValues {
        column: column.to_string(),
        rows: values.len(),
    })
}

/// Replace every `None` in `values` with the column statistic.
///
/// An empty column (no rows at all) is a no-op with statistic `NaN` and
/// nothing filled.
pub fn impute_column(
    column: &str,
    values: &mut [Option<f64>],
    strategy: ImputeStrategy,
    non_numeric: usize,
) -> ImputationResult<Imputation> {
    if values.is_empty() {
        return Ok(Imputation {
            column: column.to_string(),
            strategy,
            statistic: f64::NAN,
            filled: 0,
            observed: 0,
        });
    }

    let statistic = column_statistic(column, values, strategy, non_numeric)?;
    let mut filled = 0;
    for cell in values.iter_mut() {
        if cell.is_none() {
            *cell = Some(statistic);
            filled += 1;
        }
    }

    Ok(Imputation {
        column: column.to_string(),
        strategy,
        statistic,
        filled,
        observed: values.len() - filled,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_fills_missing() {
        let mut values = vec![Some(30.0), None, Some(40.0), Some(50.0), None];
        let result = impute_column("speed_limit", &mut values, ImputeStrategy::Median, 0).unwrap();

        assert_eq!(result.statistic, 40.0);
        assert_eq!(result.filled, 2);
        assert_eq!(result.observed, 3);
        assert_eq!(values[1], Some(40.0));
        assert_eq!(values[4], Some(40.0));
    }

    #[test]
    fn test_median_even_count() {
        assert_eq!(median(&[20.0, 30.0, 40.0, 60.0]), Some(35.0));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_mean_fills_missing() {
        let mut values = vec![Some(1000.0), None, Some(2000.0)];
        let result =
            impute_column("engine_capacity_cc", &mut values, ImputeStrategy::Mean, 0).unwrap();
        assert_eq!(result.statistic, 1500.0);
        assert_eq!(values, vec![Some(1000.0), Some(1500.0), Some(2000.0)]);
    }

    #[test]
    fn test_constant_never_needs_observations() {
        let mut values = vec![None, None];
        let result =
            impute_column("speed_limit", &mut values, ImputeStrategy::Constant(30.0), 0).unwrap();
        assert_eq!(result.filled, 2);
        assert_eq!(values, vec![Some(30.0), Some(30.0)]);
    }

    #[test]
    fn test_all_missing_is_an_error() {
        let mut values = vec![None, None, None];
        let err = impute_column("speed_limit", &mut values, ImputeStrategy::Median, 0).unwrap_err();
        assert_eq!(
            err,
            ImputationError::NoObservedValues {
                column: "speed_limit".into(),
                rows: 3
            }
        );
        assert!(values.iter().all(Option::is_none));
    }

    #[test]
    fn test_all_non_numeric_is_an_error() {
        let mut values = vec![None, None];
        let err = impute_column("engine_capacity_cc", &mut values, ImputeStrategy::Mean, 2)
            .unwrap_err();
        assert!(matches!(err, ImputationError::NonNumeric { count: 2, .. }));
    }

    #[test]
    fn test_non_finite_constant_is_an_error() {
        let mut values = vec![None];
        let err = impute_column("speed_limit", &mut values, ImputeStrategy::Constant(f64::NAN), 0)
            .unwrap_err();
        assert!(matches!(err, ImputationError::InvalidConstant { .. }));
    }

    #[test]
    fn test_empty_column_is_noop() {
        let mut values: Vec<Option<f64>> = Vec::new();
        let result = impute_column("speed_limit", &mut values, ImputeStrategy::Median, 0).unwrap();
        assert_eq!(result.filled, 0);
    }

    #[test]
    fn test_strategy_serde_names() {
        assert_eq!(serde_json::to_string(&ImputeStrategy::Median).unwrap(), "\"median\"");
        let parsed: ImputeStrategy = serde_json::from_str(r#"{"constant": 5.5}"#).unwrap();
        assert_eq!(parsed, ImputeStrategy::Constant(5.5));
    }
}
