//! IntegrityValidator: referential integrity and row accounting checks.
//!
//! Runs after assembly and before load. Every check runs to completion and
//! all violations are returned together, so a single failed run shows the
//! full extent of the damage.
//!
//! # Checks
//!
//! - every `fact_accident` foreign key resolves in its dimension
//! - primary keys are unique in every table
//! - at most one fact row per collision (grain)
//! - no dimension is empty while its source table had rows
//! - every `dim_collision` / `dim_time` row is referenced by a fact
//! - vehicle and casualty lineage points at a loaded collision
//! - stage counts add up: `rows_in - drops == rows_out`, each stage starts
//!   where the previous one ended, and the last stage matches the table size

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{IntegrityError, Violation};
use crate::models::star::{DIM_CASUALTY, DIM_COLLISION, DIM_TIME, DIM_VEHICLE, FACT_ACCIDENT};
use crate::models::{Dataset, LineageEntry, StarSchema};
use crate::transform::pipeline::RunReport;

/// What a successful check covered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegritySummary {
    pub foreign_keys_checked: usize,
    pub lineage_checked: usize,
    pub stages_checked: usize,
    pub tables: BTreeMap<String, usize>,
}

/// Check `schema` against itself and against the row accounting in `report`.
pub fn validate_star(
    schema: &StarSchema,
    report: &RunReport,
) -> Result<IntegritySummary, IntegrityError> {
    let mut violations = Vec::new();

    let time_keys = unique_keys(DIM_TIME, schema.dim_time.iter().map(|r| r.time_key), &mut violations);
    let collision_keys = unique_keys(
        DIM_COLLISION,
        schema.dim_collision.iter().map(|r| r.collision_key),
        &mut violations,
    );
    let vehicle_keys = unique_keys(
        DIM_VEHICLE,
        schema.dim_vehicle.iter().map(|r| r.vehicle_key),
        &mut violations,
    );
    let casualty_keys = unique_keys(
        DIM_CASUALTY,
        schema.dim_casualty.iter().map(|r| r.casualty_key),
        &mut violations,
    );

    let foreign_keys_checked = check_facts(schema, &collision_keys, &time_keys, &mut violations);

    check_empty_dimensions(schema, report, &mut violations);

    let loaded: HashSet<&str> = schema
        .lineage
        .collisions
        .iter()
        .filter(|e| collision_keys.contains(&e.key))
        .map(|e| e.collision_index.as_str())
        .collect();
    let lineage_checked = check_lineage(DIM_VEHICLE, &schema.lineage.vehicles, &vehicle_keys, &loaded, &mut violations)
        + check_lineage(DIM_CASUALTY, &schema.lineage.casualties, &casualty_keys, &loaded, &mut violations);

    let stages_checked = check_accounting(schema, report, &mut violations);

    if !violations.is_empty() {
        return Err(IntegrityError::Violations(violations));
    }

    Ok(IntegritySummary {
        foreign_keys_checked,
        lineage_checked,
        stages_checked,
        tables: schema
            .table_sizes()
            .iter()
            .map(|(t, n)| (t.to_string(), *n))
            .collect(),
    })
}

/// Collect keys, reporting each repeated one.
fn unique_keys(
    table: &'static str,
    keys: impl Iterator<Item = u64>,
    violations: &mut Vec<Violation>,
) -> HashSet<u64> {
    let mut seen = HashSet::new();
    for key in keys {
        if !seen.insert(key) {
            violations.push(Violation::DuplicateKey { table, key });
        }
    }
    seen
}

/// Foreign keys and grain of `fact_accident`. Returns the number of keys checked.
fn check_facts(
    schema: &StarSchema,
    collision_keys: &HashSet<u64>,
    time_keys: &HashSet<u64>,
    violations: &mut Vec<Violation>,
) -> usize {
    let natural: HashMap<u64, &str> = schema
        .lineage
        .collisions
        .iter()
        .map(|e| (e.key, e.collision_index.as_str()))
        .collect();

    let mut per_collision: BTreeMap<u64, usize> = BTreeMap::new();
    let mut referenced_collisions = HashSet::new();
    let mut referenced_times = HashSet::new();
    let mut checked = 0;

    for (fact_row, fact) in schema.fact_accident.iter().enumerate() {
        *per_collision.entry(fact.collision_key).or_default() += 1;
        referenced_collisions.insert(fact.collision_key);
        referenced_times.insert(fact.time_key);

        for (column, table, key, keys) in [
            ("collision_key", DIM_COLLISION, fact.collision_key, collision_keys),
            ("time_key", DIM_TIME, fact.time_key, time_keys),
        ] {
            checked += 1;
            if !keys.contains(&key) {
                violations.push(Violation::UnresolvedForeignKey {
                    fact_row,
                    collision_index: natural
                        .get(&fact.collision_key)
                        .map(|s| s.to_string())
                        .unwrap_or_default(),
                    column,
                    table,
                    key,
                });
            }
        }
    }

    for (collision_key, count) in per_collision {
        if count > 1 {
            violations.push(Violation::GrainViolation { collision_key, count });
        }
    }

    for row in &schema.dim_collision {
        if !referenced_collisions.contains(&row.collision_key) {
            violations.push(Violation::OrphanedDimensionRow {
                table: DIM_COLLISION,
                key: row.collision_key,
            });
        }
    }
    for row in &schema.dim_time {
        if !referenced_times.contains(&row.time_key) {
            violations.push(Violation::OrphanedDimensionRow {
                table: DIM_TIME,
                key: row.time_key,
            });
        }
    }

    checked
}

fn check_empty_dimensions(schema: &StarSchema, report: &RunReport, violations: &mut Vec<Violation>) {
    let checks = [
        (DIM_TIME, schema.dim_time.len(), Dataset::Collisions),
        (DIM_COLLISION, schema.dim_collision.len(), Dataset::Collisions),
        (FACT_ACCIDENT, schema.fact_accident.len(), Dataset::Collisions),
        (DIM_VEHICLE, schema.dim_vehicle.len(), Dataset::Vehicles),
        (DIM_CASUALTY, schema.dim_casualty.len(), Dataset::Casualties),
    ];
    for (table, rows, dataset) in checks {
        let source_rows = report.source_rows(dataset).unwrap_or(0);
        if rows == 0 && source_rows > 0 {
            violations.push(Violation::EmptyDimension { table, source_rows });
        }
    }
}

/// Lineage of one per-source-row dimension. Returns the number of entries checked.
fn check_lineage(
    table: &'static str,
    entries: &[LineageEntry],
    keys: &HashSet<u64>,
    loaded_collisions: &HashSet<&str>,
    violations: &mut Vec<Violation>,
) -> usize {
    for entry in entries {
        if !keys.contains(&entry.key) || !loaded_collisions.contains(entry.collision_index.as_str()) {
            violations.push(Violation::DanglingLineage {
                table,
                key: entry.key,
                collision_index: entry.collision_index.clone(),
            });
        }
    }
    entries.len()
}

/// Row accounting per dataset. Returns the number of stage counts checked.
fn check_accounting(schema: &StarSchema, report: &RunReport, violations: &mut Vec<Violation>) -> usize {
    let mut checked = 0;

    for dataset in Dataset::ALL {
        let mut previous_out: Option<usize> = None;

        for count in report.stages_for(dataset) {
            checked += 1;
            let stage = count.stage.to_string();

            let expected = count.rows_in.saturating_sub(count.dropped());
            if count.rows_in < count.dropped() || expected != count.rows_out {
                violations.push(Violation::UnexplainedRowLoss {
                    stage: stage.clone(),
                    dataset,
                    expected,
                    actual: count.rows_out,
                });
            }
            if let Some(previous) = previous_out {
                if previous != count.rows_in {
                    violations.push(Violation::UnexplainedRowLoss {
                        stage,
                        dataset,
                        expected: previous,
                        actual: count.rows_in,
                    });
                }
            }
            previous_out = Some(count.rows_out);
        }

        if let Some(last) = previous_out {
            let (table, rows) = match dataset {
                Dataset::Collisions => (DIM_COLLISION, schema.dim_collision.len()),
                Dataset::Vehicles => (DIM_VEHICLE, schema.dim_vehicle.len()),
                Dataset::Casualties => (DIM_CASUALTY, schema.dim_casualty.len()),
            };
            if last != rows {
                violations.push(Violation::UnexplainedRowLoss {
                    stage: table.to_string(),
                    dataset,
                    expected: last,
                    actual: rows,
                });
            }
        }
    }

    checked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::parser::RawTable;
    use crate::transform::cleaner::clean_casualties;
    use crate::transform::assembler::assemble;
    use crate::transform::assembler::tests::{casualty, collision, vehicle};
    use crate::transform::pipeline::{Stage, StageCount, StagePlan};

    fn valid_schema() -> StarSchema {
        let collisions = vec![collision("A1", 0, 2, 8), collision("A2", 1, 3, 9)];
        let vehicles = vec![vehicle("A1", 0), vehicle("A2", 1)];
        let casualties = vec![casualty("A2", 0)];
        assemble(&collisions, &vehicles, &casualties).unwrap().schema
    }

    fn empty_report() -> RunReport {
        RunReport::new(PipelineConfig::default(), StagePlan::standard())
    }

    #[test]
    fn test_valid_schema_passes() {
        let summary = validate_star(&valid_schema(), &empty_report()).unwrap();
        assert_eq!(summary.foreign_keys_checked, 4);
        assert_eq!(summary.lineage_checked, 3);
        assert_eq!(summary.tables["fact_accident"], 2);
    }

    #[test]
    fn test_corrupted_time_key_rejected() {
        let mut schema = valid_schema();
        schema.fact_accident[1].time_key = 999;

        let err = validate_star(&schema, &empty_report()).unwrap_err();
        let violations = err.violations();
        assert!(violations.iter().any(|v| matches!(
            v,
            Violation::UnresolvedForeignKey { fact_row: 1, column: "time_key", key: 999, collision_index, .. }
                if collision_index == "A2"
        )));
        // The time row A2 pointed at is now unreferenced.
        assert!(violations
            .iter()
            .any(|v| matches!(v, Violation::OrphanedDimensionRow { table: "dim_time", .. })));
    }

    #[test]
    fn test_grain_violation() {
        let mut schema = valid_schema();
        let duplicate = schema.fact_accident[0].clone();
        schema.fact_accident.push(duplicate);

        let err = validate_star(&schema, &empty_report()).unwrap_err();
        assert!(err
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::GrainViolation { count: 2, .. })));
    }

    #[test]
    fn test_duplicate_primary_key() {
        let mut schema = valid_schema();
        schema.dim_vehicle[1].vehicle_key = schema.dim_vehicle[0].vehicle_key;

        let err = validate_star(&schema, &empty_report()).unwrap_err();
        assert!(err
            .violations()
            .iter()
            .any(|v| matches!(v, Violation::DuplicateKey { table: "dim_vehicle", .. })));
    }

    #[test]
    fn test_dangling_lineage() {
        let mut schema = valid_schema();
        schema.lineage.casualties[0].collision_index = "NOPE".into();

        let err = validate_star(&schema, &empty_report()).unwrap_err();
        assert!(err.violations().iter().any(|v| matches!(
            v,
            Violation::DanglingLineage { table: "dim_casualty", .. }
        )));
    }

    #[test]
    fn test_unexplained_row_loss() {
        let schema = valid_schema();
        let mut report = empty_report();
        report.stages.push(StageCount {
            stage: Stage::Clean(Dataset::Vehicles),
            dataset: Dataset::Vehicles,
            rows_in: 5,
            rows_out: 2,
            drops: BTreeMap::from([("driver_age_out_of_range".to_string(), 1)]),
        });

        let err = validate_star(&schema, &report).unwrap_err();
        assert!(err.violations().iter().any(|v| matches!(
            v,
            Violation::UnexplainedRowLoss { dataset: Dataset::Vehicles, expected: 4, actual: 2, .. }
        )));
    }

    #[test]
    fn test_empty_dimension_with_rows_in_source() {
        let mut schema = valid_schema();
        schema.dim_casualty.clear();
        schema.lineage.casualties.clear();

        let mut report = empty_report();
        report.stages.clear();
        let clean = clean_casualties(&RawTable::from_json_rows(
            Dataset::Casualties,
            vec![serde_json::json!({
                "collision_index": "A1", "casualty_reference": "1", "casualty_class": "1",
                "age_of_casualty": "", "casualty_severity": "3"
            })],
        ))
        .unwrap()
        .report;
        assert_eq!(clean.rows_out, 0);
        report.cleaning.push(clean);

        let err = validate_star(&schema, &report).unwrap_err();
        assert!(err.violations().iter().any(|v| matches!(
            v,
            Violation::EmptyDimension { table: "dim_casualty", source_rows: 1 }
        )));
    }
}
