//! Load interface: hand the star schema to a store.
//!
//! Every [`StarSink`] runs [`check_constraints`] before writing anything, so
//! a schema with a duplicate primary key or a dangling foreign key never
//! reaches the store.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{IntegrityError, LoadResult, Violation};
use crate::models::star::{DIM_CASUALTY, DIM_COLLISION, DIM_TIME, DIM_VEHICLE, FACT_ACCIDENT};
use crate::models::StarSchema;

/// Destination of the five output tables.
pub trait StarSink {
    /// Human-readable name for logs.
    fn name(&self) -> String;

    /// Write the tables. Implementations call [`check_constraints`] first.
    fn load(&mut self, schema: &StarSchema) -> LoadResult<()>;
}

// =============================================================================
// Constraint check
// =============================================================================

fn primary_keys(
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

/// Primary-key uniqueness in every table and foreign-key existence for the
/// fact table.
pub fn check_constraints(schema: &StarSchema) -> Result<(), IntegrityError> {
    let mut violations = Vec::new();

    let time = primary_keys(DIM_TIME, schema.dim_time.iter().map(|r| r.time_key), &mut violations);
    let collision = primary_keys(
        DIM_COLLISION,
        schema.dim_collision.iter().map(|r| r.collision_key),
        &mut violations,
    );
    primary_keys(DIM_VEHICLE, schema.dim_vehicle.iter().map(|r| r.vehicle_key), &mut violations);
    primary_keys(DIM_CASUALTY, schema.dim_casualty.iter().map(|r| r.casualty_key), &mut violations);
    primary_keys(
        FACT_ACCIDENT,
        schema.fact_accident.iter().map(|r| r.collision_key),
        &mut violations,
    );

    for (fact_row, fact) in schema.fact_accident.iter().enumerate() {
        if !collision.contains(&fact.collision_key) {
            violations.push(Violation::UnresolvedForeignKey {
                fact_row,
                collision_index: String::new(),
                column: "collision_key",
                table: DIM_COLLISION,
                key: fact.collision_key,
            });
        }
        if !time.contains(&fact.time_key) {
            violations.push(Violation::UnresolvedForeignKey {
                fact_row,
                collision_index: String::new(),
                column: "time_key",
                table: DIM_TIME,
                key: fact.time_key,
            });
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(IntegrityError::Violations(violations))
    }
}

// =============================================================================
// CSV sink
// =============================================================================

/// Writes `<table>.csv` files into a directory.
///
/// Output bytes depend only on the schema, so identical runs produce
/// identical files.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: PathBuf::from(dir.as_ref()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file written for `table`.
    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }

    fn write_table<T: Serialize>(&self, table: &str, rows: &[T]) -> LoadResult<()> {
        let mut writer = csv::Writer::from_path(self.table_path(table))?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl StarSink for CsvSink {
    fn name(&self) -> String {
        format!("CSV files in {}", self.dir.display())
    }

    fn load(&mut self, schema: &StarSchema) -> LoadResult<()> {
        check_constraints(schema)?;
        fs::create_dir_all(&self.dir)?;

        self.write_table(DIM_TIME, &schema.dim_time)?;
        self.write_table(DIM_COLLISION, &schema.dim_collision)?;
        self.write_table(DIM_VEHICLE, &schema.dim_vehicle)?;
        self.write_table(DIM_CASUALTY, &schema.dim_casualty)?;
        self.write_table(FACT_ACCIDENT, &schema.fact_accident)?;
        Ok(())
    }
}

// =============================================================================
// Memory sink
// =============================================================================

/// Keeps loaded schemas in memory. Used by tests and embedders.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub loaded: Vec<StarSchema>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<&StarSchema> {
        self.loaded.last()
    }

    /// Row count per table of the last load.
    pub fn table_sizes(&self) -> BTreeMap<&'static str, usize> {
        self.last()
            .map(|s| s.table_sizes().into_iter().collect())
            .unwrap_or_default()
    }
}

impl StarSink for MemorySink {
    fn name(&self) -> String {
        "memory".to_string()
    }

    fn load(&mut self, schema: &StarSchema) -> LoadResult<()> {
        check_constraints(schema)?;
        self.loaded.push(schema.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadError;
    use crate::transform::assembler::assemble;
    use crate::transform::assembler::tests::{casualty, collision, vehicle};

    fn schema() -> StarSchema {
        assemble(
            &[collision("A1", 0, 2, 8), collision("A2", 1, 2, 9)],
            &[vehicle("A1", 0)],
            &[casualty("A2", 0)],
        )
        .unwrap()
        .schema
    }

    #[test]
    fn test_memory_sink_accepts_valid_schema() {
        let mut sink = MemorySink::new();
        sink.load(&schema()).unwrap();
        assert_eq!(sink.table_sizes()["fact_accident"], 2);
    }

    #[test]
    fn test_dangling_foreign_key_rejected() {
        let mut broken = schema();
        broken.fact_accident[0].collision_key = 42;

        let mut sink = MemorySink::new();
        let err = sink.load(&broken).unwrap_err();
        assert!(matches!(err, LoadError::Constraint(_)));
        assert!(sink.loaded.is_empty());
    }

    #[test]
    fn test_duplicate_dimension_key_rejected() {
        let mut broken = schema();
        broken.dim_time.push(broken.dim_time[0].clone());
        let err = check_constraints(&broken).unwrap_err();
        assert!(matches!(
            err.violations()[0],
            Violation::DuplicateKey { table: "dim_time", .. }
        ));
    }

    #[test]
    fn test_csv_sink_writes_five_tables() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvSink::new(dir.path().join("out"));
        sink.load(&schema()).unwrap();

        for table in [DIM_TIME, DIM_COLLISION, DIM_VEHICLE, DIM_CASUALTY, FACT_ACCIDENT] {
            assert!(sink.table_path(table).exists(), "{table} missing");
        }

        let vehicles = fs::read_to_string(sink.table_path(DIM_VEHICLE)).unwrap();
        let header = vehicles.lines().next().unwrap();
        assert_eq!(
            header,
            "vehicle_key,type,engine_capacity,propulsion_petrol,propulsion_diesel,\
             propulsion_electric,propulsion_hybrid,propulsion_other,driver_age"
        );

        let time = fs::read_to_string(sink.table_path(DIM_TIME)).unwrap();
        assert!(time.contains("2023-01-02,2023,1,Monday,8"));
    }
}
