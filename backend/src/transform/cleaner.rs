//! Cleaner: schema contract checks, validity rules and column pruning.
//!
//! Each dataset is cleaned independently. A raw table is first checked
//! against its [`SchemaContract`]; a missing required column is fatal.
//! Rows are then typed one by one. A row that breaks a hard rule becomes a
//! [`ValidationError`] and is dropped; rows removed by a documented filter
//! (driver age bounds, missing casualty age) are dropped without being
//! treated as invalid. Every drop is counted by rule name.

use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};

use crate::error::{SchemaError, ValidationError};
use crate::models::{
    CasualtyClass, CasualtyRecord, CollisionRecord, Dataset, RoadType, Severity, VehicleRecord,
    VehicleType, Weather,
};
use crate::parser::{
    cell_text, integer_cell, is_missing, numeric_cell, plain_numeric_cell, NumericCell, RawTable,
};

/// Number of validation errors kept verbatim in a report.
const MAX_SAMPLED_ERRORS: usize = 20;

/// Rule names of the documented filters.
pub const RULE_DRIVER_AGE_MISSING: &str = "driver_age_missing";
pub const RULE_DRIVER_AGE_OUT_OF_RANGE: &str = "driver_age_out_of_range";
pub const RULE_CASUALTY_AGE_MISSING: &str = "casualty_age_missing";

// =============================================================================
// Schema contract
// =============================================================================

/// Columns a raw table must (or may) carry.
#[derive(Debug, Clone, Copy)]
pub struct SchemaContract {
    pub dataset: Dataset,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

/// Older extracts use `accident_*` where current ones use `collision_*`.
const ALIASES: [(&str, &str); 2] = [
    ("accident_index", "collision_index"),
    ("accident_severity", "collision_severity"),
];

pub const COLLISION_CONTRACT: SchemaContract = SchemaContract {
    dataset: Dataset::Collisions,
    required: &[
        "collision_index",
        "date",
        "time",
        "collision_severity",
        "number_of_vehicles",
        "number_of_casualties",
        "weather_conditions",
        "road_type",
        "speed_limit",
    ],
    optional: &["latitude", "longitude"],
};

pub const VEHICLE_CONTRACT: SchemaContract = SchemaContract {
    dataset: Dataset::Vehicles,
    required: &[
        "collision_index",
        "vehicle_reference",
        "vehicle_type",
        "engine_capacity_cc",
        "propulsion_code",
        "age_of_driver",
    ],
    optional: &[],
};

pub const CASUALTY_CONTRACT: SchemaContract = SchemaContract {
    dataset: Dataset::Casualties,
    required: &[
        "collision_index",
        "casualty_reference",
        "casualty_class",
        "age_of_casualty",
        "casualty_severity",
    ],
    optional: &["vehicle_reference"],
};

impl SchemaContract {
    pub fn for_dataset(dataset: Dataset) -> Self {
        match dataset {
            Dataset::Collisions => COLLISION_CONTRACT,
            Dataset::Vehicles => VEHICLE_CONTRACT,
            Dataset::Casualties => CASUALTY_CONTRACT,
        }
    }

    /// The contract's own name for `column`, if it is part of the contract.
    fn column(&self, column: &str) -> Option<&'static str> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .find(|c| **c == column)
            .copied()
    }

    /// Map contract columns to the header names used by `table`.
    ///
    /// Returns the mapping and the list of source columns that are dropped.
    pub fn bind(&self, table: &RawTable) -> Result<ColumnMap, SchemaError> {
        let mut columns = BTreeMap::new();
        let mut dropped = Vec::new();

        for header in &table.headers {
            match self.column(canonical_name(header)) {
                Some(column) if !columns.contains_key(column) => {
                    columns.insert(column, header.clone());
                }
                _ => dropped.push(header.clone()),
            }
        }

        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|c| !columns.contains_key(*c))
            .map(|c| c.to_string())
            .collect();

        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns {
                dataset: self.dataset,
                missing,
            });
        }

        Ok(ColumnMap { columns, dropped })
    }
}

fn canonical_name(header: &str) -> &str {
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == header)
        .map(|(_, canonical)| *canonical)
        .unwrap_or(header)
}

/// Contract column -> source header, plus the headers left behind.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    columns: BTreeMap<&'static str, String>,
    pub dropped: Vec<String>,
}

impl ColumnMap {
    fn get<'r>(&self, row: &'r Map<String, Value>, column: &str) -> Option<&'r Value> {
        self.columns.get(column).and_then(|h| row.get(h))
    }
}

// =============================================================================
// Report
// =============================================================================

/// Per-dataset record of what the Cleaner removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanReport {
    pub dataset: Dataset,
    pub rows_in: usize,
    pub rows_out: usize,
    /// Rows dropped per rule, documented filters and validation failures alike.
    pub drops: BTreeMap<String, usize>,
    /// Rows dropped because of a [`ValidationError`].
    pub invalid_rows: usize,
    /// First few validation errors, for diagnostics.
    pub sample_errors: Vec<ValidationError>,
    pub dropped_columns: Vec<String>,
    /// Present-but-non-numeric cells per numeric column (treated as missing).
    pub non_numeric: BTreeMap<String, usize>,
}

impl CleanReport {
    fn new(dataset: Dataset, rows_in: usize, dropped_columns: Vec<String>) -> Self {
        Self {
            dataset,
            rows_in,
            rows_out: 0,
            drops: BTreeMap::new(),
            invalid_rows: 0,
            sample_errors: Vec::new(),
            dropped_columns,
            non_numeric: BTreeMap::new(),
        }
    }

    fn record_filter(&mut self, rule: &str) {
        *self.drops.entry(rule.to_string()).or_default() += 1;
    }

    fn record_invalid(&mut self, error: ValidationError) {
        *self.drops.entry(error.rule()).or_default() += 1;
        self.invalid_rows += 1;
        if self.sample_errors.len() < MAX_SAMPLED_ERRORS {
            self.sample_errors.push(error);
        }
    }

    fn record_non_numeric(&mut self, column: &str) {
        *self.non_numeric.entry(column.to_string()).or_default() += 1;
    }

    pub fn total_dropped(&self) -> usize {
        self.drops.values().sum()
    }

    pub fn non_numeric_count(&self, column: &str) -> usize {
        self.non_numeric.get(column).copied().unwrap_or(0)
    }

    /// Share of input rows that failed validation.
    pub fn invalid_fraction(&self) -> f64 {
        if self.rows_in == 0 {
            0.0
        } else {
            self.invalid_rows as f64 / self.rows_in as f64
        }
    }
}

/// Typed records and the report that produced them.
#[derive(Debug, Clone)]
pub struct Cleaned<T> {
    pub records: Vec<T>,
    pub report: CleanReport,
}

// =============================================================================
// Row reader
// =============================================================================

/// Typed access to one raw row through a [`ColumnMap`].
struct RowReader<'a> {
    row: &'a Map<String, Value>,
    index: usize,
    columns: &'a ColumnMap,
}

enum Outcome<T> {
    Keep(T),
    Filtered(&'static str),
    Invalid(ValidationError),
}

impl<'a> RowReader<'a> {
    fn cell(&self, column: &str) -> Option<&'a Value> {
        self.columns.get(self.row, column)
    }

    fn raw(&self, column: &str) -> String {
        self.cell(column)
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default()
    }

    fn missing(&self, column: &str) -> ValidationError {
        ValidationError::Missing {
            row: self.index,
            column: column.to_string(),
        }
    }

    fn unparseable(&self, column: &str) -> ValidationError {
        ValidationError::Unparseable {
            row: self.index,
            column: column.to_string(),
            value: self.raw(column),
        }
    }

    fn text(&self, column: &str) -> Result<String, ValidationError> {
        cell_text(self.cell(column)).ok_or_else(|| self.missing(column))
    }

    fn required_int(&self, column: &str) -> Result<i64, ValidationError> {
        match integer_cell(self.cell(column)) {
            NumericCell::Number(v) => Ok(v as i64),
            NumericCell::Missing => Err(self.missing(column)),
            NumericCell::Invalid => Err(self.unparseable(column)),
        }
    }

    fn count(&self, column: &str) -> Result<u32, ValidationError> {
        let value = self.required_int(column)?;
        u32::try_from(value).map_err(|_| self.unparseable(column))
    }

    /// Integer code where missing or garbage decodes to "unknown" downstream.
    fn optional_code(&self, column: &str) -> Option<i64> {
        match integer_cell(self.cell(column)) {
            NumericCell::Number(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Numeric cell where a non-numeric value is counted and treated as missing.
    fn optional_number(&self, column: &str, report: &mut CleanReport) -> Option<f64> {
        Self::counted(column, numeric_cell(self.cell(column)), report)
    }

    /// Like [`Self::optional_number`] but `-1` is a real value, not the sentinel.
    fn optional_coordinate(&self, column: &str, report: &mut CleanReport) -> Option<f64> {
        Self::counted(column, plain_numeric_cell(self.cell(column)), report)
    }

    fn counted(column: &str, cell: NumericCell, report: &mut CleanReport) -> Option<f64> {
        match cell {
            NumericCell::Number(v) => Some(v),
            NumericCell::Missing => None,
            NumericCell::Invalid => {
                report.record_non_numeric(column);
                None
            }
        }
    }

    fn severity(&self, column: &str) -> Result<Severity, ValidationError> {
        let code = self.required_int(column)?;
        Severity::from_code(code).ok_or_else(|| ValidationError::UnknownCode {
            row: self.index,
            column: column.to_string(),
            value: self.raw(column),
        })
    }
}

/// Parse the date formats found in STATS19 releases.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    const FORMATS: [&str; 3] = ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"];
    let raw = raw.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Parse `HH:MM` or `HH:MM:SS` and return the hour.
pub fn parse_hour(raw: &str) -> Option<u32> {
    const FORMATS: [&str; 2] = ["%H:%M", "%H:%M:%S"];
    let raw = raw.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
        .map(|t| t.hour())
}

/// Apply `parse` to every row of `table` after binding its contract.
fn clean_with<T>(
    table: &RawTable,
    contract: SchemaContract,
    mut parse: impl FnMut(&RowReader<'_>, &mut CleanReport) -> Outcome<T>,
) -> Result<Cleaned<T>, SchemaError> {
    let columns = contract.bind(table)?;
    let mut report = CleanReport::new(contract.dataset, table.len(), columns.dropped.clone());
    let mut records = Vec::with_capacity(table.len());

    for (index, row) in table.rows.iter().enumerate() {
        let reader = RowReader {
            row,
            index,
            columns: &columns,
        };
        match parse(&reader, &mut report) {
            Outcome::Keep(record) => records.push(record),
            Outcome::Filtered(rule) => report.record_filter(rule),
            Outcome::Invalid(error) => report.record_invalid(error),
        }
    }

    report.rows_out = records.len();
    Ok(Cleaned { records, report })
}

macro_rules! try_row {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(e) => return Outcome::Invalid(e),
        }
    };
}

// =============================================================================
// Collisions
// =============================================================================

/// Clean the collision table.
///
/// OSGR easting/northing and every other non-contract column are dropped.
/// Rows with an unparseable date or time, an unknown severity, bad counts or
/// a repeated collision index are invalid.
pub fn clean_collisions(table: &RawTable) -> Result<Cleaned<CollisionRecord>, SchemaError> {
    let mut seen: HashSet<String> = HashSet::new();

    clean_with(table, COLLISION_CONTRACT, |r, report| {
        let collision_index = try_row!(r.text("collision_index"));

        let date_raw = try_row!(r.text("date"));
        let date = try_row!(parse_date(&date_raw).ok_or_else(|| r.unparseable("date")));
        let time_raw = try_row!(r.text("time"));
        let hour = try_row!(parse_hour(&time_raw).ok_or_else(|| r.unparseable("time")));

        let severity = try_row!(r.severity("collision_severity"));
        let number_of_vehicles = try_row!(r.count("number_of_vehicles"));
        let number_of_casualties = try_row!(r.count("number_of_casualties"));

        if !seen.insert(collision_index.clone()) {
            return Outcome::Invalid(ValidationError::DuplicateCollision {
                row: r.index,
                collision_index,
            });
        }

        Outcome::Keep(CollisionRecord {
            source_row: r.index,
            collision_index,
            date,
            hour,
            severity,
            number_of_vehicles,
            number_of_casualties,
            weather: Weather::from_code(r.optional_code("weather_conditions")),
            road_type: RoadType::from_code(r.optional_code("road_type")),
            speed_limit: r.optional_number("speed_limit", report),
            latitude: r.optional_coordinate("latitude", report),
            longitude: r.optional_coordinate("longitude", report),
        })
    })
}

// =============================================================================
// Vehicles
// =============================================================================

/// Clean the vehicle table.
///
/// Driver ages outside `[age_min, age_max]` (inclusive), and missing ages,
/// are filtered out rather than imputed. Missing engine capacity is kept for
/// the Imputer.
pub fn clean_vehicles(
    table: &RawTable,
    age_min: u32,
    age_max: u32,
) -> Result<Cleaned<VehicleRecord>, SchemaError> {
    clean_with(table, VEHICLE_CONTRACT, |r, report| {
        let collision_index = try_row!(r.text("collision_index"));
        let vehicle_reference = try_row!(r.count("vehicle_reference"));

        let driver_age = match integer_cell(r.cell("age_of_driver")) {
            NumericCell::Missing => return Outcome::Filtered(RULE_DRIVER_AGE_MISSING),
            NumericCell::Invalid => return Outcome::Invalid(r.unparseable("age_of_driver")),
            NumericCell::Number(v) => v,
        };
        if driver_age < age_min as f64 || driver_age > age_max as f64 {
            return Outcome::Filtered(RULE_DRIVER_AGE_OUT_OF_RANGE);
        }

        Outcome::Keep(VehicleRecord {
            source_row: r.index,
            collision_index,
            vehicle_reference,
            vehicle_type: VehicleType::from_code(r.optional_code("vehicle_type")),
            engine_capacity_cc: r.optional_number("engine_capacity_cc", report),
            propulsion_code: r.optional_code("propulsion_code"),
            driver_age: driver_age as u32,
        })
    })
}

// =============================================================================
// Casualties
// =============================================================================

/// Clean the casualty table.
///
/// A missing casualty age removes the row; it is never imputed.
pub fn clean_casualties(table: &RawTable) -> Result<Cleaned<CasualtyRecord>, SchemaError> {
    clean_with(table, CASUALTY_CONTRACT, |r, _report| {
        let collision_index = try_row!(r.text("collision_index"));
        let casualty_reference = try_row!(r.count("casualty_reference"));

        if is_missing(r.cell("age_of_casualty")) {
            return Outcome::Filtered(RULE_CASUALTY_AGE_MISSING);
        }
        let age = try_row!(r.count("age_of_casualty"));

        let class_code = try_row!(r.required_int("casualty_class"));
        let class = try_row!(CasualtyClass::from_code(class_code).ok_or_else(|| {
            ValidationError::UnknownCode {
                row: r.index,
                column: "casualty_class".to_string(),
                value: r.raw("casualty_class"),
            }
        }));
        let severity = try_row!(r.severity("casualty_severity"));

        let vehicle_reference = r
            .optional_code("vehicle_reference")
            .and_then(|v| u32::try_from(v).ok());

        Outcome::Keep(CasualtyRecord {
            source_row: r.index,
            collision_index,
            vehicle_reference,
            casualty_reference,
            class,
            age,
            severity,
        })
    })
}
