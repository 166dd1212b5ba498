//! High-level pipeline API: raw tables in, star schema out.
//!
//! The pipeline runs the stages of a [`StagePlan`] strictly in sequence:
//! cleaning, imputation and feature derivation per dataset, vehicle
//! sampling, key assignment with assembly, then the integrity check. Any
//! fatal error aborts the run before the load sink is touched.
//!
//! # Example
//!
//! ```rust,ignore
//! use roadsafety::{run, CsvSink, PipelineConfig, SourceTables};
//!
//! let sources = SourceTables::from_csv_files("collisions.csv", "vehicles.csv", "casualties.csv")?;
//! let mut sink = CsvSink::new("out");
//! let report = run(&sources, &PipelineConfig::default(), &mut sink)?;
//! println!("run {} loaded {} facts", report.run_id, report.tables["fact_accident"]);
//! ```

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::{CsvResult, PipelineError, PipelineResult};
use crate::load::StarSink;
use crate::logs::{log_error, log_info, log_info_indent, log_success, log_warning_indent};
use crate::models::{
    CasualtyRecord, CollisionRecord, Dataset, EnrichedCasualty, EnrichedCollision,
    EnrichedVehicle, StarSchema, VehicleRecord,
};
use crate::parser::{parse_csv_file_auto, RawTable};
use crate::validation::{validate_star, IntegritySummary};

use super::assembler::{assemble, RULE_COLLISION_NOT_RETAINED};
use super::cleaner::{clean_casualties, clean_collisions, clean_vehicles, CleanReport};
use super::features::{enrich_casualty, enrich_collision, enrich_vehicle};
use super::imputer::{impute_column, Imputation};
use super::sampler::{sample, SampleSummary};

/// Drop rule for vehicle rows not selected by the Sampler.
pub const RULE_SAMPLED_OUT: &str = "sampled_out";

// =============================================================================
// Stage plan
// =============================================================================

/// One step of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "stage", content = "dataset", rename_all = "snake_case")]
pub enum Stage {
    Clean(Dataset),
    Impute(Dataset),
    Derive(Dataset),
    Sample(Dataset),
    /// Key assignment and table assembly across all datasets.
    Assemble,
    Validate,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clean(_) => "clean",
            Self::Impute(_) => "impute",
            Self::Derive(_) => "derive",
            Self::Sample(_) => "sample",
            Self::Assemble => "assemble",
            Self::Validate => "validate",
        }
    }

    pub fn dataset(&self) -> Option<Dataset> {
        match self {
            Self::Clean(d) | Self::Impute(d) | Self::Derive(d) | Self::Sample(d) => Some(*d),
            Self::Assemble | Self::Validate => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dataset() {
            Some(d) => write!(f, "{}({})", self.name(), d),
            None => f.write_str(self.name()),
        }
    }
}

/// Datasets that carry an imputable column.
fn has_imputable_column(dataset: Dataset) -> bool {
    matches!(dataset, Dataset::Collisions | Dataset::Vehicles)
}

/// Ordered list of stages for a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    /// The default ordering.
    pub fn standard() -> Self {
        let mut stages: Vec<Stage> = Dataset::ALL.iter().map(|d| Stage::Clean(*d)).collect();
        stages.push(Stage::Impute(Dataset::Collisions));
        stages.push(Stage::Impute(Dataset::Vehicles));
        stages.extend(Dataset::ALL.iter().map(|d| Stage::Derive(*d)));
        stages.push(Stage::Sample(Dataset::Vehicles));
        stages.push(Stage::Assemble);
        stages.push(Stage::Validate);
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Reject plans whose ordering would let a stage see data that an
    /// earlier stage has not yet produced.
    pub fn check(&self) -> PipelineResult<()> {
        let position = |stage: Stage| self.stages.iter().position(|s| *s == stage);
        let err = |msg: String| Err(PipelineError::StageOrder(msg));

        for (i, stage) in self.stages.iter().enumerate() {
            if self.stages[..i].contains(stage) {
                return err(format!("{stage} appears more than once"));
            }
        }

        for dataset in Dataset::ALL {
            let clean = position(Stage::Clean(dataset));
            let impute = position(Stage::Impute(dataset));
            let derive = position(Stage::Derive(dataset));

            let Some(clean) = clean else {
                return err(format!("{} is missing", Stage::Clean(dataset)));
            };
            let Some(derive) = derive else {
                return err(format!("{} is missing", Stage::Derive(dataset)));
            };

            match (has_imputable_column(dataset), impute) {
                (true, None) => return err(format!("{} is missing", Stage::Impute(dataset))),
                (true, Some(impute)) => {
                    if impute < clean {
                        return err(format!("impute({dataset}) runs before clean({dataset})"));
                    }
                    if derive < impute {
                        return err(format!("derive({dataset}) runs before impute({dataset})"));
                    }
                }
                (false, Some(_)) => {
                    return err(format!("{dataset} has no imputable column"));
                }
                (false, None) => {}
            }
            if derive < clean {
                return err(format!("derive({dataset}) runs before clean({dataset})"));
            }

            if let Some(sample) = position(Stage::Sample(dataset)) {
                if dataset != Dataset::Vehicles {
                    return err(format!("only vehicles can be sampled, not {dataset}"));
                }
                if sample < derive {
                    return err(format!("sample({dataset}) runs before derive({dataset})"));
                }
            }
        }

        let Some(assemble) = position(Stage::Assemble) else {
            return err("assemble is missing".to_string());
        };
        if let Some(late) = self.stages[assemble..].iter().find(|s| s.dataset().is_some()) {
            return err(format!("{late} runs after key assignment"));
        }
        match position(Stage::Validate) {
            None => err("validate is missing".to_string()),
            Some(validate) if validate < assemble => err("validate runs before assemble".to_string()),
            Some(_) => Ok(()),
        }
    }
}

impl Default for StagePlan {
    fn default() -> Self {
        Self::standard()
    }
}

// =============================================================================
// Run report
// =============================================================================

/// Row accounting for one stage and dataset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageCount {
    pub stage: Stage,
    pub dataset: Dataset,
    pub rows_in: usize,
    pub rows_out: usize,
    /// Documented drops per rule.
    pub drops: BTreeMap<String, usize>,
}

impl StageCount {
    fn passthrough(stage: Stage, dataset: Dataset, rows: usize) -> Self {
        Self {
            stage,
            dataset,
            rows_in: rows,
            rows_out: rows,
            drops: BTreeMap::new(),
        }
    }

    fn with_drop(stage: Stage, dataset: Dataset, rows_in: usize, rows_out: usize, rule: &str) -> Self {
        let mut drops = BTreeMap::new();
        if rows_in > rows_out {
            drops.insert(rule.to_string(), rows_in - rows_out);
        }
        Self {
            stage,
            dataset,
            rows_in,
            rows_out,
            drops,
        }
    }

    pub fn dropped(&self) -> usize {
        self.drops.values().sum()
    }
}

/// Everything a run did, serialisable for auditing.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub config: PipelineConfig,
    pub plan: StagePlan,
    pub cleaning: Vec<CleanReport>,
    pub stages: Vec<StageCount>,
    pub imputations: Vec<Imputation>,
    pub sampled: Option<SampleSummary>,
    /// Output row count per table.
    pub tables: BTreeMap<String, usize>,
    pub integrity: Option<IntegritySummary>,
}

impl RunReport {
    pub fn new(config: PipelineConfig, plan: StagePlan) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            config,
            plan,
            cleaning: Vec::new(),
            stages: Vec::new(),
            imputations: Vec::new(),
            sampled: None,
            tables: BTreeMap::new(),
            integrity: None,
        }
    }

    /// Stage counts of one dataset, in execution order.
    pub fn stages_for(&self, dataset: Dataset) -> impl Iterator<Item = &StageCount> {
        self.stages.iter().filter(move |s| s.dataset == dataset)
    }

    /// Rows the dataset had before cleaning.
    pub fn source_rows(&self, dataset: Dataset) -> Option<usize> {
        self.cleaning
            .iter()
            .find(|c| c.dataset == dataset)
            .map(|c| c.rows_in)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// The three raw source tables of a run.
#[derive(Debug, Clone)]
pub struct SourceTables {
    pub collisions: RawTable,
    pub vehicles: RawTable,
    pub casualties: RawTable,
}

impl SourceTables {
    /// Read the three extracts with encoding and delimiter auto-detection.
    pub fn from_csv_files(
        collisions: impl AsRef<Path>,
        vehicles: impl AsRef<Path>,
        casualties: impl AsRef<Path>,
    ) -> CsvResult<Self> {
        Ok(Self {
            collisions: parse_csv_file_auto(collisions, Dataset::Collisions)?,
            vehicles: parse_csv_file_auto(vehicles, Dataset::Vehicles)?,
            casualties: parse_csv_file_auto(casualties, Dataset::Casualties)?,
        })
    }
}

// =============================================================================
// Execution
// =============================================================================

/// Intermediate tables between stages.
#[derive(Default)]
struct RunState {
    collisions: Option<Vec<CollisionRecord>>,
    vehicles: Option<Vec<VehicleRecord>>,
    casualties: Option<Vec<CasualtyRecord>>,
    speed_limit: Option<Imputation>,
    engine_capacity: Option<Imputation>,
    enriched_collisions: Option<Vec<EnrichedCollision>>,
    enriched_vehicles: Option<Vec<EnrichedVehicle>>,
    enriched_casualties: Option<Vec<EnrichedCasualty>>,
    schema: Option<StarSchema>,
}

fn not_ready(stage: Stage, needs: &str) -> PipelineError {
    PipelineError::StageOrder(format!("{stage} needs {needs}"))
}

/// Build the star schema with the standard stage plan.
pub fn build_star_schema(
    sources: &SourceTables,
    config: &PipelineConfig,
) -> PipelineResult<(StarSchema, RunReport)> {
    build_with_plan(sources, config, StagePlan::standard())
}

/// Build the star schema following `plan`.
pub fn build_with_plan(
    sources: &SourceTables,
    config: &PipelineConfig,
    plan: StagePlan,
) -> PipelineResult<(StarSchema, RunReport)> {
    config.validate()?;
    plan.check()?;

    let mut report = RunReport::new(config.clone(), plan.clone());
    let mut state = RunState::default();
    log_info(format!("Run {}", report.run_id));

    for stage in plan.stages() {
        let stage = *stage;
        match stage {
            Stage::Clean(dataset) => clean_stage(stage, dataset, sources, config, &mut state, &mut report)?,
            Stage::Impute(dataset) => impute_stage(stage, dataset, config, &mut state, &mut report)?,
            Stage::Derive(dataset) => derive_stage(stage, dataset, &mut state, &mut report)?,
            Stage::Sample(_) => sample_stage(stage, config, &mut state, &mut report)?,
            Stage::Assemble => assemble_stage(stage, &mut state, &mut report)?,
            Stage::Validate => {
                log_info("Checking referential integrity...");
                let schema = state.schema.as_ref().ok_or_else(|| not_ready(stage, "assembled tables"))?;
                match validate_star(schema, &report) {
                    Ok(summary) => {
                        log_success(format!(
                            "{} foreign keys resolved, {} lineage links checked",
                            summary.foreign_keys_checked, summary.lineage_checked
                        ));
                        report.integrity = Some(summary);
                    }
                    Err(e) => {
                        for violation in e.violations().iter().take(5) {
                            log_error(violation.to_string());
                        }
                        return Err(e.into());
                    }
                }
            }
        }
    }

    let schema = state.schema.ok_or_else(|| not_ready(Stage::Assemble, "to have run"))?;
    report.tables = schema
        .table_sizes()
        .iter()
        .map(|(table, rows)| (table.to_string(), *rows))
        .collect();
    Ok((schema, report))
}

/// Build the star schema, then hand it to `sink`.
pub fn run(
    sources: &SourceTables,
    config: &PipelineConfig,
    sink: &mut dyn StarSink,
) -> PipelineResult<RunReport> {
    let (schema, report) = build_star_schema(sources, config)?;
    log_info(format!("Loading into {}...", sink.name()));
    sink.load(&schema)?;
    for (table, rows) in &report.tables {
        log_info_indent(format!("{table}: {rows} rows"), 1);
    }
    log_success("Star schema loaded");
    Ok(report)
}

fn clean_stage(
    stage: Stage,
    dataset: Dataset,
    sources: &SourceTables,
    config: &PipelineConfig,
    state: &mut RunState,
    report: &mut RunReport,
) -> PipelineResult<()> {
    log_info(format!("Cleaning {dataset}..."));
    let clean_report = match dataset {
        Dataset::Collisions => {
            let cleaned = clean_collisions(&sources.collisions)?;
            state.collisions = Some(cleaned.records);
            cleaned.report
        }
        Dataset::Vehicles => {
            let cleaned = clean_vehicles(&sources.vehicles, config.age_min, config.age_max)?;
            state.vehicles = Some(cleaned.records);
            cleaned.report
        }
        Dataset::Casualties => {
            let cleaned = clean_casualties(&sources.casualties)?;
            state.casualties = Some(cleaned.records);
            cleaned.report
        }
    };
    print_clean_report(&clean_report);

    if clean_report.invalid_fraction() > config.max_invalid_row_fraction {
        return Err(PipelineError::TooManyInvalidRows {
            dataset,
            invalid: clean_report.invalid_rows,
            total: clean_report.rows_in,
            limit: config.max_invalid_row_fraction * 100.0,
        });
    }

    report.stages.push(StageCount {
        stage,
        dataset,
        rows_in: clean_report.rows_in,
        rows_out: clean_report.rows_out,
        drops: clean_report.drops.clone(),
    });
    report.cleaning.push(clean_report);
    Ok(())
}

fn print_clean_report(report: &CleanReport) {
    log_success(format!(
        "{}: {} rows in, {} rows out",
        report.dataset, report.rows_in, report.rows_out
    ));
    if !report.dropped_columns.is_empty() {
        log_info_indent(format!("dropped columns: {}", report.dropped_columns.join(", ")), 1);
    }
    for (rule, count) in &report.drops {
        log_warning_indent(format!("{count} rows dropped: {rule}"), 1);
    }
    for (column, count) in &report.non_numeric {
        log_warning_indent(format!("{count} non-numeric '{column}' values treated as missing"), 1);
    }
}

fn cleaning_report(report: &RunReport, dataset: Dataset) -> Option<&CleanReport> {
    report.cleaning.iter().find(|c| c.dataset == dataset)
}

fn impute_stage(
    stage: Stage,
    dataset: Dataset,
    config: &PipelineConfig,
    state: &mut RunState,
    report: &mut RunReport,
) -> PipelineResult<()> {
    log_info(format!("Imputing {dataset}..."));
    let imputation = match dataset {
        Dataset::Collisions => {
            let non_numeric = cleaning_report(report, dataset)
                .map(|c| c.non_numeric_count("speed_limit"))
                .unwrap_or(0);
            let records = state.collisions.as_mut().ok_or_else(|| not_ready(stage, "cleaned collisions"))?;
            let mut values: Vec<Option<f64>> = records.iter().map(|r| r.speed_limit).collect();
            let imputation =
                impute_column("speed_limit", &mut values, config.speed_limit_strategy, non_numeric)?;
            for (record, value) in records.iter_mut().zip(values) {
                record.speed_limit = value;
            }
            state.speed_limit = Some(imputation.clone());
            imputation
        }
        Dataset::Vehicles => {
            let non_numeric = cleaning_report(report, dataset)
                .map(|c| c.non_numeric_count("engine_capacity_cc"))
                .unwrap_or(0);
            let records = state.vehicles.as_mut().ok_or_else(|| not_ready(stage, "cleaned vehicles"))?;
            let mut values: Vec<Option<f64>> = records.iter().map(|r| r.engine_capacity_cc).collect();
            let imputation = impute_column(
                "engine_capacity_cc",
                &mut values,
                config.engine_capacity_strategy,
                non_numeric,
            )?;
            for (record, value) in records.iter_mut().zip(values) {
                record.engine_capacity_cc = value;
            }
            state.engine_capacity = Some(imputation.clone());
            imputation
        }
        Dataset::Casualties => return Err(not_ready(stage, "an imputable column")),
    };

    log_info_indent(
        format!(
            "{}: {} filled with {} {:.2}",
            imputation.column,
            imputation.filled,
            imputation.strategy.name(),
            imputation.statistic
        ),
        1,
    );
    let rows = imputation.filled + imputation.observed;
    report.stages.push(StageCount::passthrough(stage, dataset, rows));
    report.imputations.push(imputation);
    Ok(())
}

fn derive_stage(
    stage: Stage,
    dataset: Dataset,
    state: &mut RunState,
    report: &mut RunReport,
) -> PipelineResult<()> {
    log_info(format!("Deriving features for {dataset}..."));
    let rows = match dataset {
        Dataset::Collisions => {
            let records = state.collisions.take().ok_or_else(|| not_ready(stage, "cleaned collisions"))?;
            let statistic = state
                .speed_limit
                .as_ref()
                .ok_or_else(|| not_ready(stage, "imputed speed limits"))?
                .statistic;
            let enriched: Vec<EnrichedCollision> = records
                .into_iter()
                .map(|r| {
                    let speed_limit = r.speed_limit.unwrap_or(statistic);
                    enrich_collision(r, speed_limit)
                })
                .collect();
            let rows = enriched.len();
            state.enriched_collisions = Some(enriched);
            rows
        }
        Dataset::Vehicles => {
            let records = state.vehicles.take().ok_or_else(|| not_ready(stage, "cleaned vehicles"))?;
            let statistic = state
                .engine_capacity
                .as_ref()
                .ok_or_else(|| not_ready(stage, "imputed engine capacities"))?
                .statistic;
            let enriched: Vec<EnrichedVehicle> = records
                .into_iter()
                .map(|r| {
                    let engine_capacity = r.engine_capacity_cc.unwrap_or(statistic);
                    enrich_vehicle(r, engine_capacity)
                })
                .collect();
            let rows = enriched.len();
            state.enriched_vehicles = Some(enriched);
            rows
        }
        Dataset::Casualties => {
            let records = state.casualties.take().ok_or_else(|| not_ready(stage, "cleaned casualties"))?;
            let enriched: Vec<EnrichedCasualty> = records.into_iter().map(enrich_casualty).collect();
            let rows = enriched.len();
            state.enriched_casualties = Some(enriched);
            rows
        }
    };
    report.stages.push(StageCount::passthrough(stage, dataset, rows));
    Ok(())
}

fn sample_stage(
    stage: Stage,
    config: &PipelineConfig,
    state: &mut RunState,
    report: &mut RunReport,
) -> PipelineResult<()> {
    log_info(format!(
        "Sampling {:.0}% of vehicles (seed {})...",
        config.sample_fraction * 100.0,
        config.seed
    ));
    let vehicles = state
        .enriched_vehicles
        .take()
        .ok_or_else(|| not_ready(stage, "derived vehicles"))?;
    let (kept, summary) = sample(vehicles, config.sample_fraction, config.seed);
    log_info_indent(format!("{} of {} vehicles kept", summary.rows_out, summary.rows_in), 1);

    report.stages.push(StageCount::with_drop(
        stage,
        Dataset::Vehicles,
        summary.rows_in,
        summary.rows_out,
        RULE_SAMPLED_OUT,
    ));
    report.sampled = Some(summary);
    state.enriched_vehicles = Some(kept);
    Ok(())
}

fn assemble_stage(stage: Stage, state: &mut RunState, report: &mut RunReport) -> PipelineResult<()> {
    log_info("Assigning keys and assembling star schema...");
    let collisions = state
        .enriched_collisions
        .as_deref()
        .ok_or_else(|| not_ready(stage, "derived collisions"))?;
    let vehicles = state
        .enriched_vehicles
        .as_deref()
        .ok_or_else(|| not_ready(stage, "derived vehicles"))?;
    let casualties = state
        .enriched_casualties
        .as_deref()
        .ok_or_else(|| not_ready(stage, "derived casualties"))?;

    let assembly = assemble(collisions, vehicles, casualties)?;
    let schema = assembly.schema;

    report.stages.push(StageCount::passthrough(stage, Dataset::Collisions, collisions.len()));
    report.stages.push(StageCount::with_drop(
        stage,
        Dataset::Vehicles,
        vehicles.len(),
        schema.dim_vehicle.len(),
        RULE_COLLISION_NOT_RETAINED,
    ));
    report.stages.push(StageCount::with_drop(
        stage,
        Dataset::Casualties,
        casualties.len(),
        schema.dim_casualty.len(),
        RULE_COLLISION_NOT_RETAINED,
    ));

    if assembly.vehicles_not_retained > 0 {
        log_warning_indent(
            format!("{} vehicles dropped: {RULE_COLLISION_NOT_RETAINED}", assembly.vehicles_not_retained),
            1,
        );
    }
    if assembly.casualties_not_retained > 0 {
        log_warning_indent(
            format!("{} casualties dropped: {RULE_COLLISION_NOT_RETAINED}", assembly.casualties_not_retained),
            1,
        );
    }
    for (table, rows) in schema.table_sizes() {
        log_info_indent(format!("{table}: {rows} rows"), 1);
    }

    state.schema = Some(schema);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn collision_rows() -> Vec<Value> {
        vec![
            json!({"collision_index": "A1", "date": "02/01/2023", "time": "08:15", "collision_severity": "2",
                   "number_of_vehicles": "2", "number_of_casualties": "1", "weather_conditions": "1",
                   "road_type": "6", "speed_limit": "30"}),
            json!({"collision_index": "A2", "date": "02/01/2023", "time": "08:40", "collision_severity": "3",
                   "number_of_vehicles": "1", "number_of_casualties": "1", "weather_conditions": "2",
                   "road_type": "3", "speed_limit": "-1"}),
            json!({"collision_index": "A3", "date": "03/01/2023", "time": "17:05", "collision_severity": "1",
                   "number_of_vehicles": "3", "number_of_casualties": "2", "weather_conditions": "1",
                   "road_type": "6", "speed_limit": "50"}),
        ]
    }

    fn vehicle_rows() -> Vec<Value> {
        vec![
            json!({"collision_index": "A1", "vehicle_reference": "1", "vehicle_type": "9",
                   "engine_capacity_cc": "1600", "propulsion_code": "1", "age_of_driver": "34"}),
            json!({"collision_index": "A1", "vehicle_reference": "2", "vehicle_type": "9",
                   "engine_capacity_cc": "", "propulsion_code": "2", "age_of_driver": "15"}),
            json!({"collision_index": "A3", "vehicle_reference": "1", "vehicle_type": "11",
                   "engine_capacity_cc": "2000", "propulsion_code": "8", "age_of_driver": "70"}),
        ]
    }

    fn casualty_rows() -> Vec<Value> {
        vec![
            json!({"collision_index": "A1", "casualty_reference": "1", "casualty_class": "1",
                   "age_of_casualty": "34", "casualty_severity": "2"}),
            json!({"collision_index": "A3", "casualty_reference": "1", "casualty_class": "3",
                   "age_of_casualty": "", "casualty_severity": "1"}),
        ]
    }

    fn sources() -> SourceTables {
        SourceTables {
            collisions: RawTable::from_json_rows(Dataset::Collisions, collision_rows()),
            vehicles: RawTable::from_json_rows(Dataset::Vehicles, vehicle_rows()),
            casualties: RawTable::from_json_rows(Dataset::Casualties, casualty_rows()),
        }
    }

    fn full_sample() -> PipelineConfig {
        PipelineConfig {
            sample_fraction: 1.0,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_standard_plan_is_valid() {
        assert!(StagePlan::standard().check().is_ok());
    }

    #[test]
    fn test_impute_before_clean_rejected() {
        let mut stages = StagePlan::standard().stages().to_vec();
        stages.retain(|s| *s != Stage::Impute(Dataset::Vehicles));
        stages.insert(0, Stage::Impute(Dataset::Vehicles));
        let err = StagePlan::new(stages).check().unwrap_err();
        assert!(matches!(err, PipelineError::StageOrder(_)));
    }

    #[test]
    fn test_sample_before_impute_rejected() {
        let mut stages = StagePlan::standard().stages().to_vec();
        stages.retain(|s| *s != Stage::Sample(Dataset::Vehicles));
        stages.insert(3, Stage::Sample(Dataset::Vehicles));
        assert!(StagePlan::new(stages).check().is_err());
    }

    #[test]
    fn test_dataset_stage_after_assemble_rejected() {
        let mut stages = StagePlan::standard().stages().to_vec();
        stages.retain(|s| *s != Stage::Derive(Dataset::Casualties));
        stages.push(Stage::Derive(Dataset::Casualties));
        assert!(StagePlan::new(stages).check().is_err());
    }

    #[test]
    fn test_build_star_schema() {
        let (schema, report) = build_star_schema(&sources(), &full_sample()).unwrap();

        assert_eq!(schema.fact_accident.len(), 3);
        assert_eq!(schema.dim_time.len(), 2);
        assert_eq!(schema.dim_vehicle.len(), 2);
        assert_eq!(schema.dim_casualty.len(), 1);

        // A2's missing speed limit is imputed with the median of 30 and 50.
        assert_eq!(report.imputations[0].statistic, 40.0);
        assert_eq!(report.imputations[1].statistic, 1800.0);
        assert_eq!(report.tables["fact_accident"], 3);
        assert!(report.integrity.is_some());
    }

    #[test]
    fn test_stage_counts_add_up() {
        let (_, report) = build_star_schema(&sources(), &full_sample()).unwrap();
        for count in &report.stages {
            assert_eq!(count.rows_in - count.dropped(), count.rows_out, "{}", count.stage);
        }
        let vehicle_clean = report.stages_for(Dataset::Vehicles).next().unwrap();
        assert_eq!(vehicle_clean.drops["driver_age_out_of_range"], 1);
    }

    #[test]
    fn test_too_many_invalid_rows() {
        let mut rows = collision_rows();
        rows[1]["date"] = json!("not a date");
        let sources = SourceTables {
            collisions: RawTable::from_json_rows(Dataset::Collisions, rows),
            ..sources()
        };
        let err = build_star_schema(&sources, &full_sample()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::TooManyInvalidRows { dataset: Dataset::Collisions, invalid: 1, total: 3, .. }
        ));
    }

    #[test]
    fn test_missing_column_aborts() {
        let sources = SourceTables {
            casualties: RawTable::from_json_rows(
                Dataset::Casualties,
                vec![json!({"collision_index": "A1"})],
            ),
            ..sources()
        };
        let err = build_star_schema(&sources, &full_sample()).unwrap_err();
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_invalid_config_aborts_before_rows() {
        let config = PipelineConfig {
            age_min: 80,
            age_max: 20,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            build_star_schema(&sources(), &config),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_report_serializes() {
        let (_, report) = build_star_schema(&sources(), &full_sample()).unwrap();
        let json: Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["stages"][0]["stage"]["stage"], "clean");
        assert_eq!(json["stages"][0]["stage"]["dataset"], "collisions");
        assert_eq!(json["config"]["seed"], 42);
    }
}
