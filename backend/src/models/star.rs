//! Star schema rows handed to the load interface.
//!
//! Field order of each struct is the column order of its output table.

use chrono::NaiveDate;
use serde::Serialize;

use super::Dataset;

pub const DIM_TIME: &str = "dim_time";
pub const DIM_COLLISION: &str = "dim_collision";
pub const DIM_VEHICLE: &str = "dim_vehicle";
pub const DIM_CASUALTY: &str = "dim_casualty";
pub const FACT_ACCIDENT: &str = "fact_accident";

/// One row per distinct `(date, hour)` observed in collisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeDim {
    pub time_key: u64,
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub day_of_week: String,
    pub hour: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollisionDim {
    pub collision_key: u64,
    pub severity: &'static str,
    pub weather: &'static str,
    pub road_type: &'static str,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleDim {
    pub vehicle_key: u64,
    #[serde(rename = "type")]
    pub vehicle_type: &'static str,
    pub engine_capacity: f64,
    pub propulsion_petrol: u8,
    pub propulsion_diesel: u8,
    pub propulsion_electric: u8,
    pub propulsion_hybrid: u8,
    pub propulsion_other: u8,
    pub driver_age: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CasualtyDim {
    pub casualty_key: u64,
    pub class: &'static str,
    pub age_group: &'static str,
    pub severity: &'static str,
}

/// Grain: one row per distinct collision event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FactAccident {
    pub collision_key: u64,
    pub time_key: u64,
    pub total_vehicles: u32,
    pub total_casualties: u32,
    pub accident_count: u32,
    pub risk_index: f64,
}

/// Where a dimension row came from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageEntry {
    pub key: u64,
    pub dataset: Dataset,
    pub source_row: usize,
    pub collision_index: String,
}

/// Row-level traceability for the per-source-row dimensions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Lineage {
    pub collisions: Vec<LineageEntry>,
    pub vehicles: Vec<LineageEntry>,
    pub casualties: Vec<LineageEntry>,
}

/// The five output tables plus lineage, owned by the assembler until load.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StarSchema {
    pub dim_time: Vec<TimeDim>,
    pub dim_collision: Vec<CollisionDim>,
    pub dim_vehicle: Vec<VehicleDim>,
    pub dim_casualty: Vec<CasualtyDim>,
    pub fact_accident: Vec<FactAccident>,
    pub lineage: Lineage,
}

impl StarSchema {
    /// `(table, row count)` in output order.
    pub fn table_sizes(&self) -> [(&'static str, usize); 5] {
        [
            (DIM_TIME, self.dim_time.len()),
            (DIM_COLLISION, self.dim_collision.len()),
            (DIM_VEHICLE, self.dim_vehicle.len()),
            (DIM_CASUALTY, self.dim_casualty.len()),
            (FACT_ACCIDENT, self.fact_accident.len()),
        ]
    }
}
