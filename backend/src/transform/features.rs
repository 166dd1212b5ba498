//! FeatureDeriver: risk index, propulsion one-hot encoding and age bins.
//!
//! Every function here is pure. Inputs must already be imputed; an `Option`
//! left in an imputable column means the Imputer was skipped.

use crate::models::{
    AgeGroup, CasualtyRecord, CollisionRecord, EnrichedCasualty, EnrichedCollision,
    EnrichedVehicle, Propulsion, PropulsionFlags, VehicleRecord,
};

/// Weight of one involved vehicle.
pub const RISK_VEHICLE_WEIGHT: f64 = 0.6;
/// Weight of one casualty.
pub const RISK_CASUALTY_WEIGHT: f64 = 1.2;
/// Weight of the severity score (Fatal 3, Serious 2, Slight 1).
pub const RISK_SEVERITY_WEIGHT: f64 = 2.0;

/// Composite risk score of a collision.
///
/// Terms are summed in a fixed order so results are bit-identical across runs.
pub fn risk_index(vehicles: u32, casualties: u32, severity_score: f64) -> f64 {
    vehicles as f64 * RISK_VEHICLE_WEIGHT
        + casualties as f64 * RISK_CASUALTY_WEIGHT
        + severity_score * RISK_SEVERITY_WEIGHT
}

/// Map an age to its bin. Lower bounds are inclusive.
pub fn age_group(age: u32) -> AgeGroup {
    AgeGroup::ALL
        .iter()
        .rev()
        .find(|g| age >= g.lower_bound())
        .copied()
        .unwrap_or(AgeGroup::Child)
}

/// Resolve a raw propulsion code and its one-hot flags.
pub fn encode_propulsion(code: Option<i64>) -> (Propulsion, PropulsionFlags) {
    let propulsion = Propulsion::from_code(code);
    (propulsion, PropulsionFlags::encode(propulsion))
}

/// Attach the imputed speed limit and risk index to a collision.
///
/// `speed_limit` is the imputed value for this row.
pub fn enrich_collision(record: CollisionRecord, speed_limit: f64) -> EnrichedCollision {
    let risk_index = risk_index(
        record.number_of_vehicles,
        record.number_of_casualties,
        record.severity.score(),
    );
    EnrichedCollision {
        record,
        speed_limit,
        risk_index,
    }
}

pub fn enrich_vehicle(record: VehicleRecord, engine_capacity_cc: f64) -> EnrichedVehicle {
    let (propulsion, propulsion_flags) = encode_propulsion(record.propulsion_code);
    let age_group = age_group(record.driver_age);
    EnrichedVehicle {
        record,
        engine_capacity_cc,
        propulsion,
        propulsion_flags,
        age_group,
    }
}

pub fn enrich_casualty(record: CasualtyRecord) -> EnrichedCasualty {
    let age_group = age_group(record.age);
    EnrichedCasualty { record, age_group }
}
