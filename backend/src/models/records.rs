//! Typed rows produced by the Cleaner and enriched by the Imputer and
//! FeatureDeriver.
//!
//! Every record keeps the index of the raw row it came from so any output
//! row can be traced back to its source.

use chrono::NaiveDate;
use serde::Serialize;

use super::{AgeGroup, CasualtyClass, Propulsion, RoadType, Severity, VehicleType, Weather};

// =============================================================================
// Cleaned records
// =============================================================================

/// A collision that passed every validity rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollisionRecord {
    pub source_row: usize,
    /// Natural key shared with vehicles and casualties.
    pub collision_index: String,
    pub date: NaiveDate,
    pub hour: u32,
    pub severity: Severity,
    pub number_of_vehicles: u32,
    pub number_of_casualties: u32,
    pub weather: Weather,
    pub road_type: RoadType,
    /// Missing until imputed.
    pub speed_limit: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

/// A vehicle whose driver age lies within the configured bounds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VehicleRecord {
    pub source_row: usize,
    pub collision_index: String,
    pub vehicle_reference: u32,
    pub vehicle_type: VehicleType,
    /// Missing until imputed.
    pub engine_capacity_cc: Option<f64>,
    /// Raw propulsion code, resolved into [`Propulsion`] by the FeatureDeriver.
    pub propulsion_code: Option<i64>,
    pub driver_age: u32,
}

/// A casualty with a known age.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CasualtyRecord {
    pub source_row: usize,
    pub collision_index: String,
    pub vehicle_reference: Option<u32>,
    pub casualty_reference: u32,
    pub class: CasualtyClass,
    pub age: u32,
    pub severity: Severity,
}

// =============================================================================
// Enriched records
// =============================================================================

/// One-hot encoding of [`Propulsion`], in [`Propulsion::ALL`] order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PropulsionFlags([u8; 5]);

impl PropulsionFlags {
    pub fn encode(propulsion: Propulsion) -> Self {
        let mut flags = [0u8; 5];
        for (slot, variant) in flags.iter_mut().zip(Propulsion::ALL) {
            *slot = u8::from(variant == propulsion);
        }
        Self(flags)
    }

    pub fn get(&self, propulsion: Propulsion) -> u8 {
        Propulsion::ALL
            .iter()
            .position(|p| *p == propulsion)
            .map(|i| self.0[i])
            .unwrap_or(0)
    }

    pub fn as_array(&self) -> [u8; 5] {
        self.0
    }
}

/// Collision with its imputed speed limit and risk index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedCollision {
    pub record: CollisionRecord,
    pub speed_limit: f64,
    pub risk_index: f64,
}

/// Vehicle with imputed engine capacity, propulsion encoding and age bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedVehicle {
    pub record: VehicleRecord,
    pub engine_capacity_cc: f64,
    pub propulsion: Propulsion,
    pub propulsion_flags: PropulsionFlags,
    pub age_group: AgeGroup,
}

/// Casualty with its age bin.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedCasualty {
    pub record: CasualtyRecord,
    pub age_group: AgeGroup,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propulsion_flags_exactly_one_set() {
        for variant in Propulsion::ALL {
            let flags = PropulsionFlags::encode(variant);
            assert_eq!(flags.as_array().iter().map(|f| *f as u32).sum::<u32>(), 1);
            assert_eq!(flags.get(variant), 1);
        }
    }

    #[test]
    fn test_propulsion_flags_order() {
        let flags = PropulsionFlags::encode(Propulsion::Diesel);
        assert_eq!(flags.as_array(), [0, 1, 0, 0, 0]);
    }
}
