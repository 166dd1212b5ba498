//! Domain models for the road-safety pipeline.
//!
//! This module contains the closed code sets decoded from STATS19 extracts
//! and re-exports the typed record and star-schema row types:
//!
//! - [`Dataset`] - Which of the three source tables a row comes from
//! - [`Severity`] - Collision / casualty severity (Fatal, Serious, Slight)
//! - [`Weather`], [`RoadType`], [`VehicleType`] - Descriptive collision/vehicle codes
//! - [`CasualtyClass`] - Driver, passenger or pedestrian
//! - [`Propulsion`] - Closed propulsion set with an explicit `Other`
//! - [`AgeGroup`] - Six ordered age bins
//! - [`records`] - Typed rows past the Cleaner
//! - [`star`] - Dimension and fact rows

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod records;
pub mod star;

pub use records::{
    CasualtyRecord, CollisionRecord, EnrichedCasualty, EnrichedCollision, EnrichedVehicle,
    PropulsionFlags, VehicleRecord,
};
pub use star::{
    CasualtyDim, CollisionDim, FactAccident, Lineage, LineageEntry, StarSchema, TimeDim,
    VehicleDim,
};

// =============================================================================
// Dataset
// =============================================================================

/// One of the three fixed source tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dataset {
    Collisions,
    Vehicles,
    Casualties,
}

impl Dataset {
    pub const ALL: [Dataset; 3] = [Dataset::Collisions, Dataset::Vehicles, Dataset::Casualties];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Collisions => "collisions",
            Self::Vehicles => "vehicles",
            Self::Casualties => "casualties",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Severity
// =============================================================================

/// Severity of a collision or casualty.
///
/// STATS19 codes: 1 Fatal, 2 Serious, 3 Slight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Fatal,
    Serious,
    Slight,
}

impl Severity {
    /// Parse from the numeric STATS19 code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Fatal),
            2 => Some(Self::Serious),
            3 => Some(Self::Slight),
            _ => None,
        }
    }

    /// Score used by the risk index: higher is worse.
    pub fn score(&self) -> f64 {
        match self {
            Self::Fatal => 3.0,
            Self::Serious => 2.0,
            Self::Slight => 1.0,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Fatal => "Fatal",
            Self::Serious => "Serious",
            Self::Slight => "Slight",
        }
    }
}

// =============================================================================
// Weather
// =============================================================================

/// Weather conditions at the time of the collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Weather {
    Fine,
    Raining,
    Snowing,
    FineHighWinds,
    RainingHighWinds,
    SnowingHighWinds,
    FogOrMist,
    Other,
    Unknown,
}

impl Weather {
    /// Codes outside the published table, and missing values, decode to `Unknown`.
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => Self::Fine,
            Some(2) => Self::Raining,
            Some(3) => Self::Snowing,
            Some(4) => Self::FineHighWinds,
            Some(5) => Self::RainingHighWinds,
            Some(6) => Self::SnowingHighWinds,
            Some(7) => Self::FogOrMist,
            Some(8) => Self::Other,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Fine => "Fine no high winds",
            Self::Raining => "Raining no high winds",
            Self::Snowing => "Snowing no high winds",
            Self::FineHighWinds => "Fine + high winds",
            Self::RainingHighWinds => "Raining + high winds",
            Self::SnowingHighWinds => "Snowing + high winds",
            Self::FogOrMist => "Fog or mist",
            Self::Other => "Other",
            Self::Unknown => "Unknown",
        }
    }
}

// =============================================================================
// Road Type
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoadType {
    Roundabout,
    OneWayStreet,
    DualCarriageway,
    SingleCarriageway,
    SlipRoad,
    OneWayOrSlipRoad,
    Unknown,
}

impl RoadType {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => Self::Roundabout,
            Some(2) => Self::OneWayStreet,
            Some(3) => Self::DualCarriageway,
            Some(6) => Self::SingleCarriageway,
            Some(7) => Self::SlipRoad,
            Some(12) => Self::OneWayOrSlipRoad,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Roundabout => "Roundabout",
            Self::OneWayStreet => "One way street",
            Self::DualCarriageway => "Dual carriageway",
            Self::SingleCarriageway => "Single carriageway",
            Self::SlipRoad => "Slip road",
            Self::OneWayOrSlipRoad => "One way street/Slip road",
            Self::Unknown => "Unknown",
        }
    }
}

// =============================================================================
// Vehicle Type
// =============================================================================

/// Vehicle type, grouped from the STATS19 vehicle_type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VehicleType {
    PedalCycle,
    Motorcycle,
    Car,
    Taxi,
    Minibus,
    Bus,
    Van,
    GoodsVehicle,
    AgriculturalVehicle,
    Tram,
    RiddenHorse,
    Other,
    Unknown,
}

impl VehicleType {
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => Self::PedalCycle,
            Some(2..=5) | Some(22) | Some(23) | Some(97) => Self::Motorcycle,
            Some(8) => Self::Taxi,
            Some(9) => Self::Car,
            Some(10) => Self::Minibus,
            Some(11) => Self::Bus,
            Some(19) => Self::Van,
            Some(20) | Some(21) | Some(98) => Self::GoodsVehicle,
            Some(17) => Self::AgriculturalVehicle,
            Some(18) => Self::Tram,
            Some(16) => Self::RiddenHorse,
            Some(_) => Self::Other,
            None => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::PedalCycle => "Pedal cycle",
            Self::Motorcycle => "Motorcycle",
            Self::Car => "Car",
            Self::Taxi => "Taxi/Private hire car",
            Self::Minibus => "Minibus",
            Self::Bus => "Bus or coach",
            Self::Van => "Van / Goods 3.5 tonnes mgw or under",
            Self::GoodsVehicle => "Goods vehicle over 3.5t",
            Self::AgriculturalVehicle => "Agricultural vehicle",
            Self::Tram => "Tram",
            Self::RiddenHorse => "Ridden horse",
            Self::Other => "Other vehicle",
            Self::Unknown => "Unknown",
        }
    }
}

// =============================================================================
// Casualty Class
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CasualtyClass {
    Driver,
    Passenger,
    Pedestrian,
}

impl CasualtyClass {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Self::Driver),
            2 => Some(Self::Passenger),
            3 => Some(Self::Pedestrian),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Driver => "Driver or rider",
            Self::Passenger => "Passenger",
            Self::Pedestrian => "Pedestrian",
        }
    }
}

// =============================================================================
// Propulsion
// =============================================================================

/// Closed propulsion set used for one-hot encoding.
///
/// The variant list is fixed so every run produces the same columns,
/// whatever codes appear in the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Propulsion {
    Petrol,
    Diesel,
    Electric,
    Hybrid,
    Other,
}

impl Propulsion {
    /// Encoding order of the one-hot columns.
    pub const ALL: [Propulsion; 5] = [
        Propulsion::Petrol,
        Propulsion::Diesel,
        Propulsion::Electric,
        Propulsion::Hybrid,
        Propulsion::Other,
    ];

    /// STATS19 propulsion_code: 1 petrol, 2 heavy oil, 3 electric, 8 hybrid electric.
    pub fn from_code(code: Option<i64>) -> Self {
        match code {
            Some(1) => Self::Petrol,
            Some(2) => Self::Diesel,
            Some(3) => Self::Electric,
            Some(8) => Self::Hybrid,
            _ => Self::Other,
        }
    }

    /// Output column name of this variant.
    pub fn column(&self) -> &'static str {
        match self {
            Self::Petrol => "propulsion_petrol",
            Self::Diesel => "propulsion_diesel",
            Self::Electric => "propulsion_electric",
            Self::Hybrid => "propulsion_hybrid",
            Self::Other => "propulsion_other",
        }
    }
}

// =============================================================================
// Age Group
// =============================================================================

/// Six ordered, non-overlapping age bins.
///
/// Lower bounds are inclusive: Child `< 13`, Teen `13..20`, YoungAdult
/// `20..30`, Adult `30..50`, Senior `50..70`, Elderly `>= 70`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgeGroup {
    Child,
    Teen,
    YoungAdult,
    Adult,
    Senior,
    Elderly,
}

impl AgeGroup {
    pub const ALL: [AgeGroup; 6] = [
        AgeGroup::Child,
        AgeGroup::Teen,
        AgeGroup::YoungAdult,
        AgeGroup::Adult,
        AgeGroup::Senior,
        AgeGroup::Elderly,
    ];

    /// Inclusive lower bound of the bin.
    pub fn lower_bound(&self) -> u32 {
        match self {
            Self::Child => 0,
            Self::Teen => 13,
            Self::YoungAdult => 20,
            Self::Adult => 30,
            Self::Senior => 50,
            Self::Elderly => 70,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Child => "Child",
            Self::Teen => "Teen",
            Self::YoungAdult => "Young Adult",
            Self::Adult => "Adult",
            Self::Senior => "Senior",
            Self::Elderly => "Elderly",
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_codes_and_scores() {
        assert_eq!(Severity::from_code(1), Some(Severity::Fatal));
        assert_eq!(Severity::from_code(3), Some(Severity::Slight));
        assert_eq!(Severity::from_code(-1), None);
        assert!(Severity::Fatal.score() > Severity::Serious.score());
        assert!(Severity::Serious.score() > Severity::Slight.score());
    }

    #[test]
    fn test_unknown_codes_fall_back() {
        assert_eq!(Weather::from_code(Some(42)), Weather::Unknown);
        assert_eq!(Weather::from_code(None), Weather::Unknown);
        assert_eq!(RoadType::from_code(Some(9)), RoadType::Unknown);
        assert_eq!(VehicleType::from_code(Some(999)), VehicleType::Other);
        assert_eq!(VehicleType::from_code(None), VehicleType::Unknown);
    }

    #[test]
    fn test_propulsion_closed_set() {
        assert_eq!(Propulsion::from_code(Some(1)), Propulsion::Petrol);
        assert_eq!(Propulsion::from_code(Some(2)), Propulsion::Diesel);
        assert_eq!(Propulsion::from_code(Some(12)), Propulsion::Other);
        assert_eq!(Propulsion::from_code(None), Propulsion::Other);
        assert_eq!(Propulsion::ALL.len(), 5);
    }

    #[test]
    fn test_age_group_bounds_are_ordered() {
        let bounds: Vec<u32> = AgeGroup::ALL.iter().map(|g| g.lower_bound()).collect();
        assert!(bounds.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_dataset_display() {
        assert_eq!(Dataset::Casualties.to_string(), "casualties");
        let json = serde_json::to_string(&Dataset::Vehicles).unwrap();
        assert_eq!(json, "\"vehicles\"");
    }
}
