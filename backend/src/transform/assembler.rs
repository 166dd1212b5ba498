//! SchemaAssembler: build the dimension, fact and lineage tables.
//!
//! ```text
//! enriched collisions ──┬──▶ dim_time (distinct date+hour)
//!                       ├──▶ dim_collision (one per collision)
//!                       └──▶ fact_accident (one per collision)
//! sampled vehicles ─────────▶ dim_vehicle  ─┐
//! enriched casualties ──────▶ dim_casualty ─┴─▶ lineage (key -> source row)
//! ```
//!
//! Vehicle and casualty rows are linked to collisions only through lineage.
//! Rows whose collision was not retained are dropped here and counted.

use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;

use crate::error::{IntegrityError, Violation};
use crate::models::star::{DIM_CASUALTY, DIM_COLLISION, DIM_TIME, DIM_VEHICLE};
use crate::models::{
    CasualtyDim, CollisionDim, Dataset, EnrichedCasualty, EnrichedCollision, EnrichedVehicle,
    FactAccident, LineageEntry, Propulsion, StarSchema, TimeDim, VehicleDim,
};

use super::keys::{DimensionPolicy, KeyAssigner, KeySequence};

/// Drop rule for vehicle and casualty rows whose collision was not retained.
pub const RULE_COLLISION_NOT_RETAINED: &str = "collision_not_retained";

/// Natural key of `dim_time`.
pub type TimeSlot = (NaiveDate, u32);

/// Key mappings of every dimension, allocated from one run-wide sequence.
#[derive(Debug, Clone)]
pub struct KeyPlan {
    pub time: KeyAssigner<TimeSlot>,
    pub collision: KeyAssigner<String>,
    /// Natural key is the vehicle's source row.
    pub vehicle: KeyAssigner<usize>,
    /// Natural key is the casualty's source row.
    pub casualty: KeyAssigner<usize>,
}

impl KeyPlan {
    /// Allocate keys in the fixed order time, collision, vehicle, casualty.
    pub fn assign(
        collisions: &[EnrichedCollision],
        vehicles: &[&EnrichedVehicle],
        casualties: &[&EnrichedCasualty],
    ) -> Result<Self, IntegrityError> {
        let mut sequence = KeySequence::new();

        let time = KeyAssigner::assign(
            DIM_TIME,
            DimensionPolicy::Deduplicate,
            collisions.iter().map(|c| (c.record.date, c.record.hour)),
            &mut sequence,
        )?;
        let collision = KeyAssigner::assign(
            DIM_COLLISION,
            DimensionPolicy::PerSourceRow,
            collisions.iter().map(|c| c.record.collision_index.clone()),
            &mut sequence,
        )?;
        let vehicle = KeyAssigner::assign(
            DIM_VEHICLE,
            DimensionPolicy::PerSourceRow,
            vehicles.iter().map(|v| v.record.source_row),
            &mut sequence,
        )?;
        let casualty = KeyAssigner::assign(
            DIM_CASUALTY,
            DimensionPolicy::PerSourceRow,
            casualties.iter().map(|c| c.record.source_row),
            &mut sequence,
        )?;

        Ok(Self {
            time,
            collision,
            vehicle,
            casualty,
        })
    }
}

/// The assembled schema plus what the assembler dropped.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub schema: StarSchema,
    pub vehicles_not_retained: usize,
    pub casualties_not_retained: usize,
}

/// Split rows into those whose collision is retained, and a drop count.
fn link<'a, T>(
    rows: &'a [T],
    retained: &HashSet<&str>,
    collision_of: impl Fn(&T) -> &str,
) -> (Vec<&'a T>, usize) {
    let linked: Vec<&T> = rows
        .iter()
        .filter(|r| retained.contains(collision_of(r)))
        .collect();
    let dropped = rows.len() - linked.len();
    (linked, dropped)
}

/// Assemble the star schema from enriched (and sampled) records.
pub fn assemble(
    collisions: &[EnrichedCollision],
    vehicles: &[EnrichedVehicle],
    casualties: &[EnrichedCasualty],
) -> Result<Assembly, IntegrityError> {
    let retained: HashSet<&str> = collisions
        .iter()
        .map(|c| c.record.collision_index.as_str())
        .collect();

    let (vehicles, vehicles_not_retained) =
        link(vehicles, &retained, |v| v.record.collision_index.as_str());
    let (casualties, casualties_not_retained) =
        link(casualties, &retained, |c| c.record.collision_index.as_str());

    let keys = KeyPlan::assign(collisions, &vehicles, &casualties)?;
    let schema = build(&keys, collisions, &vehicles, &casualties)?;

    Ok(Assembly {
        schema,
        vehicles_not_retained,
        casualties_not_retained,
    })
}

/// Materialise tables from a key plan.
///
/// Dimension rows take their key from the dimension's block; fact rows
/// resolve theirs through the mapping, so a mapping that points outside the
/// block is caught here.
pub fn build(
    keys: &KeyPlan,
    collisions: &[EnrichedCollision],
    vehicles: &[&EnrichedVehicle],
    casualties: &[&EnrichedCasualty],
) -> Result<StarSchema, IntegrityError> {
    let mut violations = Vec::new();
    let mut schema = StarSchema::default();

    schema.dim_time = keys
        .time
        .entries()
        .into_iter()
        .map(|(&(date, hour), time_key)| TimeDim {
            time_key,
            date,
            year: date.year(),
            month: date.month(),
            day_of_week: date.format("%A").to_string(),
            hour,
        })
        .collect();

    let collision_block = keys.collision.block();
    for (i, c) in collisions.iter().enumerate() {
        let Some(collision_key) = collision_block.key(i) else {
            violations.push(Violation::UnmappedNaturalKey {
                table: DIM_COLLISION,
                natural_key: c.record.collision_index.clone(),
            });
            continue;
        };
        schema.dim_collision.push(CollisionDim {
            collision_key,
            severity: c.record.severity.label(),
            weather: c.record.weather.label(),
            road_type: c.record.road_type.label(),
            latitude: c.record.latitude,
            longitude: c.record.longitude,
        });
        schema.lineage.collisions.push(LineageEntry {
            key: collision_key,
            dataset: Dataset::Collisions,
            source_row: c.record.source_row,
            collision_index: c.record.collision_index.clone(),
        });
    }

    let time_block = keys.time.block();
    for (fact_row, c) in collisions.iter().enumerate() {
        let collision_key = match keys.collision.resolve(&c.record.collision_index) {
            Ok(key) => key,
            Err(v) => {
                violations.push(v);
                continue;
            }
        };
        let time_key = match keys.time.resolve(&(c.record.date, c.record.hour)) {
            Ok(key) => key,
            Err(v) => {
                violations.push(v);
                continue;
            }
        };

        for (column, table, key, block) in [
            ("collision_key", DIM_COLLISION, collision_key, collision_block),
            ("time_key", DIM_TIME, time_key, time_block),
        ] {
            if !block.contains(key) {
                violations.push(Violation::UnresolvedForeignKey {
                    fact_row,
                    collision_index: c.record.collision_index.clone(),
                    column,
                    table,
                    key,
                });
            }
        }

        schema.fact_accident.push(FactAccident {
            collision_key,
            time_key,
            total_vehicles: c.record.number_of_vehicles,
            total_casualties: c.record.number_of_casualties,
            accident_count: 1,
            risk_index: c.risk_index,
        });
    }

    for v in vehicles {
        let vehicle_key = match keys.vehicle.resolve(&v.record.source_row) {
            Ok(key) => key,
            Err(e) => {
                violations.push(e);
                continue;
            }
        };
        let flags = &v.propulsion_flags;
        schema.dim_vehicle.push(VehicleDim {
            vehicle_key,
            vehicle_type: v.record.vehicle_type.label(),
            engine_capacity: v.engine_capacity_cc,
            propulsion_petrol: flags.get(Propulsion::Petrol),
            propulsion_diesel: flags.get(Propulsion::Diesel),
            propulsion_electric: flags.get(Propulsion::Electric),
            propulsion_hybrid: flags.get(Propulsion::Hybrid),
            propulsion_other: flags.get(Propulsion::Other),
            driver_age: v.record.driver_age,
        });
        schema.lineage.vehicles.push(LineageEntry {
            key: vehicle_key,
            dataset: Dataset::Vehicles,
            source_row: v.record.source_row,
            collision_index: v.record.collision_index.clone(),
        });
    }

    for c in casualties {
        let casualty_key = match keys.casualty.resolve(&c.record.source_row) {
            Ok(key) => key,
            Err(e) => {
                violations.push(e);
                continue;
            }
        };
        schema.dim_casualty.push(CasualtyDim {
            casualty_key,
            class: c.record.class.label(),
            age_group: c.age_group.label(),
            severity: c.record.severity.label(),
        });
        schema.lineage.casualties.push(LineageEntry {
            key: casualty_key,
            dataset: Dataset::Casualties,
            source_row: c.record.source_row,
            collision_index: c.record.collision_index.clone(),
        });
    }

    if violations.is_empty() {
        Ok(schema)
    } else {
        Err(IntegrityError::Violations(violations))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::{
        CasualtyClass, CasualtyRecord, CollisionRecord, RoadType, Severity, VehicleRecord,
        VehicleType, Weather,
    };
    use crate::transform::features::{enrich_casualty, enrich_collision, enrich_vehicle};

    pub(crate) fn collision(index: &str, row: usize, day: u32, hour: u32) -> EnrichedCollision {
        enrich_collision(
            CollisionRecord {
                source_row: row,
                collision_index: index.to_string(),
                date: NaiveDate::from_ymd_opt(2023, 1, day).unwrap(),
                hour,
                severity: Severity::Serious,
                number_of_vehicles: 2,
                number_of_casualties: 1,
                weather: Weather::Fine,
                road_type: RoadType::SingleCarriageway,
                speed_limit: Some(30.0),
                latitude: Some(51.5),
                longitude: Some(-0.1),
            },
            30.0,
        )
    }

    pub(crate) fn vehicle(index: &str, row: usize) -> EnrichedVehicle {
        enrich_vehicle(
            VehicleRecord {
                source_row: row,
                collision_index: index.to_string(),
                vehicle_reference: 1,
                vehicle_type: VehicleType::Car,
                engine_capacity_cc: Some(1600.0),
                propulsion_code: Some(2),
                driver_age: 33,
            },
            1600.0,
        )
    }

    pub(crate) fn casualty(index: &str, row: usize) -> EnrichedCasualty {
        enrich_casualty(CasualtyRecord {
            source_row: row,
            collision_index: index.to_string(),
            vehicle_reference: Some(1),
            casualty_reference: 1,
            class: CasualtyClass::Passenger,
            age: 8,
            severity: Severity::Slight,
        })
    }

    #[test]
    fn test_assemble_small_schema() {
        // Jan 2 2023 was a Monday
        let collisions = vec![collision("A1", 0, 2, 8), collision("A2", 1, 2, 8), collision("A3", 2, 3, 17)];
        let vehicles = vec![vehicle("A1", 0), vehicle("A3", 1), vehicle("ZZ", 2)];
        let casualties = vec![casualty("A2", 0), casualty("GONE", 1)];

        let assembly = assemble(&collisions, &vehicles, &casualties).unwrap();
        let schema = &assembly.schema;

        assert_eq!(schema.dim_time.len(), 2);
        assert_eq!(schema.dim_time[0].time_key, 1);
        assert_eq!(schema.dim_time[0].day_of_week, "Monday");
        assert_eq!(schema.dim_time[1].day_of_week, "Tuesday");

        let collision_keys: Vec<u64> = schema.dim_collision.iter().map(|c| c.collision_key).collect();
        assert_eq!(collision_keys, vec![3, 4, 5]);
        assert_eq!(schema.dim_vehicle.iter().map(|v| v.vehicle_key).collect::<Vec<_>>(), vec![6, 7]);
        assert_eq!(schema.dim_casualty[0].casualty_key, 8);
        assert_eq!(schema.dim_casualty[0].age_group, "Child");

        assert_eq!(schema.fact_accident.len(), 3);
        assert_eq!(schema.fact_accident[1].time_key, 1);
        assert_eq!(schema.fact_accident[2].time_key, 2);
        assert_eq!(schema.fact_accident[0].accident_count, 1);
        // 2 vehicles, 1 casualty, Serious
        assert!((schema.fact_accident[0].risk_index - 6.4).abs() < 1e-9);

        assert_eq!(assembly.vehicles_not_retained, 1);
        assert_eq!(assembly.casualties_not_retained, 1);
        assert_eq!(schema.lineage.vehicles[1].collision_index, "A3");
        assert_eq!(schema.lineage.vehicles[1].source_row, 1);
    }

    #[test]
    fn test_vehicle_propulsion_columns() {
        let collisions = vec![collision("A1", 0, 2, 8)];
        let assembly = assemble(&collisions, &[vehicle("A1", 0)], &[]).unwrap();
        let v = &assembly.schema.dim_vehicle[0];
        assert_eq!(
            [v.propulsion_petrol, v.propulsion_diesel, v.propulsion_electric, v.propulsion_hybrid, v.propulsion_other],
            [0, 1, 0, 0, 0]
        );
        assert_eq!(v.vehicle_type, "Car");
    }

    #[test]
    fn test_corrupted_collision_mapping_rejected() {
        let collisions = vec![collision("A1", 0, 2, 8), collision("A2", 1, 2, 9)];
        let mut keys = KeyPlan::assign(&collisions, &[], &[]).unwrap();
        keys.collision.remap("A2".to_string(), 999);

        let err = build(&keys, &collisions, &[], &[]).unwrap_err();
        assert!(err.violations().iter().any(|v| matches!(
            v,
            Violation::UnresolvedForeignKey { key: 999, fact_row: 1, column: "collision_key", .. }
        )));
    }
}
