// Fuel level tracking from distance travelled

use log::{debug, info};

use crate::errors::RideError;
use crate::geodesy::distance_meters;
use crate::storage::{
    FUEL_AVG_MILEAGE_KEY, FUEL_CURRENT_KEY, FUEL_TANK_CAPACITY_KEY, KeyValueStore,
    PersistentState,
};
use crate::telemetry::PositionSample;

pub const DEFAULT_TANK_CAPACITY_L: f64 = 8.;
pub const DEFAULT_AVG_MILEAGE_KM_PER_L: f64 = 42.;

/// Tank capacity, average mileage and the current fuel estimate.
///
/// Capacity and mileage edits never rescale `current_fuel_l`. Depletion and refuels
/// keep it within `[0, tank_capacity_l]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FuelState {
    pub tank_capacity_l: f64,
    pub avg_mileage_km_per_l: f64,
    pub current_fuel_l: f64,
}

impl Default for FuelState {
    fn default() -> Self {
        Self {
            tank_capacity_l: DEFAULT_TANK_CAPACITY_L,
            avg_mileage_km_per_l: DEFAULT_AVG_MILEAGE_KM_PER_L,
            current_fuel_l: DEFAULT_TANK_CAPACITY_L,
        }
    }
}

impl FuelState {
    /// Burn the fuel needed for `distance_km`. Does nothing without a positive mileage.
    pub fn consume_distance_km(&mut self, distance_km: f64) -> f64 {
        if self.avg_mileage_km_per_l <= 0. || !distance_km.is_finite() || distance_km <= 0. {
            return 0.;
        }
        let consumed = distance_km / self.avg_mileage_km_per_l;
        let before = self.current_fuel_l;
        self.current_fuel_l = (self.current_fuel_l - consumed).max(0.);
        before - self.current_fuel_l
    }

    /// Burn the fuel for the segment between the two most recent samples
    pub fn apply_sample_pair(&mut self, previous: &PositionSample, last: &PositionSample) -> f64 {
        let distance_km = distance_meters(previous.lat_lon(), last.lat_lon()) / 1000.;
        self.consume_distance_km(distance_km)
    }

    pub fn refuel(&mut self, liters: f64) -> Result<(), RideError> {
        if !liters.is_finite() || liters <= 0. {
            return Err(RideError::InvalidUserInput {
                field: "refuel".to_string(),
                reason: "Please enter a valid number of liters.".to_string(),
            });
        }
        self.current_fuel_l = (self.current_fuel_l + liters).min(self.tank_capacity_l);
        info!(
            "Refuelled {:.2} L, tank now at {:.2} L",
            liters, self.current_fuel_l
        );
        Ok(())
    }

    pub fn refuel_from_input(&mut self, input: &str) -> Result<(), RideError> {
        let liters = input
            .trim()
            .parse::<f64>()
            .map_err(|_| RideError::InvalidUserInput {
                field: "refuel".to_string(),
                reason: "Please enter a valid number of liters.".to_string(),
            })?;
        self.refuel(liters)
    }

    pub fn set_tank_capacity(&mut self, liters: f64) -> Result<(), RideError> {
        self.tank_capacity_l = validate_setting("tank capacity", liters)?;
        Ok(())
    }

    pub fn set_avg_mileage(&mut self, km_per_l: f64) -> Result<(), RideError> {
        self.avg_mileage_km_per_l = validate_setting("average mileage", km_per_l)?;
        Ok(())
    }

    /// Km left in the tank at the average mileage. Only refreshed when fuel changes.
    pub fn estimated_range_km(&self) -> f64 {
        self.current_fuel_l * self.avg_mileage_km_per_l
    }

    pub fn fuel_percentage(&self) -> f64 {
        if self.tank_capacity_l > 0. {
            self.current_fuel_l / self.tank_capacity_l * 100.
        } else {
            0.
        }
    }
}

/// Parse a settings form entry, an empty or non-numeric entry reads as 0
pub fn parse_setting_input(input: &str) -> f64 {
    input.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.)
}

fn validate_setting(field: &str, value: f64) -> Result<f64, RideError> {
    if !value.is_finite() || value < 0. {
        return Err(RideError::InvalidUserInput {
            field: field.to_string(),
            reason: format!("{} is not a valid value", value),
        });
    }
    Ok(value)
}

/// The fuel state mirrored to its three store entries
pub struct PersistedFuel {
    tank_capacity_l: PersistentState<f64>,
    avg_mileage_km_per_l: PersistentState<f64>,
    current_fuel_l: PersistentState<f64>,
}

impl PersistedFuel {
    pub fn load(store: &dyn KeyValueStore, defaults: FuelState) -> Self {
        Self {
            tank_capacity_l: PersistentState::load(
                store,
                FUEL_TANK_CAPACITY_KEY,
                defaults.tank_capacity_l,
            ),
            avg_mileage_km_per_l: PersistentState::load(
                store,
                FUEL_AVG_MILEAGE_KEY,
                defaults.avg_mileage_km_per_l,
            ),
            current_fuel_l: PersistentState::load(
                store,
                FUEL_CURRENT_KEY,
                defaults.current_fuel_l,
            ),
        }
    }

    pub fn state(&self) -> FuelState {
        FuelState {
            tank_capacity_l: *self.tank_capacity_l.get(),
            avg_mileage_km_per_l: *self.avg_mileage_km_per_l.get(),
            current_fuel_l: *self.current_fuel_l.get(),
        }
    }

    /// Write back the entries that changed
    pub fn commit(&mut self, store: &mut dyn KeyValueStore, fuel: FuelState) {
        let current = self.state();
        if current.tank_capacity_l != fuel.tank_capacity_l {
            self.tank_capacity_l.set(store, fuel.tank_capacity_l);
        }
        if current.avg_mileage_km_per_l != fuel.avg_mileage_km_per_l {
            self.avg_mileage_km_per_l.set(store, fuel.avg_mileage_km_per_l);
        }
        if current.current_fuel_l != fuel.current_fuel_l {
            debug!("Fuel level {:.3} L", fuel.current_fuel_l);
            self.current_fuel_l.set(store, fuel.current_fuel_l);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use proptest::prelude::*;

    #[test]
    fn test_depletion_over_42_km() {
        let mut fuel = FuelState::default();
        fuel.consume_distance_km(42.);
        assert!((fuel.current_fuel_l - 7.).abs() < 1e-9);
        assert!((fuel.estimated_range_km() - 294.).abs() < 1e-9);
    }

    #[test]
    fn test_sample_pair_depletion() {
        let mut fuel = FuelState::default();
        let a = PositionSample {
            lat: 0.,
            lon: 0.,
            accuracy: None,
            altitude: None,
            altitude_accuracy: None,
            heading: None,
            speed: 0.,
            timestamp: 0,
        };
        let b = PositionSample { lon: 0.001, ..a.clone() };
        let burnt = fuel.apply_sample_pair(&a, &b);
        assert!((burnt - 0.11119 / 42.).abs() < 1e-6);
    }

    #[test]
    fn test_refuel_is_clamped_to_capacity() {
        let mut fuel = FuelState {
            current_fuel_l: 6.,
            ..Default::default()
        };
        fuel.refuel(5.).unwrap();
        assert_eq!(fuel.current_fuel_l, 8.);
    }

    #[test]
    fn test_invalid_refuel_is_rejected() {
        let mut fuel = FuelState {
            current_fuel_l: 3.,
            ..Default::default()
        };
        assert!(matches!(
            fuel.refuel(0.),
            Err(RideError::InvalidUserInput { .. })
        ));
        assert!(fuel.refuel(-2.).is_err());
        assert!(fuel.refuel(f64::NAN).is_err());
        assert!(fuel.refuel_from_input("five").is_err());
        assert!(fuel.refuel_from_input("").is_err());
        assert_eq!(fuel.current_fuel_l, 3.);

        fuel.refuel_from_input(" 2.5 ").unwrap();
        assert_eq!(fuel.current_fuel_l, 5.5);
    }

    #[test]
    fn test_zero_mileage_consumes_nothing() {
        let mut fuel = FuelState {
            avg_mileage_km_per_l: 0.,
            ..Default::default()
        };
        assert_eq!(fuel.consume_distance_km(100.), 0.);
        assert_eq!(fuel.current_fuel_l, 8.);
        assert_eq!(fuel.estimated_range_km(), 0.);
    }

    #[test]
    fn test_settings_do_not_rescale_current_fuel() {
        let mut fuel = FuelState {
            current_fuel_l: 4.,
            ..Default::default()
        };
        fuel.set_tank_capacity(12.).unwrap();
        fuel.set_avg_mileage(30.).unwrap();
        assert_eq!(fuel.current_fuel_l, 4.);
        assert_eq!(fuel.fuel_percentage(), 4. / 12. * 100.);
        assert!(fuel.set_tank_capacity(-1.).is_err());
        assert!(fuel.set_avg_mileage(f64::INFINITY).is_err());
        assert_eq!(fuel.tank_capacity_l, 12.);
    }

    #[test]
    fn test_setting_input_parsing() {
        assert_eq!(parse_setting_input("9.5"), 9.5);
        assert_eq!(parse_setting_input("abc"), 0.);
        assert_eq!(parse_setting_input(""), 0.);
    }

    #[test]
    fn test_fuel_percentage_without_capacity() {
        let fuel = FuelState {
            tank_capacity_l: 0.,
            ..Default::default()
        };
        assert_eq!(fuel.fuel_percentage(), 0.);
    }

    #[test]
    fn test_persisted_fuel_commits_changes() {
        let mut store = MemoryStore::new();
        let mut persisted = PersistedFuel::load(&store, FuelState::default());
        assert_eq!(persisted.state(), FuelState::default());

        let mut fuel = persisted.state();
        fuel.consume_distance_km(21.);
        persisted.commit(&mut store, fuel);

        assert_eq!(store.len(), 1);
        let reloaded = PersistedFuel::load(&store, FuelState::default());
        assert!((reloaded.state().current_fuel_l - 7.5).abs() < 1e-9);
    }

    #[derive(Debug, Clone)]
    enum FuelEvent {
        Drive(f64),
        Refuel(f64),
    }

    fn fuel_event() -> impl Strategy<Value = FuelEvent> {
        prop_oneof![
            (0.0f64..500.0).prop_map(FuelEvent::Drive),
            (-5.0f64..20.0).prop_map(FuelEvent::Refuel),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_fuel_stays_within_tank(
            capacity in 1.0f64..30.0,
            mileage in 0.0f64..80.0,
            events in proptest::collection::vec(fuel_event(), 0..60),
        ) {
            let mut fuel = FuelState {
                tank_capacity_l: capacity,
                avg_mileage_km_per_l: mileage,
                current_fuel_l: capacity,
            };
            for event in events {
                match event {
                    FuelEvent::Drive(km) => {
                        fuel.consume_distance_km(km);
                    }
                    FuelEvent::Refuel(liters) => {
                        let before = fuel.current_fuel_l;
                        if fuel.refuel(liters).is_err() {
                            prop_assert!(liters <= 0.);
                            prop_assert_eq!(fuel.current_fuel_l, before);
                        }
                    }
                }
                prop_assert!(fuel.current_fuel_l >= 0.);
                prop_assert!(fuel.current_fuel_l <= capacity);
            }
        }
    }
}
