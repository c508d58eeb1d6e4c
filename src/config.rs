use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::RideError;
use crate::fuel::{DEFAULT_AVG_MILEAGE_KM_PER_L, DEFAULT_TANK_CAPACITY_L, FuelState};
use crate::telemetry::stop_detector::{STOP_SPEED_THRESHOLD_KMH, STOP_WINDOW};

const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Where the store keeps its entries, the platform data directory when unset
    pub store_dir: Option<PathBuf>,
    pub stop_speed_threshold_kmh: f64,
    pub stop_window_s: u64,
    /// Used until the user edits the fuel settings
    pub default_tank_capacity_l: f64,
    pub default_avg_mileage_km_per_l: f64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store_dir: None,
            stop_speed_threshold_kmh: STOP_SPEED_THRESHOLD_KMH,
            stop_window_s: STOP_WINDOW.as_secs(),
            default_tank_capacity_l: DEFAULT_TANK_CAPACITY_L,
            default_avg_mileage_km_per_l: DEFAULT_AVG_MILEAGE_KM_PER_L,
        }
    }
}

impl AppConfig {
    pub fn stop_window(&self) -> Duration {
        Duration::from_secs(self.stop_window_s)
    }

    /// Fuel state for a first run, with a full tank
    pub fn default_fuel(&self) -> FuelState {
        FuelState {
            tank_capacity_l: self.default_tank_capacity_l,
            avg_mileage_km_per_l: self.default_avg_mileage_km_per_l,
            current_fuel_l: self.default_tank_capacity_l,
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join("ridelog").join(CONFIG_FILE_NAME))
    }

    pub fn from_local_file() -> Option<Self> {
        Self::from_file(&Self::default_path()?)
    }

    pub fn from_file(config_path: &Path) -> Option<Self> {
        if !config_path.exists() {
            return None;
        }
        let file = match std::fs::File::open(config_path) {
            Ok(file) => file,
            Err(e) => {
                warn!("Could not open config file {:?}: {}", config_path, e);
                return None;
            }
        };
        match serde_json::from_reader(file) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Could not parse config file {:?}: {}", config_path, e);
                None
            }
        }
    }

    pub fn save(&self) -> Result<(), RideError> {
        let config_path = Self::default_path().ok_or(RideError::NoConfigDir)?;
        self.save_to(&config_path)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<(), RideError> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| RideError::ConfigIOError { source: e })?;
        }

        let file = std::fs::File::create(config_path)
            .map_err(|e| RideError::ConfigIOError { source: e })?;
        serde_json::to_writer_pretty(file, self)
            .map_err(|e| RideError::ConfigSerializeError { source: e })
    }
}
