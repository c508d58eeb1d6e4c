pub mod aggregator;
pub mod collector;
pub mod producer;
pub mod stop_detector;

pub use aggregator::RideStats;
pub use collector::collect_fixes;
use serde::{Deserialize, Serialize};
use uom::si::f64::Velocity;
use uom::si::velocity::{kilometer_per_hour, meter_per_second};

use crate::geodesy::LatLon;

/// One recorded location fix.
///
/// Samples are immutable once appended to a session and serialize with the camelCase
/// field names used by the persisted session records.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PositionSample {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lon: f64,
    /// Horizontal accuracy, meters
    pub accuracy: Option<f64>,
    /// Altitude, meters
    pub altitude: Option<f64>,
    /// Altitude accuracy, meters
    pub altitude_accuracy: Option<f64>,
    /// Heading in degrees clockwise from true north
    pub heading: Option<f64>,
    /// Ground speed, m/s. Never negative
    pub speed: f64,
    /// Milliseconds since the unix epoch
    pub timestamp: i64,
}

impl PositionSample {
    pub fn lat_lon(&self) -> LatLon {
        (self.lat, self.lon)
    }

    pub fn speed_kmh(&self) -> f64 {
        mps_to_kmh(self.speed)
    }
}

/// A fix as reported by the device, before it is accepted into a session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawFix {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
    #[serde(default)]
    pub altitude_accuracy: Option<f64>,
    #[serde(default)]
    pub heading: Option<f64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
}

impl RawFix {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat,
            lon,
            ..Default::default()
        }
    }

    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed = Some(speed_mps);
        self
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    /// Device speed in m/s, with unknown, non-finite or negative readings mapped to 0
    pub fn sanitized_speed_mps(&self) -> f64 {
        match self.speed {
            Some(speed) if speed.is_finite() && speed > 0. => speed,
            _ => 0.,
        }
    }

    /// Turn the raw fix into a session sample. A missing or zero device timestamp is
    /// replaced with `now_ms`.
    pub fn into_sample(self, now_ms: i64) -> PositionSample {
        let speed = self.sanitized_speed_mps();
        PositionSample {
            lat: self.lat,
            lon: self.lon,
            accuracy: self.accuracy,
            altitude: self.altitude,
            altitude_accuracy: self.altitude_accuracy,
            heading: self.heading,
            speed,
            timestamp: self.timestamp.filter(|t| *t != 0).unwrap_or(now_ms),
        }
    }
}

/// Error reported by the fix source. The stream is considered dead afterwards.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FixError {
    pub message: String,
}

#[derive(Clone, Debug, PartialEq)]
pub enum FixEvent {
    Fix(RawFix),
    Error(FixError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeolocationPermission {
    Granted,
    Prompt,
    Denied,
    /// The permission state could not be queried
    Unknown,
}

/// Capability and permission of a position source, checked before recording starts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceStatus {
    pub available: bool,
    pub permission: GeolocationPermission,
}

impl SourceStatus {
    pub fn ready() -> Self {
        Self {
            available: true,
            permission: GeolocationPermission::Granted,
        }
    }
}

pub fn mps_to_kmh(speed_mps: f64) -> f64 {
    Velocity::new::<meter_per_second>(speed_mps).get::<kilometer_per_hour>()
}
