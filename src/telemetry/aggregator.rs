use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::geodesy::{coverage_area_m2, distance_meters, LatLon};

use super::PositionSample;

/// Summary figures persisted with an archived session
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub km: f64,
    pub avg_kmh: f64,
    pub area_m2: f64,
}

/// Figures derived from the whole sample sequence of a ride
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct RideStats {
    pub distance_km: f64,
    pub elapsed_s: f64,
    pub avg_speed_kmh: f64,
    pub area_m2: f64,
}

impl RideStats {
    /// Recompute every figure from the full sample sequence. `now_ms` is the wall
    /// clock at query time.
    pub fn compute(samples: &[PositionSample], started_at: Option<i64>, now_ms: i64) -> Self {
        let distance_km = total_distance_km(samples);
        let elapsed_s = elapsed_seconds(samples, started_at, now_ms);
        Self {
            distance_km,
            elapsed_s,
            avg_speed_kmh: avg_speed_kmh(distance_km, elapsed_s),
            area_m2: area_covered_m2(samples),
        }
    }

    pub fn session_stats(&self) -> SessionStats {
        SessionStats {
            km: self.distance_km,
            avg_kmh: self.avg_speed_kmh,
            area_m2: self.area_m2,
        }
    }
}

/// Distance between each consecutive pair of samples, in meters
pub fn segment_distances_m(samples: &[PositionSample]) -> impl Iterator<Item = f64> + '_ {
    samples
        .iter()
        .tuple_windows()
        .map(|(a, b)| distance_meters(a.lat_lon(), b.lat_lon()))
}

pub fn total_distance_km(samples: &[PositionSample]) -> f64 {
    let mut total_m = 0.;
    for segment in segment_distances_m(samples) {
        total_m += segment;
    }
    total_m / 1000.
}

pub fn elapsed_seconds(samples: &[PositionSample], started_at: Option<i64>, now_ms: i64) -> f64 {
    match started_at {
        Some(start) if !samples.is_empty() && start != 0 => (now_ms - start) as f64 / 1000.,
        _ => 0.,
    }
}

pub fn avg_speed_kmh(distance_km: f64, elapsed_s: f64) -> f64 {
    if elapsed_s > 0. {
        distance_km / (elapsed_s / 3600.)
    } else {
        0.
    }
}

pub fn area_covered_m2(samples: &[PositionSample]) -> f64 {
    let points: Vec<LatLon> = samples.iter().map(PositionSample::lat_lon).collect();
    coverage_area_m2(&points)
}
