// Read-only projection of the ride stats for displays

use chrono::{Local, TimeZone};
use log::info;

use crate::session::StatsSnapshot;
use crate::telemetry::PositionSample;

/// Average speeds inside this band are the bike's most fuel efficient cruising range
const EFFICIENT_SPEED_KMH: std::ops::RangeInclusive<f64> = 40.0..=55.0;

/// Receives every stats change. Listeners never own or mutate ride state.
pub trait StatsListener {
    fn stats_changed(&mut self, stats: &StatsSnapshot);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EfficiencyIndicator {
    Green,
    Yellow,
    Gray,
}

impl EfficiencyIndicator {
    pub fn from_avg_speed(avg_speed_kmh: f64) -> Self {
        if avg_speed_kmh == 0. {
            EfficiencyIndicator::Gray
        } else if EFFICIENT_SPEED_KMH.contains(&avg_speed_kmh) {
            EfficiencyIndicator::Green
        } else {
            EfficiencyIndicator::Yellow
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            EfficiencyIndicator::Green => "green",
            EfficiencyIndicator::Yellow => "yellow",
            EfficiencyIndicator::Gray => "gray",
        }
    }
}

/// Format with a fixed number of decimals. Missing and non-finite values render as zero.
pub fn fmt_number(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", decimals, v),
        _ => format!("{:.*}", decimals, 0.),
    }
}

/// The stat cards of the dashboard, already formatted
#[derive(Clone, Debug, PartialEq)]
pub struct DashboardView {
    pub speed_kmh: String,
    pub distance_km: String,
    pub avg_speed_kmh: String,
    pub efficiency: EfficiencyIndicator,
    pub range_km: String,
    pub fuel_l: String,
    pub tank_capacity_l: String,
    pub fuel_percentage: f64,
    pub area_m2: String,
}

impl From<&StatsSnapshot> for DashboardView {
    fn from(stats: &StatsSnapshot) -> Self {
        Self {
            speed_kmh: fmt_number(Some(stats.last_speed_kmh), 1),
            distance_km: fmt_number(Some(stats.distance_km), 2),
            avg_speed_kmh: fmt_number(Some(stats.avg_speed_kmh), 1),
            efficiency: EfficiencyIndicator::from_avg_speed(stats.avg_speed_kmh),
            range_km: fmt_number(Some(stats.estimated_range_km), 0),
            fuel_l: fmt_number(Some(stats.current_fuel_l), 2),
            tank_capacity_l: fmt_number(Some(stats.tank_capacity_l), 1),
            fuel_percentage: stats.fuel_percentage,
            area_m2: fmt_number(Some(stats.area_m2), 0),
        }
    }
}

impl DashboardView {
    /// Single line rendering used by the terminal mini dashboard
    pub fn render_line(&self) -> String {
        format!(
            "speed {} km/h | distance {} km | avg {} km/h ({}) | range {} km | fuel {}/{} L ({:.0}%) | area {} m²",
            self.speed_kmh,
            self.distance_km,
            self.avg_speed_kmh,
            self.efficiency.label(),
            self.range_km,
            self.fuel_l,
            self.tank_capacity_l,
            self.fuel_percentage,
            self.area_m2,
        )
    }
}

/// Mini dashboard mirroring the stats to the log
#[derive(Default)]
pub struct LogDashboard {
    last_line: Option<String>,
}

impl StatsListener for LogDashboard {
    fn stats_changed(&mut self, stats: &StatsSnapshot) {
        let line = DashboardView::from(stats).render_line();
        // fixes often arrive without changing any displayed figure
        if self.last_line.as_deref() != Some(line.as_str()) {
            info!("{}", line);
            self.last_line = Some(line);
        }
    }
}

/// One row of the recorded points table, already formatted
#[derive(Clone, Debug, PartialEq)]
pub struct PointRow {
    /// 1-based position in the recording
    pub number: usize,
    pub lat: String,
    pub lon: String,
    /// Local wall-clock time of the fix
    pub time: String,
    pub speed_kmh: String,
}

fn local_time(timestamp_ms: i64) -> String {
    match Local.timestamp_millis_opt(timestamp_ms).single() {
        Some(time) => time.format("%-I:%M:%S %p").to_string(),
        None => "-".to_string(),
    }
}

/// Rows for the recorded points, newest first
pub fn point_rows(positions: &[PositionSample]) -> Vec<PointRow> {
    positions
        .iter()
        .enumerate()
        .rev()
        .map(|(i, sample)| PointRow {
            number: i + 1,
            lat: format!("{:.6}", sample.lat),
            lon: format!("{:.6}", sample.lon),
            time: local_time(sample.timestamp),
            speed_kmh: fmt_number(Some(sample.speed_kmh()), 1),
        })
        .collect()
}

/// Text table of the recorded points, newest first. `limit` caps the number of rows,
/// the title always carries the full count.
pub fn render_points_table(positions: &[PositionSample], limit: Option<usize>) -> String {
    let mut out = format!("Recorded Points ({})\n", positions.len());
    if positions.is_empty() {
        out.push_str("No points recorded yet.\nRun `ridelog record` to begin tracking.\n");
        return out;
    }
    out.push_str(&format!(
        "{:>6}  {:>11}  {:>11}  {:>11}  {:>12}\n",
        "#", "Latitude", "Longitude", "Time", "Speed (km/h)"
    ));
    for row in point_rows(positions)
        .into_iter()
        .take(limit.unwrap_or(usize::MAX))
    {
        out.push_str(&format!(
            "{:>6}  {:>11}  {:>11}  {:>11}  {:>12}\n",
            row.number, row.lat, row.lon, row.time, row.speed_kmh
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fuel::FuelState;

    #[test]
    fn test_fmt_number() {
        assert_eq!(fmt_number(Some(3.14159), 2), "3.14");
        assert_eq!(fmt_number(Some(293.6), 0), "294");
        assert_eq!(fmt_number(None, 1), "0.0");
        assert_eq!(fmt_number(Some(f64::NAN), 2), "0.00");
        assert_eq!(fmt_number(Some(f64::INFINITY), 0), "0");
    }

    #[test]
    fn test_efficiency_indicator() {
        assert_eq!(EfficiencyIndicator::from_avg_speed(0.), EfficiencyIndicator::Gray);
        assert_eq!(EfficiencyIndicator::from_avg_speed(40.), EfficiencyIndicator::Green);
        assert_eq!(EfficiencyIndicator::from_avg_speed(55.), EfficiencyIndicator::Green);
        assert_eq!(EfficiencyIndicator::from_avg_speed(30.), EfficiencyIndicator::Yellow);
        assert_eq!(EfficiencyIndicator::from_avg_speed(70.), EfficiencyIndicator::Yellow);
    }

    #[test]
    fn test_view_from_snapshot() {
        let stats = StatsSnapshot {
            recording: true,
            points: 12,
            distance_km: 1.234,
            last_speed_kmh: 45.67,
            avg_speed_kmh: 42.,
            area_m2: 12_309.8,
            current_fuel_l: 6.,
            tank_capacity_l: 8.,
            fuel_percentage: 75.,
            estimated_range_km: 252.,
        };
        let view = DashboardView::from(&stats);
        assert_eq!(view.distance_km, "1.23");
        assert_eq!(view.speed_kmh, "45.7");
        assert_eq!(view.range_km, "252");
        assert_eq!(view.fuel_percentage, 75.);
        assert_eq!(view.efficiency, EfficiencyIndicator::Green);
        assert!(view.render_line().contains("fuel 6.00/8.0 L (75%)"));
    }

    #[test]
    fn test_percentage_comes_from_fuel_state() {
        let fuel = FuelState {
            tank_capacity_l: 0.,
            avg_mileage_km_per_l: 42.,
            current_fuel_l: 2.,
        };
        let stats = StatsSnapshot {
            current_fuel_l: fuel.current_fuel_l,
            tank_capacity_l: fuel.tank_capacity_l,
            fuel_percentage: fuel.fuel_percentage(),
            ..Default::default()
        };
        let view = DashboardView::from(&stats);
        assert_eq!(view.fuel_percentage, 0.);
        assert!(view.render_line().contains("fuel 2.00/0.0 L (0%)"));
    }

    fn sample(lat: f64, lon: f64, speed: f64, timestamp: i64) -> PositionSample {
        PositionSample {
            lat,
            lon,
            accuracy: None,
            altitude: None,
            altitude_accuracy: None,
            heading: None,
            speed,
            timestamp,
        }
    }

    #[test]
    fn test_point_rows_newest_first() {
        let positions = vec![
            sample(12.9716, 77.5946, 10., 1_700_000_000_000),
            sample(12.97161234, 77.59461234, 0., 1_700_000_005_000),
        ];
        let rows = point_rows(&positions);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].number, 2);
        assert_eq!(rows[0].lat, "12.971612");
        assert_eq!(rows[0].lon, "77.594612");
        assert_eq!(rows[0].speed_kmh, "0.0");
        assert_eq!(rows[1].number, 1);
        assert_eq!(rows[1].lat, "12.971600");
        assert_eq!(rows[1].speed_kmh, "36.0");

        let expected_time = Local
            .timestamp_millis_opt(1_700_000_000_000)
            .unwrap()
            .format("%-I:%M:%S %p")
            .to_string();
        assert_eq!(rows[1].time, expected_time);
    }

    #[test]
    fn test_points_table() {
        let empty = render_points_table(&[], None);
        assert!(empty.starts_with("Recorded Points (0)"));
        assert!(empty.contains("No points recorded yet."));

        let positions: Vec<PositionSample> = (0..5)
            .map(|i| sample(0., i as f64 * 0.001, 5., 1_700_000_000_000 + i * 1_000))
            .collect();
        let table = render_points_table(&positions, Some(2));
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Recorded Points (5)");
        assert!(lines[1].contains("Speed (km/h)"));
        assert_eq!(lines.len(), 4);
        assert!(lines[2].trim_start().starts_with("5 "));
        assert!(lines[2].contains("0.004000"));
        assert!(lines[3].trim_start().starts_with("4 "));
        assert!(lines[3].contains("18.0"));
    }
}
