// Great-circle distance and coverage area over lat/lon coordinates

use std::cmp::Ordering;
use std::f64::consts::PI;

/// Mean Earth radius used for haversine distances, in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// WGS84 equatorial radius used for the longitude scale factor, in meters
const WGS84_EQUATORIAL_RADIUS_M: f64 = 6_378_137.0;

/// A (latitude, longitude) pair in decimal degrees
pub type LatLon = (f64, f64);

/// Haversine distance in meters between two coordinates.
///
/// Out of range input produces NaN rather than panicking.
pub fn distance_meters(a: LatLon, b: LatLon) -> f64 {
    let (lat1, lon1) = a;
    let (lat2, lon2) = b;
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let h = (d_lat / 2.).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.).sin().powi(2);
    let c = 2. * h.sqrt().atan2((1. - h).sqrt());
    EARTH_RADIUS_M * c
}

fn cross(o: LatLon, a: LatLon, b: LatLon) -> f64 {
    (a.0 - o.0) * (b.1 - o.1) - (a.1 - o.1) * (b.0 - o.0)
}

fn lexicographic(a: &LatLon, b: &LatLon) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.total_cmp(&b.1))
}

/// Push `p` onto a monotone chain, dropping points that would make a non-left turn
fn push_chain(chain: &mut Vec<LatLon>, p: LatLon) {
    while chain.len() >= 2 && cross(chain[chain.len() - 2], chain[chain.len() - 1], p) <= 0. {
        chain.pop();
    }
    chain.push(p);
}

/// Convex hull using Andrew's monotone chain.
///
/// Points are sorted by (lat, lon); collinear points are not kept on the hull. The
/// returned polygon is in counter-clockwise order in (lat, lon) space and does not
/// repeat its first vertex.
pub fn convex_hull(points: &[LatLon]) -> Vec<LatLon> {
    let mut sorted = points.to_vec();
    sorted.sort_by(lexicographic);

    let mut lower: Vec<LatLon> = Vec::with_capacity(sorted.len());
    for p in sorted.iter() {
        push_chain(&mut lower, *p);
    }

    let mut upper: Vec<LatLon> = Vec::with_capacity(sorted.len());
    for p in sorted.iter().rev() {
        push_chain(&mut upper, *p);
    }

    // each chain ends where the other one starts
    upper.pop();
    lower.pop();
    lower.extend(upper);
    lower
}

/// Area in square meters of the convex hull of `points`.
///
/// The hull is projected on a local plane scaled at its mean latitude, which is only
/// accurate for regions that are small compared to the Earth.
pub fn coverage_area_m2(points: &[LatLon]) -> f64 {
    if points.len() < 3 {
        return 0.;
    }

    let hull = convex_hull(points);
    if hull.len() < 3 {
        return 0.;
    }

    let lat_ref = (hull.iter().map(|p| p.0).sum::<f64>() / hull.len() as f64) * (PI / 180.);
    let m_per_deg_lat =
        111_132.92 - 559.82 * (2. * lat_ref).cos() + 1.175 * (4. * lat_ref).cos();
    let m_per_deg_lon = (PI / 180.) * WGS84_EQUATORIAL_RADIUS_M * lat_ref.cos();

    let vertices: Vec<(f64, f64)> = hull
        .iter()
        .map(|(lat, lon)| (lon * m_per_deg_lon, lat * m_per_deg_lat))
        .collect();

    let mut area = 0.;
    for (i, (x1, y1)) in vertices.iter().enumerate() {
        let (x2, y2) = vertices[(i + 1) % vertices.len()];
        area += x1 * y2 - x2 * y1;
    }
    (area / 2.).abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SQUARE: [LatLon; 4] = [(0., 0.), (0., 0.001), (0.001, 0.001), (0.001, 0.)];

    #[test]
    fn test_distance_one_thousandth_degree_at_equator() {
        let dist = distance_meters((0., 0.), (0., 0.001));
        assert!((dist - 111.19).abs() < 0.01, "got {}", dist);
    }

    #[test]
    fn test_distance_one_degree_longitude() {
        let dist = distance_meters((0., 0.), (0., 1.));
        assert!((dist - 111_195.).abs() < 200.);
    }

    #[test]
    fn test_distance_out_of_range_does_not_panic() {
        let dist = distance_meters((f64::NAN, 0.), (0., 0.));
        assert!(dist.is_nan());
    }

    #[test]
    fn test_area_needs_three_points() {
        assert_eq!(coverage_area_m2(&[]), 0.);
        assert_eq!(coverage_area_m2(&[(1., 1.)]), 0.);
        assert_eq!(coverage_area_m2(&[(1., 1.), (2., 2.)]), 0.);
    }

    #[test]
    fn test_area_of_duplicated_points_is_zero() {
        let points = [(1., 1.), (1., 1.), (1.5, 1.2), (1.5, 1.2), (1., 1.)];
        assert_eq!(coverage_area_m2(&points), 0.);
    }

    #[test]
    fn test_area_of_small_square() {
        let area = coverage_area_m2(&SQUARE);
        // ~111m x ~111m
        assert!((area - 12_321.).abs() / 12_321. < 0.01, "got {}", area);
    }

    #[test]
    fn test_hull_drops_interior_and_collinear_points() {
        let mut points = SQUARE.to_vec();
        points.push((0.0005, 0.0005));
        points.push((0., 0.0005));
        let hull = convex_hull(&points);
        assert_eq!(hull.len(), 4);
        for corner in SQUARE.iter() {
            assert!(hull.contains(corner));
        }
    }

    #[test]
    fn test_area_is_order_independent() {
        let mut reversed = SQUARE.to_vec();
        reversed.reverse();
        assert_eq!(coverage_area_m2(&SQUARE), coverage_area_m2(&reversed));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_distance_to_self_is_zero(lat in -90.0f64..90.0, lon in -180.0f64..180.0) {
            prop_assert_eq!(distance_meters((lat, lon), (lat, lon)), 0.);
        }

        #[test]
        fn prop_distance_is_symmetric(
            lat1 in -90.0f64..90.0, lon1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0, lon2 in -180.0f64..180.0,
        ) {
            let ab = distance_meters((lat1, lon1), (lat2, lon2));
            let ba = distance_meters((lat2, lon2), (lat1, lon1));
            prop_assert!(ab >= 0.);
            prop_assert!((ab - ba).abs() <= 1e-6);
        }

        #[test]
        fn prop_collinear_points_have_no_area(
            steps in proptest::collection::vec(0u32..1000, 3..30),
        ) {
            let points: Vec<LatLon> = steps
                .iter()
                .map(|s| (*s as f64 * 0.0001, *s as f64 * 0.0001))
                .collect();
            prop_assert_eq!(coverage_area_m2(&points), 0.);
        }

        #[test]
        fn prop_interior_points_do_not_change_area(
            interior in proptest::collection::vec((0.1f64..0.9, 0.1f64..0.9), 1..40),
        ) {
            let base = coverage_area_m2(&SQUARE);
            let mut points = SQUARE.to_vec();
            points.extend(interior.iter().map(|(a, b)| (a * 0.001, b * 0.001)));
            let with_interior = coverage_area_m2(&points);
            prop_assert!((base - with_interior).abs() <= base * 1e-9);
        }
    }
}
