//! Spatial math, tolerance bands and display formatting.

use crate::models::Direction;
use serde::{Deserialize, Serialize};

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Relative tolerances indexed by tolerance level (10%, 20%, 30%).
pub const DEFAULT_TOLERANCES: [f64; 3] = [0.10, 0.20, 0.30];

/// Calculate distance between two points in meters using Haversine formula.
///
/// # Arguments
/// * `lat1`, `lon1` - First point coordinates in decimal degrees
/// * `lat2`, `lon2` - Second point coordinates in decimal degrees
///
/// # Returns
/// Distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Calculate bearing from point 1 to point 2 in radians.
/// Returns bearing in radians, 0 = north, π/2 = east.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let delta_lambda = (lon2 - lon1).to_radians();

    let x = delta_lambda.sin() * phi2.cos();
    let y = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    x.atan2(y)
}

/// Initial bearing from point 1 to point 2, normalised to `[0, 360)`.
pub fn bearing_degrees(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let deg = bearing(lat1, lon1, lat2, lon2).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if deg >= 360.0 {
        0.0
    } else {
        deg
    }
}

/// Offset a position by distance and bearing.
///
/// # Arguments
/// * `lat`, `lon` - Starting position in degrees
/// * `distance_m` - Distance in meters
/// * `bearing_rad` - Bearing in radians (0 = north, π/2 = east)
///
/// # Returns
/// (new_lat, new_lon) in degrees
pub fn offset_by_bearing(lat: f64, lon: f64, distance_m: f64, bearing_rad: f64) -> (f64, f64) {
    if distance_m.abs() <= f64::EPSILON {
        return (lat, lon);
    }

    let lat1 = lat.to_radians();
    let lon1 = lon.to_radians();
    let angular_distance = distance_m / EARTH_RADIUS_M;

    let sin_lat1 = lat1.sin();
    let cos_lat1 = lat1.cos();
    let sin_ad = angular_distance.sin();
    let cos_ad = angular_distance.cos();

    let sin_lat2 = sin_lat1 * cos_ad + cos_lat1 * sin_ad * bearing_rad.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();

    let y = bearing_rad.sin() * sin_ad * cos_lat1;
    let x = cos_ad - sin_lat1 * sin_lat2;
    let mut lon2 = lon1 + y.atan2(x);
    lon2 =
        (lon2 + std::f64::consts::PI).rem_euclid(2.0 * std::f64::consts::PI) - std::f64::consts::PI;

    (lat2.to_degrees(), lon2.to_degrees())
}

/// Half-open `[start, end)` bearing range of a direction sector.
/// Sectors are 90° wide and centred on the cardinal; north wraps through 0°.
pub fn sector_bounds(direction: Direction) -> Option<(f64, f64)> {
    match direction {
        Direction::North => Some((315.0, 45.0)),
        Direction::East => Some((45.0, 135.0)),
        Direction::South => Some((135.0, 225.0)),
        Direction::West => Some((225.0, 315.0)),
        Direction::Any => None,
    }
}

/// Check whether a bearing (degrees) lies in the sector of `direction`.
pub fn in_direction(bearing_deg: f64, direction: Direction) -> bool {
    let Some((start, end)) = sector_bounds(direction) else {
        return true;
    };
    if !bearing_deg.is_finite() {
        return false;
    }
    let bearing_deg = bearing_deg.rem_euclid(360.0);
    if start > end {
        bearing_deg >= start || bearing_deg < end
    } else {
        bearing_deg >= start && bearing_deg < end
    }
}

/// Acceptable route distance range around a target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToleranceBand {
    pub min_m: f64,
    pub max_m: f64,
    pub tolerance: f64,
}

impl ToleranceBand {
    pub fn contains(&self, distance_m: f64) -> bool {
        distance_m.is_finite() && distance_m >= self.min_m && distance_m <= self.max_m
    }
}

/// Tolerance band for the default 10/20/30% schedule.
pub fn tolerance_band(target_km: f64, level: usize) -> ToleranceBand {
    tolerance_band_with(&DEFAULT_TOLERANCES, target_km, level)
}

/// Tolerance band for an arbitrary ascending schedule; `level` is clamped to the last index.
pub fn tolerance_band_with(tolerances: &[f64], target_km: f64, level: usize) -> ToleranceBand {
    let target_m = target_km * 1000.0;
    let tolerance = match tolerances.len() {
        0 => 0.0,
        len => tolerances[level.min(len - 1)],
    };
    ToleranceBand {
        min_m: target_m * (1.0 - tolerance),
        max_m: target_m * (1.0 + tolerance),
        tolerance,
    }
}

/// Ring around home used to bound the stop query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchAnnulus {
    pub inner_radius_m: f64,
    pub outer_radius_m: f64,
}

impl SearchAnnulus {
    pub fn contains(&self, distance_m: f64) -> bool {
        distance_m >= self.inner_radius_m && distance_m <= self.outer_radius_m
    }
}

/// Straight-line distance underestimates path distance, so the inner radius sits at half the target.
pub fn search_annulus(target_km: f64) -> SearchAnnulus {
    let target_m = target_km * 1000.0;
    SearchAnnulus {
        inner_radius_m: target_m * 0.5,
        outer_radius_m: target_m,
    }
}

/// Sum of haversine segment lengths over a `[lng, lat]` polyline.
pub fn path_length_m(geometry: &[[f64; 2]]) -> f64 {
    geometry
        .windows(2)
        .map(|pair| haversine_distance(pair[0][1], pair[0][0], pair[1][1], pair[1][0]))
        .sum()
}

/// Cumulative distance at each vertex of a `[lng, lat]` polyline, starting at 0.
pub fn cumulative_distances(geometry: &[[f64; 2]]) -> Vec<f64> {
    let mut out = Vec::with_capacity(geometry.len());
    let mut total = 0.0;
    for (idx, coord) in geometry.iter().enumerate() {
        if idx > 0 {
            let prev = geometry[idx - 1];
            total += haversine_distance(prev[1], prev[0], coord[1], coord[0]);
        }
        out.push(total);
    }
    out
}

/// Index of the geometry vertex closest to `(lat, lng)`; `None` for empty geometry.
pub fn nearest_vertex_index(geometry: &[[f64; 2]], lat: f64, lng: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, coord) in geometry.iter().enumerate() {
        let dist = haversine_distance(lat, lng, coord[1], coord[0]);
        if !dist.is_finite() {
            continue;
        }
        match best {
            Some((_, best_dist)) if dist >= best_dist => {}
            _ => best = Some((idx, dist)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// `"850 m"` below a kilometre, `"12.3 km"` above, `"--"` for non-finite input.
pub fn format_distance(meters: f64) -> String {
    if !meters.is_finite() {
        return "--".to_string();
    }
    if meters < 1000.0 {
        return format!("{} m", meters.round() as i64);
    }
    format!("{:.1} km", meters / 1000.0)
}

/// `"1h 5min"` or `"42 min"`, `"--"` for non-finite input.
pub fn format_duration(seconds: f64) -> String {
    if !seconds.is_finite() {
        return "--".to_string();
    }
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    if hours > 0 {
        format!("{hours}h {minutes}min")
    } else {
        format!("{minutes} min")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // ~111km between these points (1 degree latitude)
        let dist = haversine_distance(0.0, 0.0, 1.0, 0.0);
        assert!((dist - 111_194.0).abs() < 100.0);
    }

    #[test]
    fn test_haversine_same_point() {
        let dist = haversine_distance(52.52, 13.405, 52.52, 13.405);
        assert!(dist < 0.001);
    }

    #[test]
    fn bearing_degrees_cardinals() {
        assert!(bearing_degrees(52.0, 13.0, 53.0, 13.0).abs() < 1e-6);
        assert!((bearing_degrees(52.0, 13.0, 52.0, 14.0) - 90.0).abs() < 1.0);
        assert!((bearing_degrees(52.0, 13.0, 51.0, 13.0) - 180.0).abs() < 1e-6);
        assert!((bearing_degrees(52.0, 13.0, 52.0, 12.0) - 270.0).abs() < 1.0);
    }

    #[test]
    fn bearing_degrees_stays_in_range() {
        for (lat, lng) in [(52.6, 13.3), (52.4, 13.5), (52.5201, 13.4049), (-10.0, 170.0)] {
            let b = bearing_degrees(52.52, 13.405, lat, lng);
            assert!((0.0..360.0).contains(&b), "bearing {b} out of range");
        }
    }

    #[test]
    fn north_sector_wraps_across_zero() {
        assert!(in_direction(350.0, Direction::North));
        assert!(in_direction(10.0, Direction::North));
        assert!(in_direction(315.0, Direction::North));
        assert!(!in_direction(45.0, Direction::North));
        assert!(!in_direction(180.0, Direction::North));
    }

    #[test]
    fn sectors_partition_the_circle() {
        let sectors = [
            Direction::North,
            Direction::East,
            Direction::South,
            Direction::West,
        ];
        let mut bearing = 0.0;
        while bearing < 360.0 {
            let hits = sectors
                .iter()
                .filter(|dir| in_direction(bearing, **dir))
                .count();
            assert_eq!(hits, 1, "bearing {bearing} matched {hits} sectors");
            assert!(in_direction(bearing, Direction::Any));
            bearing += 7.5;
        }
    }

    #[test]
    fn tolerance_band_levels() {
        let band = tolerance_band(10.0, 0);
        assert!((band.min_m - 9000.0).abs() < 1e-6);
        assert!((band.max_m - 11000.0).abs() < 1e-6);
        assert!(band.contains(9500.0));
        assert!(!band.contains(8000.0));

        let band = tolerance_band(10.0, 2);
        assert!((band.min_m - 7000.0).abs() < 1e-6);
        assert!((band.max_m - 13000.0).abs() < 1e-6);
        assert!(band.contains(8000.0));
    }

    #[test]
    fn tolerance_band_clamps_level() {
        assert_eq!(tolerance_band(10.0, 9), tolerance_band(10.0, 2));
    }

    #[test]
    fn annulus_is_half_to_full_target() {
        let annulus = search_annulus(8.0);
        assert!((annulus.inner_radius_m - 4000.0).abs() < 1e-6);
        assert!((annulus.outer_radius_m - 8000.0).abs() < 1e-6);
        assert!(annulus.contains(6000.0));
        assert!(!annulus.contains(3000.0));
    }

    #[test]
    fn offset_round_trips_through_haversine() {
        let (lat, lng) = offset_by_bearing(52.52, 13.405, 5_000.0, 90f64.to_radians());
        let dist = haversine_distance(52.52, 13.405, lat, lng);
        assert!((dist - 5_000.0).abs() < 1.0);
        let b = bearing_degrees(52.52, 13.405, lat, lng);
        assert!((b - 90.0).abs() < 0.1);
    }

    #[test]
    fn nearest_vertex_picks_closest() {
        let geometry = vec![[13.40, 52.50], [13.41, 52.51], [13.42, 52.52]];
        assert_eq!(nearest_vertex_index(&geometry, 52.509, 13.411), Some(1));
        assert_eq!(nearest_vertex_index(&geometry, 52.6, 13.5), Some(2));
        assert_eq!(nearest_vertex_index(&[], 52.6, 13.5), None);
    }

    #[test]
    fn formats_distance_and_duration() {
        assert_eq!(format_distance(850.4), "850 m");
        assert_eq!(format_distance(12_345.0), "12.3 km");
        assert_eq!(format_distance(f64::NAN), "--");
        assert_eq!(format_duration(42.0 * 60.0), "42 min");
        assert_eq!(format_duration(3900.0), "1h 5min");
        assert_eq!(format_duration(f64::INFINITY), "--");
    }
}
