//! Candidate ranking and the synthetic direct-route fallback.

use std::collections::HashSet;

use crate::geo::{bearing_degrees, haversine_distance, in_direction, offset_by_bearing, search_annulus};
use crate::models::{Candidate, CandidateKind, CandidateOrigin, Direction, HomePoint};

/// Distance factors applied to the target for synthetic points.
pub const SYNTHETIC_DISTANCE_FACTORS: [f64; 3] = [0.8, 1.0, 1.2];
pub const MAX_SYNTHETIC_CANDIDATES: usize = 20;

const COMPASS: [(&str, &str, f64); 8] = [
    ("north", "North", 0.0),
    ("northeast", "Northeast", 45.0),
    ("east", "East", 90.0),
    ("southeast", "Southeast", 135.0),
    ("south", "South", 180.0),
    ("southwest", "Southwest", 225.0),
    ("west", "West", 270.0),
    ("northwest", "Northwest", 315.0),
];

/// Filter raw directory results to the search annulus and direction sector, drop duplicate
/// ids, and order them closest-to-target-distance first.
pub fn rank_candidates(
    home: &HomePoint,
    target_km: f64,
    direction: Direction,
    candidates: Vec<Candidate>,
) -> Vec<Candidate> {
    let annulus = search_annulus(target_km);
    let target_m = target_km * 1000.0;
    let mut seen = HashSet::new();

    let mut ranked: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| c.lat.is_finite() && c.lng.is_finite())
        .filter_map(|mut c| {
            c.distance_from_home_m = haversine_distance(home.lat, home.lng, c.lat, c.lng);
            if !annulus.contains(c.distance_from_home_m) {
                return None;
            }
            let bearing = bearing_degrees(home.lat, home.lng, c.lat, c.lng);
            if !in_direction(bearing, direction) {
                return None;
            }
            Some(c)
        })
        .filter(|c| seen.insert(c.id.clone()))
        .collect();

    sort_by_target_gap(&mut ranked, target_m);
    ranked
}

/// Fabricate points at 0.8/1.0/1.2x the target along all eight compass directions, or only
/// along the requested cardinal. Gives the search something to try with zero live services.
pub fn synthetic_candidates(home: &HomePoint, target_km: f64, direction: Direction) -> Vec<Candidate> {
    let target_m = target_km * 1000.0;
    let wanted = cardinal_bearing(direction);
    let mut out = Vec::new();

    for (key, label, bearing_deg) in COMPASS {
        if wanted.is_some_and(|cardinal| cardinal != bearing_deg) {
            continue;
        }
        for (idx, factor) in SYNTHETIC_DISTANCE_FACTORS.iter().enumerate() {
            let distance_m = target_m * factor;
            let (lat, lng) = offset_by_bearing(home.lat, home.lng, distance_m, bearing_deg.to_radians());
            out.push(Candidate {
                id: format!("waypoint-{key}-{idx}"),
                name: format!("{label} Route ({}km)", (target_km * factor).round() as i64),
                lat,
                lng,
                kind: CandidateKind::Waypoint,
                distance_from_home_m: distance_m,
                origin: CandidateOrigin::SyntheticDirect,
            });
        }
    }

    sort_by_target_gap(&mut out, target_m);
    out.truncate(MAX_SYNTHETIC_CANDIDATES);
    out
}

// Diagonals sit exactly on sector boundaries, so a constrained search only uses the cardinal.
fn cardinal_bearing(direction: Direction) -> Option<f64> {
    match direction {
        Direction::North => Some(0.0),
        Direction::East => Some(90.0),
        Direction::South => Some(180.0),
        Direction::West => Some(270.0),
        Direction::Any => None,
    }
}

fn sort_by_target_gap(candidates: &mut [Candidate], target_m: f64) {
    candidates.sort_by(|a, b| {
        let gap_a = (a.distance_from_home_m - target_m).abs();
        let gap_b = (b.distance_from_home_m - target_m).abs();
        gap_a.total_cmp(&gap_b)
    });
}
