//! Duration, pace and calorie estimates shown alongside a route.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Activity, CandidateRoute, ElevationStats};

/// Minutes per kilometer.
pub fn default_pace(activity: Activity) -> f64 {
    match activity {
        Activity::Run => 5.5,
        Activity::Bike => 3.0,
    }
}

fn calories_per_km(activity: Activity) -> f64 {
    match activity {
        Activity::Run => 60.0,
        Activity::Bike => 35.0,
    }
}

/// Rough energy estimate; every 100 m of climbing adds 10%.
pub fn estimate_calories(distance_km: f64, elevation_gain_m: f64, activity: Activity) -> u32 {
    let terrain = 1.0 + (elevation_gain_m.max(0.0) / 100.0) * 0.1;
    (distance_km * calories_per_km(activity) * terrain).round().max(0.0) as u32
}

/// `m:ss` per kilometer.
pub fn format_pace(pace_min_per_km: f64) -> String {
    let total_secs = (pace_min_per_km.max(0.0) * 60.0).round() as u64;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// `"1h 5m"` or `"42 min"`.
pub fn format_activity_duration(minutes: f64) -> String {
    let total = minutes.max(0.0).round() as u64;
    let hours = total / 60;
    let mins = total % 60;
    if hours > 0 {
        format!("{hours}h {mins}m")
    } else {
        format!("{mins} min")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub pace_min_per_km: f64,
    pub duration_minutes: f64,
    pub calories: u32,
    /// Arrival home: transit arrival at the stop plus the activity itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_home: Option<DateTime<Utc>>,
}

pub fn estimate_route(
    route: &CandidateRoute,
    activity: Activity,
    pace_min_per_km: Option<f64>,
    stats: Option<&ElevationStats>,
) -> RouteEstimate {
    let pace = pace_min_per_km
        .filter(|p| p.is_finite() && *p > 0.0)
        .unwrap_or_else(|| default_pace(activity));
    let distance_km = route.distance_km();
    let duration_minutes = distance_km * pace;
    let gain = stats.map(|s| s.gain).unwrap_or(0.0);

    let arrival_home = route
        .transit_journey
        .as_ref()
        .and_then(|journey| journey.arrival())
        .map(|arrival| arrival + ChronoDuration::seconds((duration_minutes * 60.0).round() as i64));

    RouteEstimate {
        distance_km,
        pace_min_per_km: pace,
        duration_minutes,
        calories: estimate_calories(distance_km, gain, activity),
        arrival_home,
    }
}
