//! Elevation profiles and climb statistics.

use crate::geo::cumulative_distances;
use crate::models::{ElevationPoint, ElevationProfile, ElevationStats, LatLng};
use crate::providers::ElevationLookup;

#[derive(Debug, Clone, PartialEq)]
pub struct ElevationConfig {
    /// Cap on resampled profile points.
    pub max_points: usize,
    /// Points per upstream request.
    pub batch_size: usize,
    /// Smoothing window as a fraction of route length.
    pub smoothing_fraction: f64,
    /// Elevation data is quantized to whole meters; narrower windows leave stair steps.
    pub min_smoothing_window_m: f64,
}

impl Default for ElevationConfig {
    fn default() -> Self {
        Self {
            max_points: 100,
            batch_size: 50,
            smoothing_fraction: 0.03,
            min_smoothing_window_m: 200.0,
        }
    }
}

struct Sample {
    at: LatLng,
    distance_m: f64,
}

/// Pick up to `max_points` vertices spaced evenly by path distance. First and last vertex
/// are always kept.
fn resample(geometry: &[[f64; 2]], max_points: usize) -> Vec<Sample> {
    let cumulative = cumulative_distances(geometry);
    let to_sample = |idx: usize| Sample {
        at: LatLng::from_lng_lat(geometry[idx]),
        distance_m: cumulative[idx],
    };

    if geometry.len() <= max_points.max(2) {
        return (0..geometry.len()).map(to_sample).collect();
    }

    let total = cumulative.last().copied().unwrap_or(0.0);
    let steps = max_points.max(2) - 1;
    let mut picked: Vec<usize> = Vec::with_capacity(max_points);
    let mut cursor = 0;
    for step in 0..=steps {
        let wanted = total * step as f64 / steps as f64;
        while cursor + 1 < cumulative.len()
            && (cumulative[cursor + 1] - wanted).abs() <= (cumulative[cursor] - wanted).abs()
        {
            cursor += 1;
        }
        if picked.last() != Some(&cursor) {
            picked.push(cursor);
        }
    }
    let last = geometry.len() - 1;
    if picked.last() != Some(&last) {
        picked.push(last);
    }

    picked.into_iter().map(to_sample).collect()
}

/// A profile with every elevation unknown, on the same sample points a fetch would use.
pub fn flat_profile(geometry: &[[f64; 2]], config: &ElevationConfig) -> ElevationProfile {
    let points = resample(geometry, config.max_points)
        .into_iter()
        .map(|s| ElevationPoint {
            lat: s.at.lat,
            lng: s.at.lng,
            elevation_m: None,
            cumulative_distance_m: s.distance_m,
        })
        .collect();
    ElevationProfile { points }
}

/// Build a smoothed elevation profile for `geometry`. Never fails: batches the lookup
/// cannot answer come back as `None` elevations.
pub async fn fetch_profile(
    lookup: &dyn ElevationLookup,
    geometry: &[[f64; 2]],
    config: &ElevationConfig,
) -> ElevationProfile {
    let samples = resample(geometry, config.max_points);
    if samples.is_empty() {
        return ElevationProfile::default();
    }

    let mut raw: Vec<Option<f64>> = Vec::with_capacity(samples.len());
    for batch in samples.chunks(config.batch_size.max(1)) {
        let points: Vec<LatLng> = batch.iter().map(|s| s.at).collect();
        match lookup.lookup(&points).await {
            Ok(values) if values.len() == points.len() => raw.extend(values),
            Ok(values) => {
                tracing::warn!(
                    "Elevation batch returned {} values for {} points",
                    values.len(),
                    points.len()
                );
                raw.extend(std::iter::repeat(None).take(points.len()));
            }
            Err(err) => {
                tracing::warn!("Elevation batch failed: {}", err);
                raw.extend(std::iter::repeat(None).take(points.len()));
            }
        }
    }

    let distances: Vec<f64> = samples.iter().map(|s| s.distance_m).collect();
    let total = distances.last().copied().unwrap_or(0.0);
    let window = (total * config.smoothing_fraction).max(config.min_smoothing_window_m);
    let smoothed = smooth(&smooth(&raw, &distances, window / 2.0), &distances, window / 2.0);

    let points = samples
        .iter()
        .zip(smoothed)
        .map(|(s, elevation_m)| ElevationPoint {
            lat: s.at.lat,
            lng: s.at.lng,
            elevation_m,
            cumulative_distance_m: s.distance_m,
        })
        .collect();
    ElevationProfile { points }
}

// Triangular weighted moving average by path distance. Unknown values are neither used
// nor filled in.
fn smooth(values: &[Option<f64>], distances: &[f64], half_window_m: f64) -> Vec<Option<f64>> {
    values
        .iter()
        .enumerate()
        .map(|(i, value)| {
            value.as_ref()?;
            let mut weighted = 0.0;
            let mut weights = 0.0;
            for (j, other) in values.iter().enumerate() {
                let Some(elevation) = other else {
                    continue;
                };
                let gap = (distances[j] - distances[i]).abs();
                if gap > half_window_m {
                    continue;
                }
                let weight = 1.0 - gap / (half_window_m + 1.0);
                weighted += elevation * weight;
                weights += weight;
            }
            Some(weighted / weights)
        })
        .collect()
}

/// Gain and loss over consecutive pairs where both ends are known; min/max over known
/// values. All zero when nothing is known.
pub fn elevation_stats(profile: &ElevationProfile) -> ElevationStats {
    let mut gain = 0.0;
    let mut loss = 0.0;
    for pair in profile.points.windows(2) {
        if let (Some(a), Some(b)) = (pair[0].elevation_m, pair[1].elevation_m) {
            let diff = b - a;
            if diff > 0.0 {
                gain += diff;
            } else {
                loss -= diff;
            }
        }
    }

    let known: Vec<f64> = profile.points.iter().filter_map(|p| p.elevation_m).collect();
    if known.is_empty() {
        return ElevationStats::default();
    }
    let min = known.iter().copied().fold(f64::INFINITY, f64::min);
    let max = known.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    ElevationStats {
        gain: gain.round(),
        loss: loss.round(),
        min: min.round(),
        max: max.round(),
    }
}
