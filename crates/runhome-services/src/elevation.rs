//! Open-Meteo elevation lookups with a per-coordinate TTL cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::Client;
use serde::Deserialize;

use runhome_core::{ElevationError, ElevationLookup, LatLng};

use crate::cache::{prune_cache, CacheEntry};

#[derive(Debug, Clone, Copy)]
struct CachedElevation {
    elevation_m: f64,
    fetched_at: Instant,
}

impl CacheEntry for CachedElevation {
    fn fetched_at(&self) -> Instant {
        self.fetched_at
    }
}

/// Elevations keyed by coordinate rounded to 5 decimals (about 1 m).
#[derive(Debug)]
pub struct ElevationCache {
    entries: DashMap<String, CachedElevation>,
    ttl: Duration,
    max_entries: usize,
}

impl ElevationCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn key(point: LatLng) -> String {
        format!("{:.5},{:.5}", point.lat, point.lng)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_fresh(&self, point: LatLng) -> Option<f64> {
        self.get_within(point, self.ttl)
    }

    /// Expired but not older than twice the TTL; only used when the provider is down.
    pub fn get_stale(&self, point: LatLng) -> Option<f64> {
        self.get_within(point, self.ttl.saturating_mul(2))
    }

    fn get_within(&self, point: LatLng, max_age: Duration) -> Option<f64> {
        let entry = self.entries.get(&Self::key(point))?;
        if entry.fetched_at.elapsed() <= max_age {
            Some(entry.elevation_m)
        } else {
            None
        }
    }

    pub fn insert(&self, point: LatLng, elevation_m: f64) {
        self.insert_at(point, elevation_m, Instant::now());
    }

    pub fn insert_at(&self, point: LatLng, elevation_m: f64, fetched_at: Instant) {
        self.entries.insert(
            Self::key(point),
            CachedElevation {
                elevation_m,
                fetched_at,
            },
        );
        if self.entries.len() > self.max_entries {
            self.prune();
        }
    }

    pub fn prune(&self) {
        prune_cache(&self.entries, self.max_entries, self.ttl.saturating_mul(2));
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[derive(Debug, Deserialize)]
struct ElevationResponse {
    elevation: Option<Vec<Option<f64>>>,
}

pub struct OpenMeteoElevation {
    client: Client,
    base_url: String,
    timeout: Duration,
    cache: Arc<ElevationCache>,
}

impl OpenMeteoElevation {
    pub fn new(client: Client, base_url: String, timeout: Duration, cache: Arc<ElevationCache>) -> Self {
        Self {
            client,
            base_url,
            timeout,
            cache,
        }
    }

    async fn fetch(&self, points: &[LatLng]) -> Result<Vec<Option<f64>>, ElevationError> {
        let lats: Vec<f64> = points.iter().map(|p| p.lat).collect();
        let lons: Vec<f64> = points.iter().map(|p| p.lng).collect();
        let url = build_provider_url(&self.base_url, &join_params(&lats), &join_params(&lons));

        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| ElevationError::Network(err.to_string()))?;

        if !response.status().is_success() {
            return Err(ElevationError::Http(response.status().as_u16()));
        }

        let payload: ElevationResponse = response
            .json()
            .await
            .map_err(|err| ElevationError::InvalidResponse(err.to_string()))?;
        let values = payload
            .elevation
            .ok_or_else(|| ElevationError::InvalidResponse("missing elevation array".to_string()))?;
        if values.len() != points.len() {
            return Err(ElevationError::InvalidResponse(format!(
                "expected {} elevations, got {}",
                points.len(),
                values.len()
            )));
        }
        Ok(values)
    }
}

#[async_trait]
impl ElevationLookup for OpenMeteoElevation {
    async fn lookup(&self, points: &[LatLng]) -> Result<Vec<Option<f64>>, ElevationError> {
        let mut results: Vec<Option<f64>> = points.iter().map(|p| self.cache.get_fresh(*p)).collect();
        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, value)| value.is_none())
            .map(|(idx, _)| idx)
            .collect();
        if missing.is_empty() {
            return Ok(results);
        }

        let to_fetch: Vec<LatLng> = missing.iter().map(|&idx| points[idx]).collect();
        match self.fetch(&to_fetch).await {
            Ok(values) => {
                for (&idx, value) in missing.iter().zip(values) {
                    if let Some(elevation) = value.filter(|v| v.is_finite()) {
                        self.cache.insert(points[idx], elevation);
                        results[idx] = Some(elevation);
                    }
                }
                Ok(results)
            }
            Err(err) => {
                let stale: Vec<Option<f64>> =
                    missing.iter().map(|&idx| self.cache.get_stale(points[idx])).collect();
                if stale.iter().any(Option::is_none) {
                    return Err(err);
                }
                tracing::warn!("Elevation fetch failed, using stale cache: {}", err);
                for (&idx, value) in missing.iter().zip(stale) {
                    results[idx] = value;
                }
                Ok(results)
            }
        }
    }
}

fn join_params(values: &[f64]) -> String {
    let mut buf = String::new();
    for (idx, value) in values.iter().enumerate() {
        if idx > 0 {
            buf.push(',');
        }
        buf.push_str(&format!("{:.6}", value));
    }
    buf
}

fn build_provider_url(base: &str, latitudes: &str, longitudes: &str) -> String {
    let separator = if base.contains('?') { "&" } else { "?" };
    format!(
        "{}{}latitude={}&longitude={}",
        base, separator, latitudes, longitudes
    )
}
