//! Service configuration from environment.

use std::env;
use std::time::Duration;

use crate::endpoints::EndpointPolicy;

pub const DEFAULT_OVERPASS_URLS: &str =
    "https://overpass-api.de/api/interpreter,https://lz4.overpass-api.de/api/interpreter";
pub const DEFAULT_OSRM_FOOT_URL: &str = "https://routing.openstreetmap.de/routed-foot/route/v1/foot";
pub const DEFAULT_OSRM_BIKE_URL: &str = "https://routing.openstreetmap.de/routed-bike/route/v1/bike";
pub const DEFAULT_ELEVATION_URL: &str = "https://api.open-meteo.com/v1/elevation";
pub const DEFAULT_TRANSIT_URLS: &str = "https://v6.db.transport.rest,https://v5.db.transport.rest";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub overpass_urls: Vec<String>,
    pub overpass_policy: EndpointPolicy,
    pub overpass_query_timeout_s: u64,
    pub overpass_cooldown_s: u64,
    pub osrm_foot_url: String,
    pub osrm_bike_url: String,
    pub elevation_url: String,
    pub elevation_cache_ttl_s: u64,
    pub elevation_cache_max_entries: usize,
    pub transit_urls: Vec<String>,
    pub transit_policy: EndpointPolicy,
    pub http_timeout_s: u64,
    pub user_agent: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            overpass_urls: split_urls(DEFAULT_OVERPASS_URLS),
            overpass_policy: EndpointPolicy::StickToLastSuccessful,
            overpass_query_timeout_s: 25,
            overpass_cooldown_s: 30,
            osrm_foot_url: DEFAULT_OSRM_FOOT_URL.to_string(),
            osrm_bike_url: DEFAULT_OSRM_BIKE_URL.to_string(),
            elevation_url: DEFAULT_ELEVATION_URL.to_string(),
            elevation_cache_ttl_s: 86_400,
            elevation_cache_max_entries: 20_000,
            transit_urls: split_urls(DEFAULT_TRANSIT_URLS),
            transit_policy: EndpointPolicy::StickToLastSuccessful,
            http_timeout_s: 8,
            user_agent: format!("runhome/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            overpass_urls: env::var("RUNHOME_OVERPASS_URLS")
                .map(|v| split_urls(&v))
                .ok()
                .filter(|urls| !urls.is_empty())
                .unwrap_or(defaults.overpass_urls),
            overpass_policy: env::var("RUNHOME_OVERPASS_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.overpass_policy),
            overpass_query_timeout_s: env::var("RUNHOME_OVERPASS_QUERY_TIMEOUT_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.overpass_query_timeout_s),
            overpass_cooldown_s: env::var("RUNHOME_OVERPASS_COOLDOWN_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.overpass_cooldown_s),
            osrm_foot_url: env::var("RUNHOME_OSRM_FOOT_URL").unwrap_or(defaults.osrm_foot_url),
            osrm_bike_url: env::var("RUNHOME_OSRM_BIKE_URL").unwrap_or(defaults.osrm_bike_url),
            elevation_url: env::var("RUNHOME_ELEVATION_URL").unwrap_or(defaults.elevation_url),
            elevation_cache_ttl_s: env::var("RUNHOME_ELEVATION_CACHE_TTL_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.elevation_cache_ttl_s),
            elevation_cache_max_entries: env::var("RUNHOME_ELEVATION_CACHE_MAX_ENTRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.elevation_cache_max_entries),
            transit_urls: env::var("RUNHOME_TRANSIT_URLS")
                .map(|v| split_urls(&v))
                .ok()
                .filter(|urls| !urls.is_empty())
                .unwrap_or(defaults.transit_urls),
            transit_policy: env::var("RUNHOME_TRANSIT_POLICY")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.transit_policy),
            http_timeout_s: env::var("RUNHOME_HTTP_TIMEOUT_S")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.http_timeout_s),
            user_agent: env::var("RUNHOME_USER_AGENT").unwrap_or(defaults.user_agent),
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_s.max(1))
    }
}

pub fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_and_trims_url_lists() {
        assert_eq!(
            split_urls(" https://a.example/ , ,https://b.example"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn defaults_point_at_public_services() {
        let config = ServiceConfig::default();
        assert_eq!(config.overpass_urls.len(), 2);
        assert_eq!(config.transit_urls[0], "https://v6.db.transport.rest");
        assert_eq!(config.http_timeout(), Duration::from_secs(8));
    }
}
