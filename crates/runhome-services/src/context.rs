//! Process-scoped owner of the HTTP client, endpoint state and caches.
//!
//! Everything that used to be ambient (current endpoint index, elevation cache) lives here and
//! is handed to the core as trait objects. Tests build a fresh context each time.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use runhome_core::{
    CandidateSource, ElevationLookup, JourneyPlanner, Router, SearchConfig, SearchEngine,
    TokioScheduler,
};

use crate::config::ServiceConfig;
use crate::elevation::{ElevationCache, OpenMeteoElevation};
use crate::endpoints::EndpointSet;
use crate::osrm::OsrmRouter;
use crate::overpass::OverpassDirectory;
use crate::transit::DbTransitClient;

pub struct ServiceContext {
    config: ServiceConfig,
    overpass_endpoints: Arc<EndpointSet>,
    transit_endpoints: Arc<EndpointSet>,
    elevation_cache: Arc<ElevationCache>,
    candidate_source: Arc<OverpassDirectory>,
    router: Arc<OsrmRouter>,
    elevation: Arc<OpenMeteoElevation>,
    journeys: Arc<DbTransitClient>,
}

impl ServiceContext {
    pub fn create(config: ServiceConfig) -> Result<Self, reqwest::Error> {
        let timeout = config.http_timeout();
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(timeout)
            .build()?;

        let overpass_endpoints = Arc::new(EndpointSet::new(
            config.overpass_urls.clone(),
            config.overpass_policy,
        ));
        let transit_endpoints = Arc::new(EndpointSet::new(
            config.transit_urls.clone(),
            config.transit_policy,
        ));
        let elevation_cache = Arc::new(ElevationCache::new(
            Duration::from_secs(config.elevation_cache_ttl_s),
            config.elevation_cache_max_entries,
        ));

        let candidate_source = Arc::new(OverpassDirectory::new(
            client.clone(),
            overpass_endpoints.clone(),
            timeout,
            config.overpass_query_timeout_s,
            Duration::from_secs(config.overpass_cooldown_s),
        ));
        let router = Arc::new(OsrmRouter::new(
            client.clone(),
            config.osrm_foot_url.clone(),
            config.osrm_bike_url.clone(),
            timeout,
        ));
        let elevation = Arc::new(OpenMeteoElevation::new(
            client.clone(),
            config.elevation_url.clone(),
            timeout,
            elevation_cache.clone(),
        ));
        let journeys = Arc::new(DbTransitClient::new(
            client,
            transit_endpoints.clone(),
            timeout,
        ));

        tracing::info!(
            "Service context ready ({} Overpass endpoints, {} transit endpoints)",
            overpass_endpoints.endpoints().len(),
            transit_endpoints.endpoints().len()
        );

        Ok(Self {
            config,
            overpass_endpoints,
            transit_endpoints,
            elevation_cache,
            candidate_source,
            router,
            elevation,
            journeys,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn candidate_source(&self) -> Arc<dyn CandidateSource> {
        self.candidate_source.clone()
    }

    pub fn router(&self) -> Arc<dyn Router> {
        self.router.clone()
    }

    pub fn elevation(&self) -> Arc<dyn ElevationLookup> {
        self.elevation.clone()
    }

    pub fn journeys(&self) -> Arc<dyn JourneyPlanner> {
        self.journeys.clone()
    }

    pub fn elevation_cache(&self) -> &ElevationCache {
        &self.elevation_cache
    }

    pub fn overpass_endpoints(&self) -> &EndpointSet {
        &self.overpass_endpoints
    }

    pub fn transit_endpoints(&self) -> &EndpointSet {
        &self.transit_endpoints
    }

    /// A search engine wired to the live adapters and the tokio timer.
    pub fn search_engine(&self, config: SearchConfig) -> SearchEngine {
        SearchEngine::new(
            self.candidate_source(),
            self.router(),
            Arc::new(TokioScheduler),
            config,
        )
    }

    /// Drop cached data and endpoint preferences. Adapters already handed out keep working
    /// against the cleared state.
    pub fn dispose(self) {
        self.elevation_cache.clear();
        self.overpass_endpoints.reset();
        self.transit_endpoints.reset();
        tracing::info!("Service context disposed");
    }
}
